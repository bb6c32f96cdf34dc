//! Query expression aggregate and its fluent builders.
//!
//! A [`QueryExpression`] describes one select, insert, update or delete
//! statement. It is built with consuming `self -> Self` calls; predicates are
//! written either with [`QueryExpression::filter`] or through the
//! [`WhereBuilder`] returned by `where_`, `and` and `or`.

mod field;
mod join;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{QueryError, QueryResult};
use crate::expression::{call, ArithmeticOperator, ComparisonOperator, Expression, LogicalOperator};

pub use field::{OrderBy, QueryField, SortDirection};
pub use join::{FieldRef, JoinBuilder, JoinExpression, JoinKind, JoinOn, JoinTarget};

fn is_false(value: &bool) -> bool {
    !*value
}

/// Statement kind of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryExpression {
    #[serde(rename = "$collection", default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    #[serde(rename = "$alias", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Projected fields; an empty list selects every column
    #[serde(rename = "$select", default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<QueryField>>,

    #[serde(rename = "$insert", default, skip_serializing_if = "Option::is_none")]
    pub insert: Option<Map<String, Value>>,

    #[serde(rename = "$update", default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Map<String, Value>>,

    #[serde(rename = "$delete", default, skip_serializing_if = "is_false")]
    pub delete: bool,

    #[serde(rename = "$where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Expression>,

    #[serde(rename = "$prepared", default, skip_serializing_if = "Option::is_none")]
    pub prepared: Option<Expression>,

    #[serde(rename = "$order", default, skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<OrderBy>,

    #[serde(rename = "$group", default, skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<QueryField>,

    #[serde(rename = "$expand", default, skip_serializing_if = "Vec::is_empty")]
    pub expand: Vec<JoinExpression>,

    #[serde(rename = "$skip", default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,

    #[serde(rename = "$take", default, skip_serializing_if = "Option::is_none")]
    pub take: Option<u64>,

    #[serde(rename = "$distinct", default, skip_serializing_if = "is_false")]
    pub distinct: bool,

    /// Wrap the projection as `SELECT * FROM (SELECT ...) entity`
    #[serde(rename = "$fixed", default, skip_serializing_if = "is_false")]
    pub fixed: bool,
}

impl QueryExpression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kinds whose member is populated.
    pub fn populated_kinds(&self) -> Vec<QueryKind> {
        let mut kinds = Vec::new();
        if self.select.is_some() {
            kinds.push(QueryKind::Select);
        }
        if self.insert.is_some() {
            kinds.push(QueryKind::Insert);
        }
        if self.update.is_some() {
            kinds.push(QueryKind::Update);
        }
        if self.delete {
            kinds.push(QueryKind::Delete);
        }
        kinds
    }

    /// The statement kind; exactly one must be populated.
    pub fn kind(&self) -> QueryResult<QueryKind> {
        match self.populated_kinds().as_slice() {
            [kind] => Ok(*kind),
            [] => Err(QueryError::FormatError(
                "Query expression has no select, insert, update or delete".to_string(),
            )),
            kinds => Err(QueryError::FormatError(format!(
                "Query expression has more than one kind: {:?}",
                kinds
            ))),
        }
    }

    pub fn has_paging(&self) -> bool {
        self.take.is_some()
    }

    fn clear_kind(&mut self) {
        self.select = None;
        self.insert = None;
        self.update = None;
        self.delete = false;
    }

    // ------------------------------------------------------------------
    // Target
    // ------------------------------------------------------------------

    pub fn from(mut self, entity: impl Into<String>) -> Self {
        self.collection = Some(entity.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    // ------------------------------------------------------------------
    // Kind
    // ------------------------------------------------------------------

    pub fn select<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<QueryField>,
    {
        self.clear_kind();
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn select_all(mut self) -> Self {
        self.clear_kind();
        self.select = Some(Vec::new());
        self
    }

    pub fn insert<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.clear_kind();
        self.insert = Some(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn into_collection(self, entity: impl Into<String>) -> Self {
        self.from(entity)
    }

    pub fn update(mut self, entity: impl Into<String>) -> Self {
        self.clear_kind();
        self.collection = Some(entity.into());
        self.update = Some(Map::new());
        self
    }

    /// Columns to assign; only meaningful after [`QueryExpression::update`].
    pub fn set<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let update = self.update.get_or_insert_with(Map::new);
        for (k, v) in values {
            update.insert(k.into(), v.into());
        }
        self
    }

    pub fn delete(mut self, entity: impl Into<String>) -> Self {
        self.clear_kind();
        self.collection = Some(entity.into());
        self.delete = true;
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    // ------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------

    /// Attach a predicate, AND-ing it with any existing one.
    pub fn filter(mut self, expr: Expression) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => Expression::logical(LogicalOperator::And, existing, expr),
            None => expr,
        });
        self
    }

    /// Move the current predicate into the prepared predicate.
    pub fn prepare(mut self) -> Self {
        if let Some(current) = self.where_clause.take() {
            self.prepared = Some(match self.prepared.take() {
                Some(prepared) => Expression::logical(LogicalOperator::And, prepared, current),
                None => current,
            });
        }
        self
    }

    /// Start a fresh predicate on `field`, replacing the current one.
    pub fn where_(self, field: impl Into<QueryField>) -> WhereBuilder {
        WhereBuilder::new(self, None, field.into().expr)
    }

    pub fn and(self, field: impl Into<QueryField>) -> WhereBuilder {
        WhereBuilder::new(self, Some(LogicalOperator::And), field.into().expr)
    }

    pub fn or(self, field: impl Into<QueryField>) -> WhereBuilder {
        WhereBuilder::new(self, Some(LogicalOperator::Or), field.into().expr)
    }

    // ------------------------------------------------------------------
    // Paging, grouping, ordering
    // ------------------------------------------------------------------

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn take(mut self, n: u64) -> Self {
        self.take = Some(n);
        self
    }

    pub fn group_by<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<QueryField>,
    {
        self.group.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Replace the ordering with `field` ascending.
    pub fn order_by(mut self, field: impl Into<QueryField>) -> Self {
        self.order = vec![OrderBy::ascending(field)];
        self
    }

    pub fn order_by_descending(mut self, field: impl Into<QueryField>) -> Self {
        self.order = vec![OrderBy::descending(field)];
        self
    }

    pub fn then_by(mut self, field: impl Into<QueryField>) -> Self {
        self.order.push(OrderBy::ascending(field));
        self
    }

    pub fn then_by_descending(mut self, field: impl Into<QueryField>) -> Self {
        self.order.push(OrderBy::descending(field));
        self
    }

    /// Append order items.
    pub fn order(mut self, items: Vec<OrderBy>) -> Self {
        self.order.extend(items);
        self
    }

    // ------------------------------------------------------------------
    // Joins
    // ------------------------------------------------------------------

    pub fn join(self, entity: impl Into<String>) -> JoinBuilder {
        self.join_kind(JoinTarget::Entity(entity.into()), JoinKind::Inner)
    }

    pub fn left_join(self, entity: impl Into<String>) -> JoinBuilder {
        self.join_kind(JoinTarget::Entity(entity.into()), JoinKind::Left)
    }

    pub fn right_join(self, entity: impl Into<String>) -> JoinBuilder {
        self.join_kind(JoinTarget::Entity(entity.into()), JoinKind::Right)
    }

    /// Join a nested select; the nested query's alias becomes the join alias.
    pub fn join_query(self, mut query: QueryExpression) -> JoinBuilder {
        let alias = query.alias.take();
        let builder = self.join_kind(JoinTarget::Query(Box::new(query)), JoinKind::Inner);
        match alias {
            Some(alias) => builder.alias(alias),
            None => builder,
        }
    }

    fn join_kind(self, target: JoinTarget, kind: JoinKind) -> JoinBuilder {
        JoinBuilder::new(self, JoinExpression::new(target, kind))
    }
}

/// Pending predicate on one operand.
///
/// Modifiers transform the operand (`get_year`, `trim`, `add`, ...); the
/// terminal comparison closes the predicate and hands back the query.
#[must_use = "a predicate is only added to the query by a terminal comparison"]
pub struct WhereBuilder {
    query: QueryExpression,
    connective: Option<LogicalOperator>,
    operand: Expression,
}

impl WhereBuilder {
    fn new(query: QueryExpression, connective: Option<LogicalOperator>, operand: Expression) -> Self {
        Self {
            query,
            connective,
            operand,
        }
    }

    fn wrap(mut self, name: &str, extra: Vec<Expression>) -> Self {
        let mut args = vec![self.operand];
        args.extend(extra);
        self.operand = call(name, args);
        self
    }

    fn arithmetic(mut self, operator: ArithmeticOperator, value: Expression) -> Self {
        self.operand = Expression::arithmetic(self.operand, operator, value);
        self
    }

    // ------------------------------------------------------------------
    // Modifiers
    // ------------------------------------------------------------------

    pub fn get_year(self) -> Self {
        self.wrap("year", vec![])
    }

    pub fn get_month(self) -> Self {
        self.wrap("month", vec![])
    }

    pub fn get_date(self) -> Self {
        self.wrap("day", vec![])
    }

    pub fn get_hours(self) -> Self {
        self.wrap("hour", vec![])
    }

    pub fn get_minutes(self) -> Self {
        self.wrap("minute", vec![])
    }

    pub fn get_seconds(self) -> Self {
        self.wrap("second", vec![])
    }

    pub fn length(self) -> Self {
        self.wrap("length", vec![])
    }

    pub fn trim(self) -> Self {
        self.wrap("trim", vec![])
    }

    pub fn to_lower_case(self) -> Self {
        self.wrap("tolower", vec![])
    }

    pub fn to_upper_case(self) -> Self {
        self.wrap("toupper", vec![])
    }

    pub fn floor(self) -> Self {
        self.wrap("floor", vec![])
    }

    pub fn ceil(self) -> Self {
        self.wrap("ceiling", vec![])
    }

    /// Round to `digits` decimal places.
    pub fn round(self, digits: u32) -> Self {
        self.wrap("round", vec![Expression::literal(digits)])
    }

    pub fn add(self, value: impl Into<Expression>) -> Self {
        self.arithmetic(ArithmeticOperator::Add, value.into())
    }

    pub fn subtract(self, value: impl Into<Expression>) -> Self {
        self.arithmetic(ArithmeticOperator::Sub, value.into())
    }

    pub fn multiply(self, value: impl Into<Expression>) -> Self {
        self.arithmetic(ArithmeticOperator::Mul, value.into())
    }

    pub fn divide(self, value: impl Into<Expression>) -> Self {
        self.arithmetic(ArithmeticOperator::Div, value.into())
    }

    pub fn modulo(self, value: impl Into<Expression>) -> Self {
        self.arithmetic(ArithmeticOperator::Mod, value.into())
    }

    pub fn bit_and(self, value: impl Into<Expression>) -> Self {
        self.wrap("bit", vec![value.into()])
    }

    /// Substring from the zero-based `start`, optionally limited to `length`.
    pub fn substr(self, start: u64, length: Option<u64>) -> Self {
        let mut args = vec![Expression::literal(start)];
        if let Some(length) = length {
            args.push(Expression::literal(length));
        }
        self.wrap("substring", args)
    }

    pub fn index_of(self, search: impl Into<Expression>) -> Self {
        self.wrap("indexof", vec![search.into()])
    }

    pub fn concat(self, value: impl Into<Expression>) -> Self {
        self.wrap("concat", vec![value.into()])
    }

    pub fn if_null(self, value: impl Into<Expression>) -> Self {
        self.wrap("ifnull", vec![value.into()])
    }

    // ------------------------------------------------------------------
    // Terminals
    // ------------------------------------------------------------------

    fn finish(self, predicate: Expression) -> QueryExpression {
        let mut query = self.query;
        query.where_clause = Some(match (self.connective, query.where_clause.take()) {
            (Some(operator), Some(existing)) => Expression::logical(operator, existing, predicate),
            _ => predicate,
        });
        query
    }

    fn compare(self, operator: ComparisonOperator, value: Expression) -> QueryExpression {
        let predicate = Expression::comparison(self.operand.clone(), operator, value);
        self.finish(predicate)
    }

    pub fn equal(self, value: impl Into<Expression>) -> QueryExpression {
        self.compare(ComparisonOperator::Eq, value.into())
    }

    pub fn not_equal(self, value: impl Into<Expression>) -> QueryExpression {
        self.compare(ComparisonOperator::Ne, value.into())
    }

    pub fn greater_than(self, value: impl Into<Expression>) -> QueryExpression {
        self.compare(ComparisonOperator::Gt, value.into())
    }

    pub fn greater_or_equal(self, value: impl Into<Expression>) -> QueryExpression {
        self.compare(ComparisonOperator::Ge, value.into())
    }

    pub fn lower_than(self, value: impl Into<Expression>) -> QueryExpression {
        self.compare(ComparisonOperator::Lt, value.into())
    }

    pub fn lower_or_equal(self, value: impl Into<Expression>) -> QueryExpression {
        self.compare(ComparisonOperator::Le, value.into())
    }

    /// Inclusive range: `operand >= low AND operand <= high`.
    pub fn between(self, low: impl Into<Expression>, high: impl Into<Expression>) -> QueryExpression {
        let operand = self.operand.clone();
        let predicate = operand
            .clone()
            .greater_or_equal(low)
            .and(operand.lower_or_equal(high));
        self.finish(predicate)
    }

    pub fn in_list<I, V>(self, values: I) -> QueryExpression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let predicate = self.operand.clone().is_in(values);
        self.finish(predicate)
    }

    pub fn not_in_list<I, V>(self, values: I) -> QueryExpression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let predicate = self.operand.clone().not_in(values);
        self.finish(predicate)
    }

    pub fn in_query(self, query: QueryExpression) -> QueryExpression {
        self.compare(ComparisonOperator::In, Expression::Subquery(Box::new(query)))
    }

    pub fn not_in_query(self, query: QueryExpression) -> QueryExpression {
        self.compare(ComparisonOperator::NotIn, Expression::Subquery(Box::new(query)))
    }

    pub fn starts_with(self, value: impl Into<Expression>) -> QueryExpression {
        let predicate = call("startswith", vec![self.operand.clone(), value.into()]);
        self.finish(predicate)
    }

    pub fn ends_with(self, value: impl Into<Expression>) -> QueryExpression {
        let predicate = call("endswith", vec![self.operand.clone(), value.into()]);
        self.finish(predicate)
    }

    pub fn contains(self, value: impl Into<Expression>) -> QueryExpression {
        let predicate = call("contains", vec![self.operand.clone(), value.into()]);
        self.finish(predicate)
    }
}

//! SQL formatter
//!
//! Renders a [`QueryExpression`] into a MySQL-flavoured SQL statement. The
//! formatter is a pure tree walk over the query; identifier quoting and
//! alias style come from [`FormatterSettings`], function rendering from the
//! [`FunctionRegistry`].

mod functions;

#[cfg(test)]
mod tests;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::config::FormatterSettings;
use crate::error::{QueryError, QueryResult};
use crate::expression::{ComparisonOperator, Expression};
use crate::query::{FieldRef, JoinExpression, JoinOn, JoinTarget, QueryExpression, QueryField, QueryKind};

pub use functions::{FunctionRegistry, FunctionRenderer};

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)").expect("valid name regex"));

/// SQL formatter with its settings and function table.
#[derive(Debug, Clone, Default)]
pub struct SqlFormatter {
    settings: FormatterSettings,
    functions: FunctionRegistry,
}

impl SqlFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: FormatterSettings) -> Self {
        Self {
            settings,
            functions: FunctionRegistry::new(),
        }
    }

    pub fn settings(&self) -> &FormatterSettings {
        &self.settings
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    /// Add or replace a function renderer.
    pub fn register_function<F>(mut self, name: &str, renderer: F) -> Self
    where
        F: Fn(&SqlFormatter, &[Expression]) -> QueryResult<String> + Send + Sync + 'static,
    {
        self.functions.register(name, renderer);
        self
    }

    /// Format a query of any kind.
    pub fn format(&self, query: &QueryExpression) -> QueryResult<String> {
        let kind = query.kind()?;
        tracing::debug!("Formatting {:?} query on {:?}", kind, query.collection);
        match kind {
            QueryKind::Select if query.has_paging() => self.format_limit_select(query),
            QueryKind::Select => self.format_select(query),
            QueryKind::Insert => self.format_insert(query),
            QueryKind::Update => self.format_update(query),
            QueryKind::Delete => self.format_delete(query),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// `SELECT ... FROM ... [JOIN ...] [WHERE ...] [GROUP BY ...] [ORDER BY ...]`
    pub fn format_select(&self, query: &QueryExpression) -> QueryResult<String> {
        let fields = query.select.as_ref().ok_or_else(|| {
            QueryError::FormatError("Expected a select query".to_string())
        })?;
        let entity = entity_of(query)?;
        let qualifier = query.alias.as_deref().unwrap_or(entity);
        let mut parts = Vec::new();

        let projection = if fields.is_empty() {
            "*".to_string()
        } else {
            fields
                .iter()
                .map(|field| self.format_select_field(field, qualifier))
                .collect::<QueryResult<Vec<_>>>()?
                .join(", ")
        };

        if query.distinct {
            parts.push(format!("SELECT DISTINCT {}", projection));
        } else {
            parts.push(format!("SELECT {}", projection));
        }

        let mut from = format!("FROM {}", self.escape_entity(entity));
        if let Some(alias) = &query.alias {
            from.push_str(&self.alias_suffix(alias));
        }
        parts.push(from);

        for join in &query.expand {
            parts.push(self.format_join(join, qualifier)?);
        }

        let where_sql = self.format_filter(query)?;
        if !where_sql.is_empty() {
            parts.push(format!("WHERE {}", where_sql));
        }

        if !query.group.is_empty() {
            let groups = query
                .group
                .iter()
                .map(|field| self.escape(&field.expr))
                .collect::<QueryResult<Vec<_>>>()?;
            parts.push(format!("GROUP BY {}", groups.join(", ")));
        }

        if !query.order.is_empty() {
            let items = query
                .order
                .iter()
                .map(|item| Ok(format!("{} {}", self.escape(&item.field)?, item.direction.keyword())))
                .collect::<QueryResult<Vec<_>>>()?;
            parts.push(format!("ORDER BY {}", items.join(", ")));
        }

        let sql = parts.join(" ");
        if query.fixed {
            return Ok(format!(
                "SELECT * FROM ({}){}",
                sql,
                self.alias_suffix(qualifier)
            ));
        }
        Ok(sql)
    }

    /// [`SqlFormatter::format_select`] followed by `LIMIT [skip, ]take`.
    pub fn format_limit_select(&self, query: &QueryExpression) -> QueryResult<String> {
        let sql = self.format_select(query)?;
        match (query.skip, query.take) {
            (Some(skip), Some(take)) => Ok(format!("{} LIMIT {}, {}", sql, skip, take)),
            (None, Some(take)) => Ok(format!("{} LIMIT {}", sql, take)),
            _ => Ok(sql),
        }
    }

    pub fn format_insert(&self, query: &QueryExpression) -> QueryResult<String> {
        let values = query.insert.as_ref().ok_or_else(|| {
            QueryError::FormatError("Expected an insert query".to_string())
        })?;
        let entity = entity_of(query)?;
        if values.is_empty() {
            return Err(QueryError::FormatError(
                "Insert query has no values".to_string(),
            ));
        }

        let mut columns = Vec::with_capacity(values.len());
        let mut rendered = Vec::with_capacity(values.len());
        for (column, value) in values {
            columns.push(self.escape_name(column));
            rendered.push(self.escape_value(value)?);
        }

        Ok(format!(
            "INSERT INTO {}({}) VALUES ({})",
            self.escape_entity(entity),
            columns.join(", "),
            rendered.join(", ")
        ))
    }

    pub fn format_update(&self, query: &QueryExpression) -> QueryResult<String> {
        let values = query.update.as_ref().ok_or_else(|| {
            QueryError::FormatError("Expected an update query".to_string())
        })?;
        let entity = entity_of(query)?;
        if values.is_empty() {
            return Err(QueryError::FormatError(
                "Update query has no values".to_string(),
            ));
        }

        let assignments = values
            .iter()
            .map(|(column, value)| {
                Ok(format!("{} = {}", self.escape_name(column), self.escape_value(value)?))
            })
            .collect::<QueryResult<Vec<_>>>()?;

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.escape_entity(entity),
            assignments.join(", ")
        );
        let where_sql = self.format_filter(query)?;
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        Ok(sql)
    }

    pub fn format_delete(&self, query: &QueryExpression) -> QueryResult<String> {
        if !query.delete {
            return Err(QueryError::FormatError(
                "Expected a delete query".to_string(),
            ));
        }
        let entity = entity_of(query)?;
        let mut sql = format!("DELETE FROM {}", self.escape_entity(entity));
        let where_sql = self.format_filter(query)?;
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        Ok(sql)
    }

    fn format_select_field(&self, field: &QueryField, qualifier: &str) -> QueryResult<String> {
        let rendered = match &field.expr {
            Expression::Member(path) if !path.contains('.') && path != "*" => {
                self.escape_name(&format!("{}.{}", qualifier, path))
            }
            other => self.escape(other)?,
        };

        let alias = match (&field.alias, &field.expr) {
            (Some(alias), _) => Some(alias.as_str()),
            (None, Expression::Member(path)) if self.settings.force_alias && path != "*" => {
                path.rsplit('.').next()
            }
            _ => None,
        };

        Ok(match alias {
            Some(alias) => format!("{}{}", rendered, self.alias_suffix(alias)),
            None => rendered,
        })
    }

    fn format_join(&self, join: &JoinExpression, qualifier: &str) -> QueryResult<String> {
        let (target, default_name) = match &join.target {
            JoinTarget::Entity(entity) => (self.escape_entity(entity), entity.as_str()),
            JoinTarget::Query(query) => {
                let alias = join.alias.as_deref().ok_or_else(|| {
                    QueryError::FormatError("A joined sub-query requires an alias".to_string())
                })?;
                (format!("({})", self.format_subquery(query)?), alias)
            }
        };
        let joined = join.alias.as_deref().unwrap_or(default_name);

        let mut sql = format!("{} {}", join.kind.keyword(), target);
        if let Some(alias) = &join.alias {
            sql.push_str(&self.alias_suffix(alias));
        }

        match &join.on {
            Some(JoinOn::Fields { left, right }) => {
                if left.len() != right.len() || left.is_empty() {
                    return Err(QueryError::FormatError(format!(
                        "Join on {} has {} left field(s) and {} right field(s)",
                        joined,
                        left.len(),
                        right.len()
                    )));
                }
                let conditions = left
                    .iter()
                    .zip(right)
                    .map(|(l, r)| {
                        format!(
                            "{} = {}",
                            self.escape_field_ref(l, qualifier),
                            self.escape_field_ref(r, joined)
                        )
                    })
                    .collect::<Vec<_>>();
                sql.push_str(" ON ");
                sql.push_str(&conditions.join(" AND "));
            }
            Some(JoinOn::Predicate(predicate)) => {
                sql.push_str(" ON ");
                sql.push_str(&self.format_where(predicate)?);
            }
            None => {}
        }
        Ok(sql)
    }

    fn escape_field_ref(&self, field: &FieldRef, default_entity: &str) -> String {
        match &field.entity {
            Some(_) => self.escape_name(&field.path()),
            None => self.escape_name(&format!("{}.{}", default_entity, field.field)),
        }
    }

    /// `$where` AND `$prepared`, rendered; empty when neither is set.
    fn format_filter(&self, query: &QueryExpression) -> QueryResult<String> {
        let predicates: Vec<Expression> = query
            .where_clause
            .iter()
            .chain(query.prepared.iter())
            .cloned()
            .collect();
        match Expression::all(predicates) {
            Some(predicate) => self.format_where(&predicate),
            None => Ok(String::new()),
        }
    }

    fn format_subquery(&self, query: &QueryExpression) -> QueryResult<String> {
        match query.kind()? {
            QueryKind::Select if query.has_paging() => self.format_limit_select(query),
            QueryKind::Select => self.format_select(query),
            _ => Err(QueryError::FormatError(
                "A sub-query must be a select query".to_string(),
            )),
        }
    }

    fn alias_suffix(&self, alias: &str) -> String {
        if self.settings.use_alias_keyword {
            format!(" AS {}", self.escape_name(alias))
        } else {
            format!(" {}", self.escape_name(alias))
        }
    }

    // ------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------

    /// Render a predicate.
    pub fn format_where(&self, expr: &Expression) -> QueryResult<String> {
        match expr {
            Expression::Logical { operator, operands } => {
                let rendered = operands
                    .iter()
                    .map(|operand| self.format_where(operand))
                    .filter(|sql| !matches!(sql, Ok(s) if s.is_empty()))
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(match rendered.len() {
                    0 => String::new(),
                    1 => rendered.into_iter().next().unwrap_or_default(),
                    _ => format!("({})", rendered.join(operator.separator())),
                })
            }
            Expression::Not(inner) => {
                let rendered = self.format_where(inner)?;
                if rendered.is_empty() {
                    Ok(rendered)
                } else {
                    Ok(format!("(NOT {})", rendered))
                }
            }
            Expression::Comparison {
                left,
                operator,
                right,
            } => self.format_comparison(left, *operator, right),
            other => self.escape(other),
        }
    }

    /// Render a predicate given in the comparison-object form.
    pub fn format_where_value(&self, value: &Value) -> QueryResult<String> {
        self.format_where(&Expression::from_value(value)?)
    }

    fn format_comparison(
        &self,
        left: &Expression,
        operator: ComparisonOperator,
        right: &Expression,
    ) -> QueryResult<String> {
        let l = self.escape(left)?;
        let is_null = matches!(right, Expression::Literal(Value::Null));
        let is_list = matches!(right, Expression::Literal(Value::Array(_)));

        match operator {
            ComparisonOperator::Eq if is_null => Ok(format!("({} IS NULL)", l)),
            ComparisonOperator::Ne if is_null => Ok(format!("(NOT {} IS NULL)", l)),
            ComparisonOperator::Eq if is_list => {
                Ok(format!("({} IN ({}))", l, self.format_set(right)?))
            }
            ComparisonOperator::Ne if is_list => {
                Ok(format!("(NOT {} IN ({}))", l, self.format_set(right)?))
            }
            ComparisonOperator::Eq => Ok(format!("({} = {})", l, self.escape(right)?)),
            ComparisonOperator::Ne => Ok(format!("(NOT {} = {})", l, self.escape(right)?)),
            ComparisonOperator::Gt => Ok(format!("({} > {})", l, self.escape(right)?)),
            ComparisonOperator::Ge => Ok(format!("({} >= {})", l, self.escape(right)?)),
            ComparisonOperator::Lt => Ok(format!("({} < {})", l, self.escape(right)?)),
            ComparisonOperator::Le => Ok(format!("({} <= {})", l, self.escape(right)?)),
            ComparisonOperator::In => Ok(format!("({} IN ({}))", l, self.format_set(right)?)),
            ComparisonOperator::NotIn => {
                Ok(format!("(NOT {} IN ({}))", l, self.format_set(right)?))
            }
        }
    }

    /// Contents of an `IN (...)` list; an empty set becomes `NULL`.
    fn format_set(&self, right: &Expression) -> QueryResult<String> {
        match right {
            Expression::Literal(Value::Array(items)) if items.is_empty() => Ok("NULL".to_string()),
            Expression::Literal(Value::Array(items)) => Ok(items
                .iter()
                .map(|item| self.escape_value(item))
                .collect::<QueryResult<Vec<_>>>()?
                .join(", ")),
            Expression::Subquery(query) => self.format_subquery(query),
            other => self.escape(other),
        }
    }

    // ------------------------------------------------------------------
    // Escaping
    // ------------------------------------------------------------------

    /// Render an expression used as a value.
    pub fn escape(&self, expr: &Expression) -> QueryResult<String> {
        match expr {
            Expression::Literal(value) => self.escape_value(value),
            Expression::Member(path) => Ok(self.escape_name(path)),
            Expression::MethodCall { name, args } => self.functions.render(self, name, args),
            Expression::Arithmetic {
                left,
                operator,
                right,
            } => self.functions.render(
                self,
                operator.name(),
                &[left.as_ref().clone(), right.as_ref().clone()],
            ),
            Expression::Subquery(query) => Ok(format!("({})", self.format_subquery(query)?)),
            Expression::Logical { .. } | Expression::Comparison { .. } | Expression::Not(_) => {
                self.format_where(expr)
            }
        }
    }

    /// Comma-separated list of escaped expressions.
    pub fn escape_list(&self, exprs: &[Expression]) -> QueryResult<String> {
        Ok(exprs
            .iter()
            .map(|expr| self.escape(expr))
            .collect::<QueryResult<Vec<_>>>()?
            .join(", "))
    }

    /// Render a constant.
    pub fn escape_value(&self, value: &Value) -> QueryResult<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Number(n) => Ok(n.to_string()),
            Value::String(s) => Ok(escape_string(s)),
            Value::Array(items) => Ok(items
                .iter()
                .map(|item| self.escape_value(item))
                .collect::<QueryResult<Vec<_>>>()?
                .join(", ")),
            Value::Object(_) => self.escape(&Expression::from_value(value)?),
        }
    }

    /// Apply the identifier template to every word of `name`.
    pub fn escape_name(&self, name: &str) -> String {
        NAME_RE
            .replace_all(name, |caps: &Captures| {
                self.settings.name_format.replace("$1", &caps[1])
            })
            .into_owned()
    }

    pub fn escape_entity(&self, entity: &str) -> String {
        self.escape_name(entity)
    }
}

fn entity_of(query: &QueryExpression) -> QueryResult<&str> {
    query.collection.as_deref().ok_or_else(|| {
        QueryError::FormatError("Query expression has no entity".to_string())
    })
}

/// Quote a string literal, escaping control characters, quotes and backslashes.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\x08' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            '\'' => out.push_str("''"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

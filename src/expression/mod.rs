//! Expression model shared by every front end.
//!
//! The OData parser, the closure parser and the fluent builder all produce
//! [`Expression`] trees. The smart constructors on [`Expression`] own the two
//! structural invariants of the model:
//!
//! - same-operator logical nodes are flattened into one operand list
//! - arithmetic and logical composition of two literals is folded eagerly
//!
//! The typed combinators at the bottom of this module (`field("price").greater_than(5)`)
//! are the native way to write a predicate without going through any text grammar.

mod value;

use serde_json::Value;

use crate::query::QueryExpression;

/// Logical connective of a [`Expression::Logical`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    /// Key used in the serialized comparison-object form.
    pub fn key(&self) -> &'static str {
        match self {
            LogicalOperator::And => "$and",
            LogicalOperator::Or => "$or",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "$and" => Some(LogicalOperator::And),
            "$or" => Some(LogicalOperator::Or),
            _ => None,
        }
    }

    /// SQL separator placed between operands.
    pub fn separator(&self) -> &'static str {
        match self {
            LogicalOperator::And => " AND ",
            LogicalOperator::Or => " OR ",
        }
    }
}

/// Comparison operator of a [`Expression::Comparison`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl ComparisonOperator {
    pub fn key(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "$eq",
            ComparisonOperator::Ne => "$ne",
            ComparisonOperator::Lt => "$lt",
            ComparisonOperator::Le => "$lte",
            ComparisonOperator::Gt => "$gt",
            ComparisonOperator::Ge => "$gte",
            ComparisonOperator::In => "$in",
            ComparisonOperator::NotIn => "$nin",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "$eq" => Some(ComparisonOperator::Eq),
            "$ne" => Some(ComparisonOperator::Ne),
            "$lt" => Some(ComparisonOperator::Lt),
            "$lte" => Some(ComparisonOperator::Le),
            "$gt" => Some(ComparisonOperator::Gt),
            "$gte" => Some(ComparisonOperator::Ge),
            "$in" => Some(ComparisonOperator::In),
            "$nin" => Some(ComparisonOperator::NotIn),
            _ => None,
        }
    }

    /// Operator to use when the operands are swapped (`5 < x` becomes `x > 5`).
    /// Set membership cannot be mirrored.
    pub fn mirror(&self) -> Option<Self> {
        match self {
            ComparisonOperator::Eq => Some(ComparisonOperator::Eq),
            ComparisonOperator::Ne => Some(ComparisonOperator::Ne),
            ComparisonOperator::Lt => Some(ComparisonOperator::Gt),
            ComparisonOperator::Le => Some(ComparisonOperator::Ge),
            ComparisonOperator::Gt => Some(ComparisonOperator::Lt),
            ComparisonOperator::Ge => Some(ComparisonOperator::Le),
            ComparisonOperator::In | ComparisonOperator::NotIn => None,
        }
    }
}

/// Arithmetic operator of a [`Expression::Arithmetic`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithmeticOperator {
    /// Function name of the operator, also the name of its SQL renderer.
    pub fn name(&self) -> &'static str {
        match self {
            ArithmeticOperator::Add => "add",
            ArithmeticOperator::Sub => "sub",
            ArithmeticOperator::Mul => "mul",
            ArithmeticOperator::Div => "div",
            ArithmeticOperator::Mod => "mod",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            ArithmeticOperator::Add => "$add",
            ArithmeticOperator::Sub => "$sub",
            ArithmeticOperator::Mul => "$mul",
            ArithmeticOperator::Div => "$div",
            ArithmeticOperator::Mod => "$mod",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "add" => Some(ArithmeticOperator::Add),
            "sub" => Some(ArithmeticOperator::Sub),
            "mul" => Some(ArithmeticOperator::Mul),
            "div" => Some(ArithmeticOperator::Div),
            "mod" => Some(ArithmeticOperator::Mod),
            _ => None,
        }
    }

    /// Evaluate the operator over two constants.
    ///
    /// Returns `None` when the operation cannot be folded: non-numeric
    /// operands, division by zero, overflow into a non-finite float.
    pub fn apply(&self, left: &Value, right: &Value) -> Option<Value> {
        if *self == ArithmeticOperator::Add && (left.is_string() || right.is_string()) {
            return Some(Value::String(format!(
                "{}{}",
                constant_text(left)?,
                constant_text(right)?
            )));
        }

        if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
            let exact = match self {
                ArithmeticOperator::Add => a.checked_add(b),
                ArithmeticOperator::Sub => a.checked_sub(b),
                ArithmeticOperator::Mul => a.checked_mul(b),
                ArithmeticOperator::Div if a.checked_rem(b) == Some(0) => a.checked_div(b),
                ArithmeticOperator::Div => None,
                ArithmeticOperator::Mod if b != 0 => a.checked_rem(b),
                ArithmeticOperator::Mod => return None,
            };
            if let Some(n) = exact {
                return Some(Value::from(n));
            }
        }

        let (a, b) = (left.as_f64()?, right.as_f64()?);
        let result = match self {
            ArithmeticOperator::Add => a + b,
            ArithmeticOperator::Sub => a - b,
            ArithmeticOperator::Mul => a * b,
            ArithmeticOperator::Div if b == 0.0 => return None,
            ArithmeticOperator::Div => a / b,
            ArithmeticOperator::Mod if b == 0.0 => return None,
            ArithmeticOperator::Mod => a % b,
        };
        serde_json::Number::from_f64(result).map(Value::Number)
    }
}

fn constant_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// A node of the query expression algebra.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Constant value
    Literal(Value),
    /// Reference to a queryable field, as a dotted path
    Member(String),
    /// N-ary AND / OR
    Logical {
        operator: LogicalOperator,
        operands: Vec<Expression>,
    },
    Comparison {
        left: Box<Expression>,
        operator: ComparisonOperator,
        right: Box<Expression>,
    },
    Arithmetic {
        left: Box<Expression>,
        operator: ArithmeticOperator,
        right: Box<Expression>,
    },
    /// Call of a named scalar or aggregate function
    MethodCall { name: String, args: Vec<Expression> },
    /// Negated predicate
    Not(Box<Expression>),
    /// Nested select query, used by `IN (SELECT ...)`
    Subquery(Box<QueryExpression>),
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn member(path: impl Into<String>) -> Self {
        Expression::Member(path.into())
    }

    pub fn method(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::MethodCall {
            name: name.into(),
            args,
        }
    }

    pub fn comparison(left: Expression, operator: ComparisonOperator, right: Expression) -> Self {
        Expression::Comparison {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    /// Build an arithmetic node, folding it when both operands are literals.
    pub fn arithmetic(left: Expression, operator: ArithmeticOperator, right: Expression) -> Self {
        if let (Some(a), Some(b)) = (left.as_literal(), right.as_literal()) {
            if let Some(folded) = operator.apply(a, b) {
                tracing::trace!("folded {} {} {} into {}", a, operator.name(), b, folded);
                return Expression::Literal(folded);
            }
        }
        Expression::Arithmetic {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    /// Build a logical node, folding two boolean literals and merging
    /// operands of nodes that already use the same operator.
    pub fn logical(operator: LogicalOperator, left: Expression, right: Expression) -> Self {
        if let (Some(Value::Bool(a)), Some(Value::Bool(b))) = (left.as_literal(), right.as_literal())
        {
            let folded = match operator {
                LogicalOperator::And => *a && *b,
                LogicalOperator::Or => *a || *b,
            };
            return Expression::Literal(Value::Bool(folded));
        }

        let mut operands = match left {
            Expression::Logical {
                operator: op,
                operands,
            } if op == operator => operands,
            other => vec![other],
        };
        match right {
            Expression::Logical {
                operator: op,
                operands: rest,
            } if op == operator => operands.extend(rest),
            other => operands.push(other),
        }
        Expression::Logical { operator, operands }
    }

    /// AND of all operands; a single operand is returned as is.
    pub fn all(operands: Vec<Expression>) -> Option<Self> {
        operands
            .into_iter()
            .reduce(|acc, next| Expression::logical(LogicalOperator::And, acc, next))
    }

    /// OR of all operands; a single operand is returned as is.
    pub fn any(operands: Vec<Expression>) -> Option<Self> {
        operands
            .into_iter()
            .reduce(|acc, next| Expression::logical(LogicalOperator::Or, acc, next))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expression::Literal(_))
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expression::Literal(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_member(&self) -> Option<&str> {
        match self {
            Expression::Member(path) => Some(path),
            _ => None,
        }
    }

    /// True for nodes that evaluate to a boolean predicate.
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            Expression::Logical { .. } | Expression::Comparison { .. } | Expression::Not(_)
        )
    }

    // ------------------------------------------------------------------
    // Typed combinators
    // ------------------------------------------------------------------

    pub fn equal(self, other: impl Into<Expression>) -> Expression {
        Expression::comparison(self, ComparisonOperator::Eq, other.into())
    }

    pub fn not_equal(self, other: impl Into<Expression>) -> Expression {
        Expression::comparison(self, ComparisonOperator::Ne, other.into())
    }

    pub fn greater_than(self, other: impl Into<Expression>) -> Expression {
        Expression::comparison(self, ComparisonOperator::Gt, other.into())
    }

    pub fn greater_or_equal(self, other: impl Into<Expression>) -> Expression {
        Expression::comparison(self, ComparisonOperator::Ge, other.into())
    }

    pub fn lower_than(self, other: impl Into<Expression>) -> Expression {
        Expression::comparison(self, ComparisonOperator::Lt, other.into())
    }

    pub fn lower_or_equal(self, other: impl Into<Expression>) -> Expression {
        Expression::comparison(self, ComparisonOperator::Le, other.into())
    }

    pub fn is_in<I, V>(self, values: I) -> Expression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list = values.into_iter().map(Into::into).collect::<Vec<Value>>();
        Expression::comparison(self, ComparisonOperator::In, Expression::Literal(Value::Array(list)))
    }

    pub fn not_in<I, V>(self, values: I) -> Expression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list = values.into_iter().map(Into::into).collect::<Vec<Value>>();
        Expression::comparison(
            self,
            ComparisonOperator::NotIn,
            Expression::Literal(Value::Array(list)),
        )
    }

    pub fn plus(self, other: impl Into<Expression>) -> Expression {
        Expression::arithmetic(self, ArithmeticOperator::Add, other.into())
    }

    pub fn minus(self, other: impl Into<Expression>) -> Expression {
        Expression::arithmetic(self, ArithmeticOperator::Sub, other.into())
    }

    pub fn times(self, other: impl Into<Expression>) -> Expression {
        Expression::arithmetic(self, ArithmeticOperator::Mul, other.into())
    }

    pub fn divided_by(self, other: impl Into<Expression>) -> Expression {
        Expression::arithmetic(self, ArithmeticOperator::Div, other.into())
    }

    pub fn modulo(self, other: impl Into<Expression>) -> Expression {
        Expression::arithmetic(self, ArithmeticOperator::Mod, other.into())
    }

    pub fn and(self, other: Expression) -> Expression {
        Expression::logical(LogicalOperator::And, self, other)
    }

    pub fn or(self, other: Expression) -> Expression {
        Expression::logical(LogicalOperator::Or, self, other)
    }
}

impl std::ops::Not for Expression {
    type Output = Expression;

    fn not(self) -> Expression {
        match self {
            Expression::Literal(Value::Bool(b)) => Expression::Literal(Value::Bool(!b)),
            Expression::Not(inner) => *inner,
            other => Expression::Not(Box::new(other)),
        }
    }
}

/// Reference a queryable field.
pub fn field(path: impl Into<String>) -> Expression {
    Expression::member(path)
}

/// Wrap a constant.
pub fn lit(value: impl Into<Value>) -> Expression {
    Expression::literal(value)
}

/// Call a named function.
pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Expression {
    Expression::method(name, args)
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Expression::Literal(value)
    }
}

impl From<&str> for Expression {
    fn from(value: &str) -> Self {
        Expression::Literal(Value::from(value))
    }
}

impl From<String> for Expression {
    fn from(value: String) -> Self {
        Expression::Literal(Value::from(value))
    }
}

impl From<bool> for Expression {
    fn from(value: bool) -> Self {
        Expression::Literal(Value::from(value))
    }
}

impl From<i32> for Expression {
    fn from(value: i32) -> Self {
        Expression::Literal(Value::from(value))
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Self {
        Expression::Literal(Value::from(value))
    }
}

impl From<u32> for Expression {
    fn from(value: u32) -> Self {
        Expression::Literal(Value::from(value))
    }
}

impl From<u64> for Expression {
    fn from(value: u64) -> Self {
        Expression::Literal(Value::from(value))
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Expression::Literal(Value::from(value))
    }
}

impl From<QueryExpression> for Expression {
    fn from(query: QueryExpression) -> Self {
        Expression::Subquery(Box::new(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arithmetic_folds_integers() {
        let expr = Expression::arithmetic(lit(2), ArithmeticOperator::Add, lit(3));
        assert_eq!(expr, Expression::Literal(json!(5)));

        let expr = Expression::arithmetic(lit(7), ArithmeticOperator::Mod, lit(4));
        assert_eq!(expr, Expression::Literal(json!(3)));
    }

    #[test]
    fn test_arithmetic_inexact_division_is_float() {
        let expr = Expression::arithmetic(lit(7), ArithmeticOperator::Div, lit(2));
        assert_eq!(expr, Expression::Literal(json!(3.5)));

        let expr = Expression::arithmetic(lit(8), ArithmeticOperator::Div, lit(2));
        assert_eq!(expr, Expression::Literal(json!(4)));
    }

    #[test]
    fn test_division_by_zero_is_not_folded() {
        let expr = Expression::arithmetic(lit(1), ArithmeticOperator::Div, lit(0));
        assert!(matches!(expr, Expression::Arithmetic { .. }));
    }

    #[test]
    fn test_string_concatenation_folds() {
        let expr = Expression::arithmetic(lit("ab"), ArithmeticOperator::Add, lit(1));
        assert_eq!(expr, Expression::Literal(json!("ab1")));
    }

    #[test]
    fn test_arithmetic_with_member_is_kept() {
        let expr = field("price").plus(5);
        assert_eq!(
            expr,
            Expression::Arithmetic {
                left: Box::new(Expression::Member("price".to_string())),
                operator: ArithmeticOperator::Add,
                right: Box::new(Expression::Literal(json!(5))),
            }
        );
    }

    #[test]
    fn test_logical_flattening() {
        let expr = field("a")
            .equal(1)
            .and(field("b").equal(2))
            .and(field("c").equal(3));
        match expr {
            Expression::Logical { operator, operands } => {
                assert_eq!(operator, LogicalOperator::And);
                assert_eq!(operands.len(), 3);
            }
            other => panic!("Expected Logical, got {:?}", other),
        }
    }

    #[test]
    fn test_mixed_logical_wraps() {
        let expr = field("a")
            .equal(1)
            .and(field("b").equal(2))
            .or(field("c").equal(3));
        match expr {
            Expression::Logical { operator, operands } => {
                assert_eq!(operator, LogicalOperator::Or);
                assert_eq!(operands.len(), 2);
                assert!(matches!(
                    operands[0],
                    Expression::Logical {
                        operator: LogicalOperator::And,
                        ..
                    }
                ));
            }
            other => panic!("Expected Logical, got {:?}", other),
        }
    }

    #[test]
    fn test_logical_folds_booleans() {
        let expr = Expression::logical(LogicalOperator::And, lit(true), lit(false));
        assert_eq!(expr, Expression::Literal(json!(false)));
        let expr = Expression::logical(LogicalOperator::Or, lit(true), lit(false));
        assert_eq!(expr, Expression::Literal(json!(true)));
    }

    #[test]
    fn test_not_operator() {
        assert_eq!(!lit(true), lit(false));
        let negated = !field("active").equal(true);
        assert!(matches!(negated, Expression::Not(_)));
        assert_eq!(!negated, field("active").equal(true));
    }

    #[test]
    fn test_mirror() {
        assert_eq!(ComparisonOperator::Lt.mirror(), Some(ComparisonOperator::Gt));
        assert_eq!(ComparisonOperator::Ge.mirror(), Some(ComparisonOperator::Le));
        assert_eq!(ComparisonOperator::Eq.mirror(), Some(ComparisonOperator::Eq));
        assert_eq!(ComparisonOperator::In.mirror(), None);
    }

    #[test]
    fn test_all_and_any() {
        assert_eq!(Expression::all(vec![]), None);
        assert_eq!(
            Expression::all(vec![field("a").equal(1)]),
            Some(field("a").equal(1))
        );
        match Expression::any(vec![field("a").equal(1), field("b").equal(2)]) {
            Some(Expression::Logical { operator, operands }) => {
                assert_eq!(operator, LogicalOperator::Or);
                assert_eq!(operands.len(), 2);
            }
            other => panic!("Expected Logical, got {:?}", other),
        }
    }
}

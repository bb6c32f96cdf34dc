//! Canonical comparison-object serialization of [`Expression`].
//!
//! A comparison whose left side is a field (optionally wrapped by one
//! function) is written in field-keyed form:
//!
//! ```text
//! {"name": "a"}                              name = 'a'
//! {"name": {"$ne": "a"}}                     name <> 'a'
//! {"orderDate": {"$year": 10}}               YEAR(orderDate) = 10
//! {"Price": {"$add": [5, {"$gt": 100}]}}     (Price + 5) > 100
//! ```
//!
//! Everything else uses operator-keyed objects (`{"$and": [...]}`,
//! `{"$gt": [left, right]}`, `{"$round": [x, 2]}`, `{"$name": "field"}`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::{ArithmeticOperator, ComparisonOperator, Expression, LogicalOperator};
use crate::error::{QueryError, QueryResult};
use crate::query::QueryExpression;

const QUERY_KEYS: [&str; 5] = ["$select", "$insert", "$update", "$delete", "$collection"];

impl Expression {
    /// Serialize into the comparison-object form.
    ///
    /// Fails only when an embedded sub-query cannot be serialized.
    pub fn to_value(&self) -> QueryResult<Value> {
        Ok(match self {
            Expression::Literal(value) => value.clone(),
            Expression::Member(path) => single("$name", Value::String(path.clone())),
            Expression::Logical { operator, operands } => {
                single(operator.key(), Value::Array(values_of(operands)?))
            }
            Expression::Not(inner) => single("$not", inner.to_value()?),
            Expression::Comparison {
                left,
                operator,
                right,
            } => comparison_to_value(left, *operator, right)?,
            Expression::Arithmetic {
                left,
                operator,
                right,
            } => single(
                operator.key(),
                Value::Array(vec![left.to_value()?, right.to_value()?]),
            ),
            Expression::MethodCall { name, args } => {
                single(&format!("${}", name), Value::Array(values_of(args)?))
            }
            Expression::Subquery(query) => serde_json::to_value(query.as_ref())?,
        })
    }

    /// Parse the comparison-object form.
    pub fn from_value(value: &Value) -> QueryResult<Expression> {
        match value {
            Value::Object(map) => object_to_expression(map),
            other => Ok(Expression::Literal(other.clone())),
        }
    }
}

fn values_of(exprs: &[Expression]) -> QueryResult<Vec<Value>> {
    exprs.iter().map(Expression::to_value).collect()
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

/// The `{"$op": right}` part of a field-keyed comparison, or the bare value
/// for an equality against a scalar.
fn comparison_part(operator: ComparisonOperator, right: &Expression) -> QueryResult<Value> {
    match (operator, right) {
        (ComparisonOperator::Eq, Expression::Literal(value))
            if !value.is_array() && !value.is_object() =>
        {
            Ok(value.clone())
        }
        _ => Ok(single(operator.key(), right.to_value()?)),
    }
}

fn function_arguments(rest: &[Expression], part: Value) -> QueryResult<Value> {
    if rest.is_empty() {
        return Ok(part);
    }
    let mut items = values_of(rest)?;
    items.push(part);
    Ok(Value::Array(items))
}

fn comparison_to_value(
    left: &Expression,
    operator: ComparisonOperator,
    right: &Expression,
) -> QueryResult<Value> {
    let general = || -> QueryResult<Value> {
        Ok(single(
            operator.key(),
            Value::Array(vec![left.to_value()?, right.to_value()?]),
        ))
    };

    match left {
        Expression::Member(path) => Ok(single(path, comparison_part(operator, right)?)),
        Expression::MethodCall { name, args } => match args.split_first() {
            Some((Expression::Member(path), rest)) => Ok(single(
                path,
                single(
                    &format!("${}", name),
                    function_arguments(rest, comparison_part(operator, right)?)?,
                ),
            )),
            _ => general(),
        },
        Expression::Arithmetic {
            left: inner,
            operator: arithmetic,
            right: operand,
        } => match inner.as_ref() {
            Expression::Member(path) => Ok(single(
                path,
                single(
                    arithmetic.key(),
                    function_arguments(
                        std::slice::from_ref(operand.as_ref()),
                        comparison_part(operator, right)?,
                    )?,
                ),
            )),
            _ => general(),
        },
        _ => general(),
    }
}

fn is_query_object(map: &Map<String, Value>) -> bool {
    QUERY_KEYS.iter().any(|key| map.contains_key(*key))
}

fn subquery(map: &Map<String, Value>) -> QueryResult<Expression> {
    let query: QueryExpression = serde_json::from_value(Value::Object(map.clone()))?;
    Ok(Expression::Subquery(Box::new(query)))
}

fn object_to_expression(map: &Map<String, Value>) -> QueryResult<Expression> {
    if is_query_object(map) {
        return subquery(map);
    }
    let mut entries = map.iter();
    match (entries.next(), map.len()) {
        (None, _) => Err(QueryError::FormatError(
            "Empty expression object".to_string(),
        )),
        (Some((key, value)), 1) => entry_to_expression(key, value),
        _ => {
            let operands = map
                .iter()
                .map(|(key, value)| entry_to_expression(key, value))
                .collect::<QueryResult<Vec<_>>>()?;
            Ok(Expression::Logical {
                operator: LogicalOperator::And,
                operands,
            })
        }
    }
}

fn entry_to_expression(key: &str, value: &Value) -> QueryResult<Expression> {
    let Some(name) = key.strip_prefix('$') else {
        return field_comparison(Expression::Member(key.to_string()), value);
    };

    match name {
        "name" if value.is_string() => Ok(Expression::Member(
            value.as_str().unwrap_or_default().to_string(),
        )),
        "not" => Ok(Expression::Not(Box::new(Expression::from_value(value)?))),
        "and" | "or" => {
            let Value::Array(items) = value else {
                return Err(QueryError::FormatError(format!(
                    "Invalid query argument. A logical expression ({}) must contain an array of expressions",
                    key
                )));
            };
            let operator = if name == "and" {
                LogicalOperator::And
            } else {
                LogicalOperator::Or
            };
            let operands = items
                .iter()
                .map(Expression::from_value)
                .collect::<QueryResult<Vec<_>>>()?;
            Ok(Expression::Logical { operator, operands })
        }
        _ => {
            if let Some(operator) = ComparisonOperator::from_key(key) {
                return match value {
                    Value::Array(pair) if pair.len() == 2 => Ok(Expression::comparison(
                        Expression::from_value(&pair[0])?,
                        operator,
                        Expression::from_value(&pair[1])?,
                    )),
                    _ => Err(QueryError::FormatError(format!(
                        "Comparison operator {} expects exactly two operands",
                        key
                    ))),
                };
            }
            let args = match value {
                Value::Array(items) => items
                    .iter()
                    .map(Expression::from_value)
                    .collect::<QueryResult<Vec<_>>>()?,
                other => vec![Expression::from_value(other)?],
            };
            Ok(function_expression(name, args))
        }
    }
}

/// Build the node for a `$name` function; binary arithmetic names become
/// [`Expression::Arithmetic`], everything else a method call.
fn function_expression(name: &str, mut args: Vec<Expression>) -> Expression {
    if let Some(operator) = ArithmeticOperator::from_name(name) {
        if args.len() == 2 {
            if let (Some(right), Some(left)) = (args.pop(), args.pop()) {
                return Expression::Arithmetic {
                    left: Box::new(left),
                    operator,
                    right: Box::new(right),
                };
            }
        }
    }
    Expression::MethodCall {
        name: name.to_string(),
        args,
    }
}

fn field_comparison(left: Expression, value: &Value) -> QueryResult<Expression> {
    let Value::Object(map) = value else {
        return Ok(Expression::comparison(
            left,
            ComparisonOperator::Eq,
            Expression::Literal(value.clone()),
        ));
    };

    if map.is_empty() {
        return Err(QueryError::FormatError(
            "Empty comparison object".to_string(),
        ));
    }
    if is_query_object(map) || (map.len() == 1 && map.contains_key("$name")) {
        return Ok(Expression::comparison(
            left,
            ComparisonOperator::Eq,
            Expression::from_value(value)?,
        ));
    }
    if map.len() > 1 {
        // range form: {"$gt": 1, "$lt": 5}
        let operands = map
            .iter()
            .map(|(key, operand)| comparison_entry(left.clone(), key, operand))
            .collect::<QueryResult<Vec<_>>>()?;
        return Ok(Expression::Logical {
            operator: LogicalOperator::And,
            operands,
        });
    }
    match map.iter().next() {
        Some((key, operand)) => comparison_entry(left, key, operand),
        None => Err(QueryError::FormatError(
            "Empty comparison object".to_string(),
        )),
    }
}

fn comparison_entry(left: Expression, key: &str, value: &Value) -> QueryResult<Expression> {
    let Some(name) = key.strip_prefix('$') else {
        return Err(QueryError::FormatError(format!(
            "Unexpected key '{}' in comparison expression",
            key
        )));
    };

    if let Some(operator) = ComparisonOperator::from_key(key) {
        if matches!(operator, ComparisonOperator::In | ComparisonOperator::NotIn) {
            let valid = match value {
                Value::Array(_) => true,
                Value::Object(map) => is_query_object(map),
                _ => false,
            };
            if !valid {
                return Err(QueryError::FormatError(format!(
                    "Invalid {} expression. Value must be an array or a select query",
                    key
                )));
            }
        }
        return Ok(Expression::comparison(
            left,
            operator,
            Expression::from_value(value)?,
        ));
    }

    match name {
        "text" => {
            let pattern = value.get("$search").unwrap_or(value);
            Ok(Expression::method(
                "text",
                vec![left, Expression::from_value(pattern)?],
            ))
        }
        "regex" => Ok(Expression::method(
            "regex",
            vec![left, Expression::from_value(value)?],
        )),
        _ => {
            // {"$add": [5, {"$gt": 100}]}: leading items are extra arguments,
            // the last one is the comparison applied to the function result
            let (extra, comparison) = match value {
                Value::Array(items) => match items.split_last() {
                    Some((last, rest)) => (
                        rest.iter()
                            .map(Expression::from_value)
                            .collect::<QueryResult<Vec<_>>>()?,
                        last,
                    ),
                    None => {
                        return Err(QueryError::FormatError(format!(
                            "Operator {} expects a comparison argument",
                            key
                        )))
                    }
                },
                other => (Vec::new(), other),
            };
            let mut args = vec![left];
            args.extend(extra);
            field_comparison(function_expression(name, args), comparison)
        }
    }
}

impl Serialize for Expression {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Expression::from_value(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{call, field, lit};
    use serde_json::json;

    #[test]
    fn test_member_comparisons() {
        assert_eq!(field("name").equal("a").to_value().unwrap(), json!({"name": "a"}));
        assert_eq!(
            field("name").not_equal("a").to_value().unwrap(),
            json!({"name": {"$ne": "a"}})
        );
        assert_eq!(
            field("price").greater_than(field("cost")).to_value().unwrap(),
            json!({"price": {"$gt": {"$name": "cost"}}})
        );
    }

    #[test]
    fn test_function_comparisons() {
        let year = call("year", vec![field("orderDate")]).equal(10);
        assert_eq!(year.to_value().unwrap(), json!({"orderDate": {"$year": 10}}));

        let sum = field("Price").plus(5).greater_than(100);
        assert_eq!(sum.to_value().unwrap(), json!({"Price": {"$add": [5, {"$gt": 100}]}}));
    }

    #[test]
    fn test_literal_on_left_uses_general_form() {
        let expr = Expression::comparison(lit(5), ComparisonOperator::Gt, field("price"));
        assert_eq!(expr.to_value().unwrap(), json!({"$gt": [5, {"$name": "price"}]}));
    }

    #[test]
    fn test_round_trip() {
        let samples = vec![
            field("name").equal("a").or(field("name").equal("b")),
            field("Price").plus(5).greater_than(100),
            call("year", vec![field("orderDate")]).equal(10),
            !field("id").is_in(vec![1, 2]),
            Expression::comparison(lit(5), ComparisonOperator::Gt, field("price")),
            call("round", vec![field("price"), lit(2)]).lower_or_equal(10),
            field("tags").equal(json!(["a", "b"])),
        ];
        for expr in samples {
            let value = expr.to_value().unwrap();
            assert_eq!(Expression::from_value(&value).unwrap(), expr, "{}", value);
        }
    }

    #[test]
    fn test_subquery_serializes_as_query_object() {
        let inner = QueryExpression::new().select(["user_id"]).from("Orders");
        let expr = Expression::comparison(
            field("id"),
            ComparisonOperator::In,
            Expression::Subquery(Box::new(inner.clone())),
        );
        let value = expr.to_value().unwrap();
        assert_eq!(
            value,
            json!({"id": {"$in": {"$collection": "Orders", "$select": [{"$name": "user_id"}]}}})
        );
        assert_eq!(Expression::from_value(&value).unwrap(), expr);
    }

    #[test]
    fn test_multi_key_objects() {
        let expr = Expression::from_value(&json!({"a": 1, "b": {"$gt": 1, "$lt": 5}})).unwrap();
        let expected = Expression::Logical {
            operator: LogicalOperator::And,
            operands: vec![
                field("a").equal(1),
                Expression::Logical {
                    operator: LogicalOperator::And,
                    operands: vec![field("b").greater_than(1), field("b").lower_than(5)],
                },
            ],
        };
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_text_and_regex() {
        let expr = Expression::from_value(&json!({"name": {"$text": {"$search": "abc"}}})).unwrap();
        assert_eq!(expr, call("text", vec![field("name"), lit("abc")]));

        let expr = Expression::from_value(&json!({"name": {"$regex": "^a"}})).unwrap();
        assert_eq!(expr, call("regex", vec![field("name"), lit("^a")]));
    }

    #[test]
    fn test_invalid_operands() {
        let err = Expression::from_value(&json!({"$and": {"a": 1}})).unwrap_err();
        assert!(matches!(err, QueryError::FormatError(_)));

        let err = Expression::from_value(&json!({"id": {"$in": 5}})).unwrap_err();
        assert!(matches!(err, QueryError::FormatError(_)));

        let err = Expression::from_value(&json!({})).unwrap_err();
        assert!(matches!(err, QueryError::FormatError(_)));
    }

    #[test]
    fn test_serde_impls() {
        let expr = field("name").equal("a");
        let text = serde_json::to_string(&expr).unwrap();
        assert_eq!(text, r#"{"name":"a"}"#);
        let back: Expression = serde_json::from_str(&text).unwrap();
        assert_eq!(back, expr);
    }
}

//! Select, group and order fields.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::expression::{call, Expression};

/// A projected or grouped field: an expression with an optional alias.
///
/// Serializes as the expression itself, or as `{alias: expression}` when
/// aliased. A bare string deserializes as a member reference.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryField {
    pub expr: Expression,
    pub alias: Option<String>,
}

impl QueryField {
    pub fn new(expr: Expression) -> Self {
        Self { expr, alias: None }
    }

    /// Field built from an arbitrary expression.
    pub fn expression(expr: impl Into<Expression>) -> Self {
        Self::new(expr.into())
    }

    pub fn count(field: impl Into<QueryField>) -> Self {
        Self::aggregate("count", field)
    }

    pub fn min(field: impl Into<QueryField>) -> Self {
        Self::aggregate("min", field)
    }

    pub fn max(field: impl Into<QueryField>) -> Self {
        Self::aggregate("max", field)
    }

    pub fn avg(field: impl Into<QueryField>) -> Self {
        Self::aggregate("avg", field)
    }

    pub fn sum(field: impl Into<QueryField>) -> Self {
        Self::aggregate("sum", field)
    }

    pub fn length(field: impl Into<QueryField>) -> Self {
        Self::aggregate("length", field)
    }

    fn aggregate(name: &str, field: impl Into<QueryField>) -> Self {
        Self::new(call(name, vec![field.into().expr]))
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl From<&str> for QueryField {
    fn from(name: &str) -> Self {
        QueryField::new(Expression::member(name))
    }
}

impl From<String> for QueryField {
    fn from(name: String) -> Self {
        QueryField::new(Expression::Member(name))
    }
}

impl From<Expression> for QueryField {
    fn from(expr: Expression) -> Self {
        QueryField::new(expr)
    }
}

impl Serialize for QueryField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self.expr.to_value().map_err(serde::ser::Error::custom)?;
        match &self.alias {
            None => value.serialize(serializer),
            Some(alias) => {
                let mut map = Map::new();
                map.insert(alias.clone(), value);
                Value::Object(map).serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for QueryField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(name) => Ok(QueryField::from(name)),
            Value::Object(map) if map.len() == 1 => {
                let (key, inner) = map.into_iter().next().ok_or_else(|| D::Error::custom("empty field"))?;
                if key.starts_with('$') {
                    let mut single = Map::new();
                    single.insert(key, inner);
                    Expression::from_value(&Value::Object(single))
                        .map(QueryField::new)
                        .map_err(D::Error::custom)
                } else {
                    let expr = match inner {
                        Value::String(name) => Expression::Member(name),
                        other => Expression::from_value(&other).map_err(D::Error::custom)?,
                    };
                    Ok(QueryField::new(expr).alias(key))
                }
            }
            other => Expression::from_value(&other)
                .map(QueryField::new)
                .map_err(D::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// One `ORDER BY` item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: Expression,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn new(field: Expression, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    pub fn ascending(field: impl Into<QueryField>) -> Self {
        Self::new(field.into().expr, SortDirection::Ascending)
    }

    pub fn descending(field: impl Into<QueryField>) -> Self {
        Self::new(field.into().expr, SortDirection::Descending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::field;
    use serde_json::json;

    #[test]
    fn test_field_serialization() {
        let plain = QueryField::from("id");
        assert_eq!(serde_json::to_value(&plain).unwrap(), json!({"$name": "id"}));

        let counted = QueryField::count("id").alias("total");
        assert_eq!(
            serde_json::to_value(&counted).unwrap(),
            json!({"total": {"$count": [{"$name": "id"}]}})
        );
    }

    #[test]
    fn test_field_deserialization() {
        let field_value: QueryField = serde_json::from_value(json!("name")).unwrap();
        assert_eq!(field_value.expr, field("name"));
        assert_eq!(field_value.alias, None);

        let aliased: QueryField = serde_json::from_value(json!({"total": {"$count": [{"$name": "id"}]}})).unwrap();
        assert_eq!(aliased.alias.as_deref(), Some("total"));
        assert_eq!(aliased.expr, call("count", vec![field("id")]));

        let renamed: QueryField = serde_json::from_value(json!({"userName": "name"})).unwrap();
        assert_eq!(renamed.expr, field("name"));
        assert_eq!(renamed.alias.as_deref(), Some("userName"));
    }

    #[test]
    fn test_field_round_trip() {
        let original = QueryField::max("price").alias("highest");
        let value = serde_json::to_value(&original).unwrap();
        let back: QueryField = serde_json::from_value(value).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_order_by_serialization() {
        let order = OrderBy::descending("name");
        assert_eq!(
            serde_json::to_value(&order).unwrap(),
            json!({"field": {"$name": "name"}, "direction": "desc"})
        );
        let parsed: OrderBy = serde_json::from_value(json!({"field": {"$name": "id"}})).unwrap();
        assert_eq!(parsed, OrderBy::ascending("id"));
    }
}

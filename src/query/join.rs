//! Join clauses (`$expand`).

use serde::{Deserialize, Serialize};

use super::QueryExpression;
use crate::expression::Expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

/// What is joined: a plain entity or a nested select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinTarget {
    Entity(String),
    Query(Box<QueryExpression>),
}

/// `Entity.field` reference used by field-pair join conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub field: String,
}

impl FieldRef {
    pub fn new(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            entity: Some(entity.into()),
            field: field.into(),
        }
    }

    /// Split `Entity.field` on its last dot; a bare name has no entity.
    pub fn parse(path: &str) -> Self {
        match path.rsplit_once('.') {
            Some((entity, field)) => Self::new(entity, field),
            None => Self {
                entity: None,
                field: path.to_string(),
            },
        }
    }

    /// Dotted path, the form the formatter escapes.
    pub fn path(&self) -> String {
        match &self.entity {
            Some(entity) => format!("{}.{}", entity, self.field),
            None => self.field.clone(),
        }
    }
}

impl From<&str> for FieldRef {
    fn from(path: &str) -> Self {
        FieldRef::parse(path)
    }
}

/// Join condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinOn {
    /// Pairwise equality: `left[i] = right[i]`
    Fields {
        left: Vec<FieldRef>,
        right: Vec<FieldRef>,
    },
    Predicate(Expression),
}

impl JoinOn {
    pub fn fields<L, R>(left: L, right: R) -> Self
    where
        L: IntoIterator,
        L::Item: Into<FieldRef>,
        R: IntoIterator,
        R::Item: Into<FieldRef>,
    {
        JoinOn::Fields {
            left: left.into_iter().map(Into::into).collect(),
            right: right.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<(&str, &str)> for JoinOn {
    fn from((left, right): (&str, &str)) -> Self {
        JoinOn::fields([left], [right])
    }
}

impl From<Expression> for JoinOn {
    fn from(predicate: Expression) -> Self {
        JoinOn::Predicate(predicate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinExpression {
    pub target: JoinTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub kind: JoinKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<JoinOn>,
}

impl JoinExpression {
    pub fn new(target: JoinTarget, kind: JoinKind) -> Self {
        Self {
            target,
            alias: None,
            kind,
            on: None,
        }
    }
}

/// Pending join returned by [`QueryExpression::join`] and friends.
#[must_use = "a join is only added to the query by `with`"]
pub struct JoinBuilder {
    query: QueryExpression,
    join: JoinExpression,
}

impl JoinBuilder {
    pub(crate) fn new(query: QueryExpression, join: JoinExpression) -> Self {
        Self { query, join }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.join.alias = Some(alias.into());
        self
    }

    /// Set the join condition and return the query.
    pub fn with(mut self, on: impl Into<JoinOn>) -> QueryExpression {
        self.join.on = Some(on.into());
        self.query.expand.push(self.join);
        self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_ref_parse() {
        assert_eq!(FieldRef::parse("Role.user_id"), FieldRef::new("Role", "user_id"));
        assert_eq!(FieldRef::parse("id").entity, None);
        assert_eq!(FieldRef::parse("db.Role.id").path(), "db.Role.id");
    }

    #[test]
    fn test_join_builder() {
        let query = QueryExpression::new()
            .from("UserBase")
            .left_join("UserRole")
            .alias("r")
            .with(("UserBase.id", "r.user_id"));

        assert_eq!(query.expand.len(), 1);
        let join = &query.expand[0];
        assert_eq!(join.kind, JoinKind::Left);
        assert_eq!(join.alias.as_deref(), Some("r"));
        assert_eq!(
            join.on,
            Some(JoinOn::fields(["UserBase.id"], ["r.user_id"]))
        );
    }

    #[test]
    fn test_join_serialization() {
        let join = JoinExpression {
            target: JoinTarget::Entity("Role".to_string()),
            alias: None,
            kind: JoinKind::Inner,
            on: Some(JoinOn::fields(["UserBase.role_id"], ["Role.id"])),
        };
        let value = serde_json::to_value(&join).unwrap();
        assert_eq!(
            value,
            json!({
                "target": {"entity": "Role"},
                "kind": "inner",
                "on": {"fields": {
                    "left": [{"entity": "UserBase", "field": "role_id"}],
                    "right": [{"entity": "Role", "field": "id"}]
                }}
            })
        );
        let back: JoinExpression = serde_json::from_value(value).unwrap();
        assert_eq!(back, join);
    }
}

//! OData query front end.
//!
//! `$filter` strings are parsed into [`Expression`] trees; the `$select`,
//! `$orderby` and `$groupby` sequences into fields. [`ODataQuery`] gathers the
//! system query options of a request and assembles a [`QueryExpression`].

pub mod lexer;
pub mod parser;

use serde::{Deserialize, Serialize};

use crate::error::QueryResult;
use crate::expression::Expression;
use crate::query::{OrderBy, QueryExpression, QueryField};
use crate::resolver::{DefaultResolver, MemberResolver};

pub use lexer::{tokenize, LiteralType, LiteralValue, Syntax, Token};
pub use parser::Parser;

/// Parse a filter string with identity member resolution.
pub fn parse(source: &str) -> QueryResult<Expression> {
    parse_with(source, &DefaultResolver)
}

/// Parse a filter string, resolving members and methods through `resolver`.
pub fn parse_with(source: &str, resolver: &dyn MemberResolver) -> QueryResult<Expression> {
    tracing::debug!("parsing OData filter: {}", source);
    Parser::new(source, resolver)?.parse()
}

pub fn parse_select_sequence(source: &str) -> QueryResult<Vec<QueryField>> {
    Parser::new(source, &DefaultResolver)?.parse_select_sequence()
}

pub fn parse_order_by_sequence(source: &str) -> QueryResult<Vec<OrderBy>> {
    Parser::new(source, &DefaultResolver)?.parse_order_by_sequence()
}

pub fn parse_group_by_sequence(source: &str) -> QueryResult<Vec<QueryField>> {
    Parser::new(source, &DefaultResolver)?.parse_group_by_sequence()
}

/// System query options of an OData request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ODataQuery {
    #[serde(rename = "$filter", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(rename = "$select", default, skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    #[serde(rename = "$orderby", default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(rename = "$groupby", default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    #[serde(rename = "$top", default, skip_serializing_if = "Option::is_none")]
    pub top: Option<u64>,
    #[serde(rename = "$skip", default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
}

impl ODataQuery {
    /// Build a select query over `entity` from the options.
    ///
    /// Blank options are ignored; a missing `$select` selects every column.
    pub fn to_query_expression(
        &self,
        entity: &str,
        resolver: &dyn MemberResolver,
    ) -> QueryResult<QueryExpression> {
        let mut query = QueryExpression::new().from(entity);

        query = match non_blank(&self.select) {
            Some(select) => query.select(Parser::new(select, resolver)?.parse_select_sequence()?),
            None => query.select_all(),
        };

        if let Some(filter) = non_blank(&self.filter) {
            query = query.filter(parse_with(filter, resolver)?);
        }
        if let Some(group_by) = non_blank(&self.group_by) {
            query = query.group_by(Parser::new(group_by, resolver)?.parse_group_by_sequence()?);
        }
        if let Some(order_by) = non_blank(&self.order_by) {
            query = query.order(Parser::new(order_by, resolver)?.parse_order_by_sequence()?);
        }
        if let Some(skip) = self.skip {
            query = query.skip(skip);
        }
        if let Some(top) = self.top {
            query = query.take(top);
        }

        Ok(query)
    }
}

fn non_blank(option: &Option<String>) -> Option<&str> {
    option.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortDirection;
    use crate::resolver::MappedResolver;
    use serde_json::json;

    #[test]
    fn test_odata_query_assembly() {
        let options = ODataQuery {
            filter: Some("price gt 10".to_string()),
            select: Some("id, name".to_string()),
            order_by: Some("name desc".to_string()),
            group_by: None,
            top: Some(5),
            skip: Some(10),
        };
        let query = options
            .to_query_expression("Product", &DefaultResolver)
            .unwrap();

        assert_eq!(query.collection.as_deref(), Some("Product"));
        assert_eq!(query.select.as_ref().map(Vec::len), Some(2));
        assert_eq!(
            query.where_clause,
            Some(Expression::member("price").greater_than(10))
        );
        assert_eq!(query.order[0].direction, SortDirection::Descending);
        assert_eq!(query.take, Some(5));
        assert_eq!(query.skip, Some(10));
        assert!(query.has_paging());
    }

    #[test]
    fn test_odata_query_defaults_to_select_all() {
        let query = ODataQuery::default()
            .to_query_expression("Product", &DefaultResolver)
            .unwrap();
        assert_eq!(query.select, Some(vec![]));
        assert!(query.where_clause.is_none());
    }

    #[test]
    fn test_odata_query_uses_resolver() {
        let resolver = MappedResolver::new().map_member("Name", "product_name");
        let options = ODataQuery {
            filter: Some("Name eq 'x'".to_string()),
            ..Default::default()
        };
        let query = options.to_query_expression("Product", &resolver).unwrap();
        assert_eq!(
            query.where_clause,
            Some(Expression::member("product_name").equal("x"))
        );
    }

    #[test]
    fn test_odata_query_deserialize() {
        let options: ODataQuery = serde_json::from_value(json!({
            "$filter": "id eq 1",
            "$top": 3
        }))
        .unwrap();
        assert_eq!(options.filter.as_deref(), Some("id eq 1"));
        assert_eq!(options.top, Some(3));
        assert!(options.select.is_none());
    }
}

//! Comma-separated sequences: `$select`, `$orderby` and `$groupby`.

use crate::error::{QueryError, QueryResult};
use crate::odata::lexer::{Syntax, Token};
use crate::odata::parser::Parser;
use crate::query::{OrderBy, QueryField, SortDirection};

impl<'a> Parser<'a> {
    /// `id, name, count(id) as total`
    pub fn parse_select_sequence(&mut self) -> QueryResult<Vec<QueryField>> {
        self.parse_sequence(|parser| {
            let expr = parser.parse_expression()?;
            let mut field = QueryField::new(expr);
            if parser.is_keyword("as") {
                parser.advance();
                match parser.current_token() {
                    Some(Token::Identifier(alias)) => {
                        field = field.alias(alias.clone());
                        parser.advance();
                    }
                    _ => {
                        return Err(QueryError::ParseError(
                            "Expected alias after 'as'".to_string(),
                        ))
                    }
                }
            }
            Ok(field)
        })
    }

    /// `name desc, id`
    pub fn parse_order_by_sequence(&mut self) -> QueryResult<Vec<OrderBy>> {
        self.parse_sequence(|parser| {
            let expr = parser.parse_expression()?;
            let direction = if parser.is_keyword("desc") {
                parser.advance();
                SortDirection::Descending
            } else {
                if parser.is_keyword("asc") {
                    parser.advance();
                }
                SortDirection::Ascending
            };
            Ok(OrderBy::new(expr, direction))
        })
    }

    /// `category, year(date)`
    pub fn parse_group_by_sequence(&mut self) -> QueryResult<Vec<QueryField>> {
        self.parse_sequence(|parser| parser.parse_expression().map(QueryField::new))
    }

    fn parse_sequence<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> QueryResult<T>,
    ) -> QueryResult<Vec<T>> {
        let mut items = Vec::new();
        if self.is_at_end() {
            return Ok(items);
        }

        loop {
            items.push(item(self)?);
            if self.is_syntax(Syntax::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        self.expect_end()?;
        Ok(items)
    }
}

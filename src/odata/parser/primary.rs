//! Primary expressions: literals, parentheses, method calls and member paths.

use crate::error::{QueryError, QueryResult};
use crate::expression::Expression;
use crate::odata::lexer::{Syntax, Token};
use crate::odata::parser::{Parser, OPERATOR_KEYWORDS};

/// Implicit range variable of a filter; elided from member paths.
const IT: &str = "$it";

impl<'a> Parser<'a> {
    pub(super) fn parse_primary_expression(&mut self) -> QueryResult<Expression> {
        let token = match self.current_token() {
            Some(token) => token.clone(),
            None => {
                return Err(QueryError::ParseError(
                    "Unexpected end of input".to_string(),
                ))
            }
        };

        match token {
            Token::Literal(value) => {
                self.advance();
                Ok(Expression::Literal(value.to_json()))
            }
            Token::Syntax(Syntax::ParenOpen) => {
                self.advance();
                let inner = self.parse_expression()?;
                if self.is_at_end() {
                    return Err(QueryError::ParseError(
                        "Unterminated parenthesis".to_string(),
                    ));
                }
                self.expect(Syntax::ParenClose)?;
                Ok(inner)
            }
            Token::Syntax(Syntax::Negative) => Err(QueryError::ParseError(
                "Negative prefix is not supported".to_string(),
            )),
            Token::Syntax(syntax) => Err(QueryError::ParseError(format!(
                "Unexpected '{}'",
                syntax.as_char()
            ))),
            Token::Identifier(name) => {
                if OPERATOR_KEYWORDS.contains(&name.as_str()) {
                    return Err(QueryError::ParseError(format!(
                        "Expected operand, got operator '{}'",
                        name
                    )));
                }
                if matches!(self.peek_token(1), Some(next) if next.is_syntax(Syntax::ParenOpen)) {
                    self.parse_method_call(name)
                } else {
                    self.parse_member_path()
                }
            }
        }
    }

    /// Parse `name(arg, ...)`; the cursor is on the callee.
    fn parse_method_call(&mut self, name: String) -> QueryResult<Expression> {
        self.advance(); // callee
        self.advance(); // '('

        let mut args = Vec::new();
        while !self.is_syntax(Syntax::ParenClose) {
            if self.is_at_end() {
                return Err(QueryError::ParseError(
                    "Unterminated parenthesis".to_string(),
                ));
            }
            args.push(self.parse_expression()?);

            if self.is_syntax(Syntax::Comma) {
                self.advance();
                if self.is_syntax(Syntax::ParenClose) {
                    return Err(QueryError::ParseError(format!(
                        "Expected an argument after ',' in call to '{}'",
                        name
                    )));
                }
            } else {
                break;
            }
        }
        if self.is_at_end() {
            return Err(QueryError::ParseError(
                "Unterminated parenthesis".to_string(),
            ));
        }
        self.expect(Syntax::ParenClose)?;

        tracing::trace!("method call {} with {} arguments", name, args.len());
        self.resolver
            .resolve_method(&name, args)?
            .ok_or_else(|| QueryError::ParseError(format!("Unknown method '{}'", name)))
    }

    /// Parse `seg/seg/...`; the cursor is on the first segment.
    fn parse_member_path(&mut self) -> QueryResult<Expression> {
        let mut segments = Vec::new();

        loop {
            match self.current_token() {
                Some(Token::Identifier(segment)) => {
                    segments.push(segment.clone());
                    self.advance();
                }
                Some(token) => {
                    return Err(QueryError::ParseError(format!(
                        "Expected member name after '/', got '{}'",
                        token
                    )))
                }
                None => {
                    return Err(QueryError::ParseError(
                        "Expected member name after '/', got end of input".to_string(),
                    ))
                }
            }

            if self.is_syntax(Syntax::ParenOpen) {
                return Err(QueryError::ParseError(format!(
                    "Method call on member path '{}' is not supported",
                    segments.join("/")
                )));
            }
            if !self.is_syntax(Syntax::Slash) {
                break;
            }
            self.advance();
        }

        if segments.first().map(String::as_str) == Some(IT) {
            segments.remove(0);
        }
        if segments.is_empty() {
            return Err(QueryError::ParseError("Empty member path".to_string()));
        }

        self.resolver.resolve_member(&segments.join("."))
    }
}

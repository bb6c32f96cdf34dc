//! Parser for OData filter expressions.
//!
//! Converts the token stream of [`super::lexer`] into an [`Expression`] tree.
//! A parser is created per input and owns its cursor; member paths and method
//! calls are handed to a [`MemberResolver`] as they are built.

mod precedence;
mod primary;
mod sequences;

use super::lexer::{Lexer, Syntax, Token};
use crate::error::{QueryError, QueryResult};
use crate::expression::Expression;
use crate::resolver::MemberResolver;

/// Operator keywords; never valid where an operand is expected.
pub(crate) const OPERATOR_KEYWORDS: &[&str] = &[
    "and", "or", "not", "eq", "ne", "lt", "le", "gt", "ge", "add", "sub", "mul", "div", "mod",
];

/// Parser for OData filter strings
pub struct Parser<'a> {
    pub(crate) tokens: Vec<Token>,
    pub(crate) position: usize,
    pub(crate) resolver: &'a dyn MemberResolver,
}

impl<'a> Parser<'a> {
    /// Create a new parser from an input string
    pub fn new(input: &str, resolver: &'a dyn MemberResolver) -> QueryResult<Self> {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.tokenize()?;

        Ok(Self {
            tokens,
            position: 0,
            resolver,
        })
    }

    /// Get the current token
    pub(crate) fn current_token(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    /// Peek at a token at a given offset from the current position
    pub(crate) fn peek_token(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset)
    }

    /// Advance to the next token
    pub(crate) fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    /// True when the current token is the given operator keyword.
    pub(crate) fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.current_token(), Some(Token::Identifier(name)) if name == keyword)
    }

    pub(crate) fn is_syntax(&self, syntax: Syntax) -> bool {
        matches!(self.current_token(), Some(token) if token.is_syntax(syntax))
    }

    /// Expect a syntax token and advance, or return an error
    pub(crate) fn expect(&mut self, expected: Syntax) -> QueryResult<()> {
        match self.current_token() {
            Some(token) if token.is_syntax(expected) => {
                self.advance();
                Ok(())
            }
            Some(token) => Err(QueryError::ParseError(format!(
                "Expected '{}', got '{}'",
                expected.as_char(),
                token
            ))),
            None => Err(QueryError::ParseError(format!(
                "Expected '{}', got end of input",
                expected.as_char()
            ))),
        }
    }

    /// Parse a complete filter; trailing tokens are an error.
    pub fn parse(&mut self) -> QueryResult<Expression> {
        let expression = self.parse_expression()?;
        self.expect_end()?;
        Ok(expression)
    }

    pub(crate) fn expect_end(&self) -> QueryResult<()> {
        match self.current_token() {
            None => Ok(()),
            Some(Token::Identifier(name)) => {
                Err(QueryError::ParseError(format!("Unknown operator '{}'", name)))
            }
            Some(token) => Err(QueryError::ParseError(format!(
                "Unexpected token '{}'",
                token
            ))),
        }
    }

    /// Entry point for expression parsing
    pub(crate) fn parse_expression(&mut self) -> QueryResult<Expression> {
        self.parse_or_expression()
    }
}

//! Operator precedence chain for OData filters.
//!
//! Precedence (lowest to highest):
//! 1. Logical OR: `or`
//! 2. Logical AND: `and`
//! 3. Negation: `not`
//! 4. Comparison: `eq`, `ne`, `lt`, `le`, `gt`, `ge` (non-associative)
//! 5. Additive: `add`, `sub`
//! 6. Multiplicative: `mul`, `div`, `mod`
//! 7. Primary: literals, member paths, method calls, parentheses

use crate::error::{QueryError, QueryResult};
use crate::expression::{ArithmeticOperator, ComparisonOperator, Expression, LogicalOperator};
use crate::odata::lexer::Token;
use crate::odata::parser::Parser;

fn comparison_operator(keyword: &str) -> Option<ComparisonOperator> {
    match keyword {
        "eq" => Some(ComparisonOperator::Eq),
        "ne" => Some(ComparisonOperator::Ne),
        "lt" => Some(ComparisonOperator::Lt),
        "le" => Some(ComparisonOperator::Le),
        "gt" => Some(ComparisonOperator::Gt),
        "ge" => Some(ComparisonOperator::Ge),
        _ => None,
    }
}

impl<'a> Parser<'a> {
    /// Parse logical OR; a run of `or` produces one flattened node
    pub(super) fn parse_or_expression(&mut self) -> QueryResult<Expression> {
        let mut left = self.parse_and_expression()?;

        while self.is_keyword("or") {
            self.advance();
            let right = self.parse_and_expression()?;
            left = Expression::logical(LogicalOperator::Or, left, right);
        }

        Ok(left)
    }

    /// Parse logical AND
    fn parse_and_expression(&mut self) -> QueryResult<Expression> {
        let mut left = self.parse_not_expression()?;

        while self.is_keyword("and") {
            self.advance();
            let right = self.parse_not_expression()?;
            left = Expression::logical(LogicalOperator::And, left, right);
        }

        Ok(left)
    }

    /// Parse `not <operand>`
    fn parse_not_expression(&mut self) -> QueryResult<Expression> {
        if self.is_keyword("not") {
            self.advance();
            let operand = self.parse_not_expression()?;
            return Ok(!operand);
        }
        self.parse_comparison_expression()
    }

    /// Parse a single comparison. `literal op member` is mirrored so the
    /// queryable side ends up on the left.
    fn parse_comparison_expression(&mut self) -> QueryResult<Expression> {
        let left = self.parse_additive_expression()?;

        let Some(operator) = self.current_comparison_operator() else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_additive_expression()?;

        if self.current_comparison_operator().is_some() {
            return Err(QueryError::ParseError(
                "Comparison operators cannot be chained".to_string(),
            ));
        }

        if left.is_literal() && !right.is_literal() {
            if let Some(mirrored) = operator.mirror() {
                return Ok(Expression::comparison(right, mirrored, left));
            }
        }
        Ok(Expression::comparison(left, operator, right))
    }

    fn current_comparison_operator(&self) -> Option<ComparisonOperator> {
        match self.current_token() {
            Some(Token::Identifier(name)) => comparison_operator(name),
            _ => None,
        }
    }

    /// Parse additive expression (add, sub)
    fn parse_additive_expression(&mut self) -> QueryResult<Expression> {
        let mut left = self.parse_multiplicative_expression()?;

        loop {
            let operator = if self.is_keyword("add") {
                ArithmeticOperator::Add
            } else if self.is_keyword("sub") {
                ArithmeticOperator::Sub
            } else {
                break;
            };
            self.advance();
            let right = self.parse_multiplicative_expression()?;
            left = Expression::arithmetic(left, operator, right);
        }

        Ok(left)
    }

    /// Parse multiplicative expression (mul, div, mod)
    fn parse_multiplicative_expression(&mut self) -> QueryResult<Expression> {
        let mut left = self.parse_primary_expression()?;

        loop {
            let operator = if self.is_keyword("mul") {
                ArithmeticOperator::Mul
            } else if self.is_keyword("div") {
                ArithmeticOperator::Div
            } else if self.is_keyword("mod") {
                ArithmeticOperator::Mod
            } else {
                break;
            };
            self.advance();
            let right = self.parse_primary_expression()?;
            left = Expression::arithmetic(left, operator, right);
        }

        Ok(left)
    }
}

//! Source-text front end for closures.
//!
//! Accepts the expression subset of a JavaScript closure:
//! `function [name](p) { return <expr>; }`, `p => <expr>`, `(p) => <expr>`
//! and `p => { return <expr>; }`. The body is parsed into a [`HostNode`] tree
//! which [`super::ClosureParser`] then translates. Nothing is evaluated here.

use serde_json::Value;

use crate::error::{QueryError, QueryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    StrictEqual,
    Equal,
    StrictNotEqual,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    LeftShift,
    RightShift,
    UnsignedRightShift,
    In,
    InstanceOf,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::StrictEqual => "===",
            BinaryOperator::Equal => "==",
            BinaryOperator::StrictNotEqual => "!==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulus => "%",
            BinaryOperator::BitwiseAnd => "&",
            BinaryOperator::BitwiseOr => "|",
            BinaryOperator::BitwiseXor => "^",
            BinaryOperator::LeftShift => "<<",
            BinaryOperator::RightShift => ">>",
            BinaryOperator::UnsignedRightShift => ">>>",
            BinaryOperator::In => "in",
            BinaryOperator::InstanceOf => "instanceof",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
    BitwiseNot,
    TypeOf,
}

impl UnaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "!",
            UnaryOperator::Minus => "-",
            UnaryOperator::Plus => "+",
            UnaryOperator::BitwiseNot => "~",
            UnaryOperator::TypeOf => "typeof",
        }
    }
}

/// Expression node of a closure body.
#[derive(Debug, Clone, PartialEq)]
pub enum HostNode {
    Identifier(String),
    Literal(Value),
    /// `object.property`; `object['property']` and `object[0]` normalize to this
    Member {
        object: Box<HostNode>,
        property: String,
    },
    Call {
        callee: Box<HostNode>,
        args: Vec<HostNode>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<HostNode>,
        right: Box<HostNode>,
    },
    Logical {
        op: LogicalOperator,
        left: Box<HostNode>,
        right: Box<HostNode>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<HostNode>,
    },
    Array(Vec<HostNode>),
}

/// A parsed closure: its row parameter and the returned expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub parameter: String,
    pub body: HostNode,
}

/// Parse closure source text.
pub fn parse_closure(source: &str) -> QueryResult<Closure> {
    let tokens = Lexer::new(source).tokenize()?;
    SyntaxParser::new(tokens).parse_closure()
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    Number(f64),
    Str(String),
    Punct(&'static str),
    Eof,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Identifier(name) => write!(f, "{}", name),
            Token::Number(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "'{}'", s),
            Token::Punct(p) => write!(f, "{}", p),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// Punctuators, longest first.
const PUNCTUATORS: &[&str] = &[
    ">>>", "===", "!==", "=>", "==", "!=", "<=", ">=", "&&", "||", "<<", ">>", "(", ")", "{",
    "}", "[", "]", ",", ";", ".", "<", ">", "+", "-", "*", "/", "%", "!", "&", "|", "^", "~",
    "?", ":", "=",
];

struct Lexer {
    input: Vec<char>,
    offsets: Vec<usize>,
    len: usize,
    position: usize,
}

impl Lexer {
    fn new(source: &str) -> Self {
        let (offsets, input): (Vec<usize>, Vec<char>) = source.char_indices().unzip();
        Self {
            input,
            offsets,
            len: source.len(),
            position: 0,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn offset(&self) -> usize {
        self.offsets.get(self.position).copied().unwrap_or(self.len)
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace_and_comments(&mut self) -> QueryResult<()> {
        loop {
            match (self.current_char(), self.peek_char(1)) {
                (Some(c), _) if c.is_whitespace() => self.advance(),
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.current_char() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.offset();
                    self.advance();
                    self.advance();
                    loop {
                        match (self.current_char(), self.peek_char(1)) {
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (Some(_), _) => self.advance(),
                            (None, _) => {
                                return Err(QueryError::lex("Unterminated comment", start))
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn tokenize(&mut self) -> QueryResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            let Some(ch) = self.current_char() else {
                tokens.push(Token::Eof);
                return Ok(tokens);
            };

            let token = if ch.is_ascii_digit()
                || (ch == '.' && self.peek_char(1).is_some_and(|c| c.is_ascii_digit()))
            {
                self.read_number()?
            } else if ch == '\'' || ch == '"' {
                self.read_string(ch)?
            } else if ch.is_alphabetic() || ch == '_' || ch == '$' {
                self.read_identifier()
            } else {
                self.read_punctuator()?
            };
            tokens.push(token);
        }
    }

    fn read_number(&mut self) -> QueryResult<Token> {
        let start = self.offset();
        let mut text = String::new();

        if self.current_char() == Some('0') && matches!(self.peek_char(1), Some('x' | 'X')) {
            self.advance();
            self.advance();
            while let Some(c) = self.current_char().filter(|c| c.is_ascii_hexdigit()) {
                text.push(c);
                self.advance();
            }
            return i64::from_str_radix(&text, 16)
                .map(|n| Token::Number(n as f64))
                .map_err(|_| QueryError::lex("Invalid hexadecimal literal", start));
        }

        while let Some(c) = self.current_char() {
            let exponent_sign = matches!(c, '+' | '-') && text.ends_with(['e', 'E']);
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || exponent_sign {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if self
            .current_char()
            .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        {
            return Err(QueryError::lex(
                "Identifier directly after numeric literal",
                self.offset(),
            ));
        }

        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| QueryError::lex(format!("Invalid numeric literal '{}'", text), start))
    }

    fn read_string(&mut self, quote: char) -> QueryResult<Token> {
        let start = self.offset();
        self.advance(); // opening quote

        let mut value = String::new();
        loop {
            match self.current_char() {
                None | Some('\n') => {
                    return Err(QueryError::lex("Unterminated string literal", start))
                }
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(Token::Str(value));
                }
                Some('\\') => {
                    self.advance();
                    let escaped = self
                        .current_char()
                        .ok_or_else(|| QueryError::lex("Unterminated string literal", start))?;
                    self.advance();
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        'b' => value.push('\u{8}'),
                        'f' => value.push('\u{c}'),
                        'v' => value.push('\u{b}'),
                        '0' => value.push('\0'),
                        'u' => value.push(self.read_unicode_escape()?),
                        other => value.push(other),
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
    }

    fn read_unicode_escape(&mut self) -> QueryResult<char> {
        let start = self.offset();
        let mut hex = String::new();
        for _ in 0..4 {
            match self.current_char() {
                Some(c) if c.is_ascii_hexdigit() => {
                    hex.push(c);
                    self.advance();
                }
                _ => return Err(QueryError::lex("Invalid unicode escape", start)),
            }
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| QueryError::lex("Invalid unicode escape", start))
    }

    fn read_identifier(&mut self) -> Token {
        let mut name = String::new();
        while let Some(c) = self.current_char() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        Token::Identifier(name)
    }

    fn read_punctuator(&mut self) -> QueryResult<Token> {
        for punct in PUNCTUATORS {
            let matches = punct
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek_char(i) == Some(c));
            if matches {
                for _ in 0..punct.chars().count() {
                    self.advance();
                }
                return Ok(Token::Punct(punct));
            }
        }
        Err(QueryError::lex(
            format!(
                "Unexpected character '{}'",
                self.current_char().unwrap_or_default()
            ),
            self.offset(),
        ))
    }
}

// ============================================================================
// Parser
// ============================================================================

struct SyntaxParser {
    tokens: Vec<Token>,
    position: usize,
}

fn return_required() -> QueryError {
    QueryError::ParseError("A closure must return a value".to_string())
}

impl SyntaxParser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn current_token(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(self.current_token(), Token::Punct(p) if *p == punct)
    }

    fn is_word(&self, word: &str) -> bool {
        matches!(self.current_token(), Token::Identifier(name) if name == word)
    }

    fn expect_punct(&mut self, punct: &str) -> QueryResult<()> {
        if self.is_punct(punct) {
            self.advance();
            Ok(())
        } else {
            Err(QueryError::ParseError(format!(
                "Expected '{}', got '{}'",
                punct,
                self.current_token()
            )))
        }
    }

    fn expect_identifier(&mut self) -> QueryResult<String> {
        match self.current_token() {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(QueryError::ParseError(format!(
                "Expected identifier, got '{}'",
                other
            ))),
        }
    }

    fn parse_closure(mut self) -> QueryResult<Closure> {
        let (parameter, body) = if self.is_word("function") {
            self.advance();
            if matches!(self.current_token(), Token::Identifier(_)) {
                self.advance(); // function name
            }
            let parameter = self.parse_parameter_list()?;
            let body = self.parse_block_body()?;
            (parameter, body)
        } else if self.is_punct("(") {
            let parameter = self.parse_parameter_list()?;
            self.expect_punct("=>")?;
            (parameter, self.parse_arrow_body()?)
        } else {
            let parameter = self.expect_identifier()?;
            self.expect_punct("=>")?;
            (parameter, self.parse_arrow_body()?)
        };

        while self.is_punct(";") {
            self.advance();
        }
        if *self.current_token() != Token::Eof {
            return Err(QueryError::ParseError(format!(
                "Unexpected '{}' after closure",
                self.current_token()
            )));
        }

        Ok(Closure { parameter, body })
    }

    /// `(p)`; exactly one parameter.
    fn parse_parameter_list(&mut self) -> QueryResult<String> {
        self.expect_punct("(")?;
        if self.is_punct(")") {
            return Err(QueryError::ParseError(
                "A closure must declare one parameter".to_string(),
            ));
        }
        let parameter = self.expect_identifier()?;
        if self.is_punct(",") {
            return Err(QueryError::ParseError(
                "A closure must declare exactly one parameter".to_string(),
            ));
        }
        self.expect_punct(")")?;
        Ok(parameter)
    }

    fn parse_arrow_body(&mut self) -> QueryResult<HostNode> {
        if self.is_punct("{") {
            self.parse_block_body()
        } else {
            self.parse_expression()
        }
    }

    /// `{ return <expr>[;] }`
    fn parse_block_body(&mut self) -> QueryResult<HostNode> {
        self.expect_punct("{")?;
        if !self.is_word("return") {
            return Err(return_required());
        }
        self.advance();
        if self.is_punct(";") || self.is_punct("}") {
            return Err(return_required());
        }
        let body = self.parse_expression()?;
        while self.is_punct(";") {
            self.advance();
        }
        if !self.is_punct("}") {
            return Err(return_required());
        }
        self.advance();
        Ok(body)
    }

    fn parse_expression(&mut self) -> QueryResult<HostNode> {
        let expr = self.parse_logical_or()?;
        if self.is_punct("?") {
            return Err(QueryError::ParseError(
                "Conditional expressions are not supported".to_string(),
            ));
        }
        if self.is_punct("=") {
            return Err(QueryError::ParseError(
                "Assignments are not supported".to_string(),
            ));
        }
        Ok(expr)
    }

    fn parse_logical_or(&mut self) -> QueryResult<HostNode> {
        let mut left = self.parse_logical_and()?;
        while self.is_punct("||") {
            self.advance();
            let right = self.parse_logical_and()?;
            left = HostNode::Logical {
                op: LogicalOperator::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> QueryResult<HostNode> {
        let mut left = self.parse_binary(0)?;
        while self.is_punct("&&") {
            self.advance();
            let right = self.parse_binary(0)?;
            left = HostNode::Logical {
                op: LogicalOperator::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// Binary operator levels, lowest first.
    fn binary_levels() -> &'static [&'static [(&'static str, BinaryOperator)]] {
        &[
            &[("|", BinaryOperator::BitwiseOr)],
            &[("^", BinaryOperator::BitwiseXor)],
            &[("&", BinaryOperator::BitwiseAnd)],
            &[
                ("===", BinaryOperator::StrictEqual),
                ("!==", BinaryOperator::StrictNotEqual),
                ("==", BinaryOperator::Equal),
                ("!=", BinaryOperator::NotEqual),
            ],
            &[
                ("<=", BinaryOperator::LessThanOrEqual),
                (">=", BinaryOperator::GreaterThanOrEqual),
                ("<", BinaryOperator::LessThan),
                (">", BinaryOperator::GreaterThan),
                ("in", BinaryOperator::In),
                ("instanceof", BinaryOperator::InstanceOf),
            ],
            &[
                ("<<", BinaryOperator::LeftShift),
                (">>>", BinaryOperator::UnsignedRightShift),
                (">>", BinaryOperator::RightShift),
            ],
            &[("+", BinaryOperator::Add), ("-", BinaryOperator::Subtract)],
            &[
                ("*", BinaryOperator::Multiply),
                ("/", BinaryOperator::Divide),
                ("%", BinaryOperator::Modulus),
            ],
        ]
    }

    fn current_binary(&self, level: usize) -> Option<BinaryOperator> {
        Self::binary_levels()[level]
            .iter()
            .find(|(symbol, _)| self.is_punct(symbol) || self.is_word(symbol))
            .map(|(_, op)| *op)
    }

    fn parse_binary(&mut self, level: usize) -> QueryResult<HostNode> {
        if level == Self::binary_levels().len() {
            return self.parse_unary();
        }

        let mut left = self.parse_binary(level + 1)?;
        while let Some(op) = self.current_binary(level) {
            self.advance();
            let right = self.parse_binary(level + 1)?;
            left = HostNode::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> QueryResult<HostNode> {
        let op = if self.is_punct("!") {
            UnaryOperator::Not
        } else if self.is_punct("-") {
            UnaryOperator::Minus
        } else if self.is_punct("+") {
            UnaryOperator::Plus
        } else if self.is_punct("~") {
            UnaryOperator::BitwiseNot
        } else if self.is_word("typeof") {
            UnaryOperator::TypeOf
        } else {
            return self.parse_postfix();
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(HostNode::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> QueryResult<HostNode> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.is_punct(".") {
                self.advance();
                let property = self.expect_identifier()?;
                expr = HostNode::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.is_punct("[") {
                self.advance();
                let property = match self.current_token() {
                    Token::Str(s) => s.clone(),
                    Token::Number(n) if n.fract() == 0.0 && *n >= 0.0 => format!("{}", *n as u64),
                    other => {
                        return Err(QueryError::ParseError(format!(
                            "Computed member access requires a literal key, got '{}'",
                            other
                        )))
                    }
                };
                self.advance();
                self.expect_punct("]")?;
                expr = HostNode::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.is_punct("(") {
                self.advance();
                let args = self.parse_list(")")?;
                expr = HostNode::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma-separated expressions up to `close`; the opener is consumed.
    fn parse_list(&mut self, close: &str) -> QueryResult<Vec<HostNode>> {
        let mut items = Vec::new();
        while !self.is_punct(close) {
            if *self.current_token() == Token::Eof {
                return Err(QueryError::ParseError(format!(
                    "Expected '{}', got end of input",
                    close
                )));
            }
            items.push(self.parse_expression()?);
            if self.is_punct(",") {
                self.advance();
            } else {
                break;
            }
        }
        self.expect_punct(close)?;
        Ok(items)
    }

    fn parse_primary(&mut self) -> QueryResult<HostNode> {
        let token = self.current_token().clone();
        match token {
            Token::Number(n) => {
                self.advance();
                Ok(HostNode::Literal(number_value(n)))
            }
            Token::Str(s) => {
                self.advance();
                Ok(HostNode::Literal(Value::String(s)))
            }
            Token::Identifier(name) => {
                self.advance();
                Ok(match name.as_str() {
                    "true" => HostNode::Literal(Value::Bool(true)),
                    "false" => HostNode::Literal(Value::Bool(false)),
                    "null" | "undefined" => HostNode::Literal(Value::Null),
                    "function" | "return" | "new" | "this" => {
                        return Err(QueryError::ParseError(format!(
                            "Unsupported keyword '{}' in closure body",
                            name
                        )))
                    }
                    _ => HostNode::Identifier(name),
                })
            }
            Token::Punct("(") => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            Token::Punct("[") => {
                self.advance();
                Ok(HostNode::Array(self.parse_list("]")?))
            }
            Token::Punct(p) => Err(QueryError::ParseError(format!("Unexpected '{}'", p))),
            Token::Eof => Err(QueryError::ParseError(
                "Unexpected end of input".to_string(),
            )),
        }
    }
}

/// Integral numbers become JSON integers.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

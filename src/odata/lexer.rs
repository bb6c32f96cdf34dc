//! Lexer for OData filter strings.
//!
//! Produces a flat sequence of literal, identifier and syntax tokens. Operator
//! keywords (`and`, `eq`, `add`, ...) are plain identifiers here; the parser
//! decides what they mean from their position.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{QueryError, QueryResult};

static GUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("valid guid regex")
});

static DATETIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})(?:[T ](\d{2}):(\d{2})(?::(\d{2})(?:\.(\d{1,9}))?)?)?(Z|[+-]\d{2}:\d{2})?$",
    )
    .expect("valid datetime regex")
});

static DURATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^-?P(?:\d+Y)?(?:\d+M)?(?:\d+D)?(?:T(?:\d+H)?(?:\d+M)?(?:\d+(?:\.\d+)?S)?)?$",
    )
    .expect("valid duration regex")
});

static BINARY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[0-9a-fA-F]{2})*$").expect("valid binary regex"));

/// Type of a literal token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralType {
    Null,
    String,
    Boolean,
    Single,
    Double,
    Decimal,
    Int,
    Long,
    Binary,
    DateTime,
    Guid,
    Duration,
}

/// Value of a literal token.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Null,
    String(String),
    Boolean(bool),
    Single(f32),
    Double(f64),
    /// Exact decimal text, without the `M` suffix
    Decimal(String),
    Int(i32),
    Long(i64),
    Binary(Vec<u8>),
    /// Date-time normalized to UTC
    DateTime(NaiveDateTime),
    Guid(Uuid),
    /// ISO-8601 duration text (`P1DT2H`)
    Duration(String),
}

impl LiteralValue {
    pub fn literal_type(&self) -> LiteralType {
        match self {
            LiteralValue::Null => LiteralType::Null,
            LiteralValue::String(_) => LiteralType::String,
            LiteralValue::Boolean(_) => LiteralType::Boolean,
            LiteralValue::Single(_) => LiteralType::Single,
            LiteralValue::Double(_) => LiteralType::Double,
            LiteralValue::Decimal(_) => LiteralType::Decimal,
            LiteralValue::Int(_) => LiteralType::Int,
            LiteralValue::Long(_) => LiteralType::Long,
            LiteralValue::Binary(_) => LiteralType::Binary,
            LiteralValue::DateTime(_) => LiteralType::DateTime,
            LiteralValue::Guid(_) => LiteralType::Guid,
            LiteralValue::Duration(_) => LiteralType::Duration,
        }
    }

    /// Convert to the constant carried by an expression literal.
    pub fn to_json(&self) -> Value {
        match self {
            LiteralValue::Null => Value::Null,
            LiteralValue::String(s) => Value::String(s.clone()),
            LiteralValue::Boolean(b) => Value::Bool(*b),
            LiteralValue::Single(f) => float_value(f64::from(*f)),
            LiteralValue::Double(f) => float_value(*f),
            LiteralValue::Decimal(text) => text
                .parse::<f64>()
                .map(float_value)
                .unwrap_or_else(|_| Value::String(text.clone())),
            LiteralValue::Int(n) => Value::from(*n),
            LiteralValue::Long(n) => Value::from(*n),
            LiteralValue::Binary(bytes) => Value::String(hex::encode_upper(bytes)),
            LiteralValue::DateTime(dt) => {
                Value::String(dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            }
            LiteralValue::Guid(guid) => Value::String(guid.hyphenated().to_string()),
            LiteralValue::Duration(text) => Value::String(text.clone()),
        }
    }
}

fn float_value(f: f64) -> Value {
    if f.is_nan() {
        return Value::String("NaN".to_string());
    }
    if f.is_infinite() {
        return Value::String(if f > 0.0 { "INF" } else { "-INF" }.to_string());
    }
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Single-character syntax tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syntax {
    ParenOpen,
    ParenClose,
    Slash,
    Comma,
    Negative,
}

impl Syntax {
    pub fn as_char(&self) -> char {
        match self {
            Syntax::ParenOpen => '(',
            Syntax::ParenClose => ')',
            Syntax::Slash => '/',
            Syntax::Comma => ',',
            Syntax::Negative => '-',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Literal(LiteralValue),
    Identifier(String),
    Syntax(Syntax),
}

impl Token {
    pub fn is_syntax(&self, syntax: Syntax) -> bool {
        matches!(self, Token::Syntax(s) if *s == syntax)
    }

    /// Identifier name, if this token is one.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Token::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Literal(value) => write!(f, "{}", value.to_json()),
            Token::Identifier(name) => write!(f, "{}", name),
            Token::Syntax(syntax) => write!(f, "{}", syntax.as_char()),
        }
    }
}

/// Tokenize an OData filter string.
pub fn tokenize(source: &str) -> QueryResult<Vec<Token>> {
    Lexer::new(source).tokenize()
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            position: 0,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.chars.get(self.position).map(|(_, c)| *c)
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).map(|(_, c)| *c)
    }

    /// Byte offset of the current character.
    fn offset(&self) -> usize {
        self.chars
            .get(self.position)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.source.len())
    }

    fn advance(&mut self) {
        if self.position < self.chars.len() {
            self.position += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn is_identifier_start(ch: char) -> bool {
        ch.is_alphabetic() || ch == '_' || ch == '$'
    }

    fn is_identifier_char(ch: char) -> bool {
        ch.is_alphanumeric() || ch == '_' || ch == '$'
    }

    pub fn next_token(&mut self) -> QueryResult<Option<Token>> {
        self.skip_whitespace();

        let Some(ch) = self.current_char() else {
            return Ok(None);
        };

        let token = match ch {
            '\'' => Token::Literal(LiteralValue::String(self.read_quoted()?)),
            '(' => self.syntax(Syntax::ParenOpen),
            ')' => self.syntax(Syntax::ParenClose),
            '/' => self.syntax(Syntax::Slash),
            ',' => self.syntax(Syntax::Comma),
            '-' => match self.peek_char(1) {
                Some(next) if next.is_ascii_digit() => self.read_number()?,
                Some(next) if Self::is_identifier_start(next) => self.read_signed_identifier(),
                _ => self.syntax(Syntax::Negative),
            },
            c if c.is_ascii_digit() => self.read_number()?,
            c if Self::is_identifier_start(c) => self.read_identifier()?,
            other => {
                return Err(QueryError::lex(
                    format!("Unexpected character '{}'", other),
                    self.offset(),
                ))
            }
        };

        tracing::trace!("token {:?}", token);
        Ok(Some(token))
    }

    pub fn tokenize(&mut self) -> QueryResult<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn syntax(&mut self, syntax: Syntax) -> Token {
        self.advance();
        Token::Syntax(syntax)
    }

    /// Read a single-quoted string; `''` stands for one embedded quote.
    fn read_quoted(&mut self) -> QueryResult<String> {
        let start = self.offset();
        self.advance(); // opening quote

        let mut value = String::new();
        while let Some(ch) = self.current_char() {
            if ch == '\'' {
                if self.peek_char(1) == Some('\'') {
                    value.push('\'');
                    self.advance();
                    self.advance();
                } else {
                    self.advance(); // closing quote
                    return Ok(value);
                }
            } else {
                value.push(ch);
                self.advance();
            }
        }

        Err(QueryError::lex("Unterminated string literal", start))
    }

    fn read_digits(&mut self, text: &mut String) -> usize {
        let mut count = 0;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
                count += 1;
            } else {
                break;
            }
        }
        count
    }

    fn read_number(&mut self) -> QueryResult<Token> {
        let start = self.offset();
        let mut text = String::new();

        if self.current_char() == Some('-') {
            text.push('-');
            self.advance();
        }

        self.read_digits(&mut text);

        let mut has_fraction = false;
        if self.current_char() == Some('.') {
            has_fraction = true;
            text.push('.');
            self.advance();
            self.read_digits(&mut text);
            if self.current_char() == Some('.') {
                return Err(QueryError::lex(
                    "Invalid numeric literal: decimal point appears twice",
                    self.offset(),
                ));
            }
        }

        let mut has_exponent = false;
        if matches!(self.current_char(), Some('e') | Some('E')) {
            has_exponent = true;
            text.push('e');
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.current_char() {
                text.push(sign);
                self.advance();
            }
            if self.read_digits(&mut text) == 0 {
                return Err(QueryError::lex(
                    "Invalid numeric literal: exponent without digits",
                    self.offset(),
                ));
            }
        }

        let suffix = match self.current_char() {
            Some(c @ ('F' | 'f' | 'D' | 'd' | 'M' | 'm' | 'L' | 'l')) => {
                self.advance();
                Some(c.to_ascii_uppercase())
            }
            _ => None,
        };

        if let Some(ch) = self.current_char() {
            if Self::is_identifier_char(ch) || ch == '.' {
                return Err(QueryError::lex(
                    format!("Invalid numeric literal: unexpected character '{}'", ch),
                    self.offset(),
                ));
            }
        }

        let invalid = |kind: &str| QueryError::lex(format!("Invalid {} literal '{}'", kind, text), start);

        let value = match suffix {
            Some('F') => LiteralValue::Single(text.parse::<f32>().map_err(|_| invalid("single"))?),
            Some('D') => LiteralValue::Double(text.parse::<f64>().map_err(|_| invalid("double"))?),
            Some('M') => {
                text.parse::<f64>().map_err(|_| invalid("decimal"))?;
                LiteralValue::Decimal(text.clone())
            }
            Some(_) => {
                if has_fraction || has_exponent {
                    return Err(invalid("long"));
                }
                LiteralValue::Long(text.parse::<i64>().map_err(|_| invalid("long"))?)
            }
            None if has_fraction || has_exponent => {
                LiteralValue::Double(text.parse::<f64>().map_err(|_| invalid("double"))?)
            }
            None => match text.parse::<i32>() {
                Ok(n) => LiteralValue::Int(n),
                Err(_) => LiteralValue::Long(
                    text.parse::<i64>()
                        .map_err(|_| QueryError::lex(format!("Numeric literal '{}' is out of range", text), start))?,
                ),
            },
        };

        Ok(Token::Literal(value))
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(ch) = self.current_char() {
            if Self::is_identifier_char(ch) {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        word
    }

    /// `-` followed by a letter: only `-INF` is a literal; anything else is a
    /// negative prefix and the identifier is left for the next token.
    fn read_signed_identifier(&mut self) -> Token {
        let saved = self.position;
        self.advance(); // '-'
        let word = self.read_word();
        if word == "INF" {
            return Token::Literal(LiteralValue::Double(f64::NEG_INFINITY));
        }
        self.position = saved;
        self.syntax(Syntax::Negative)
    }

    fn read_identifier(&mut self) -> QueryResult<Token> {
        let start = self.offset();
        let word = self.read_word();

        if self.current_char() == Some('\'') {
            let prefix = word.to_lowercase();
            if matches!(prefix.as_str(), "guid" | "datetime" | "time" | "binary" | "x") {
                let text = self.read_quoted()?;
                return self.typed_literal(&prefix, &text, start).map(Token::Literal);
            }
        }

        let token = match word.as_str() {
            "true" => Token::Literal(LiteralValue::Boolean(true)),
            "false" => Token::Literal(LiteralValue::Boolean(false)),
            "null" => Token::Literal(LiteralValue::Null),
            "INF" => Token::Literal(LiteralValue::Double(f64::INFINITY)),
            "NaN" | "Nan" => Token::Literal(LiteralValue::Double(f64::NAN)),
            _ => Token::Identifier(word),
        };
        Ok(token)
    }

    fn typed_literal(&self, prefix: &str, text: &str, start: usize) -> QueryResult<LiteralValue> {
        match prefix {
            "guid" => {
                if !GUID_REGEX.is_match(text) {
                    return Err(QueryError::lex(format!("Invalid guid literal '{}'", text), start));
                }
                Uuid::parse_str(text)
                    .map(LiteralValue::Guid)
                    .map_err(|_| QueryError::lex(format!("Invalid guid literal '{}'", text), start))
            }
            "datetime" => parse_datetime(text)
                .map(LiteralValue::DateTime)
                .ok_or_else(|| QueryError::lex(format!("Invalid datetime literal '{}'", text), start)),
            "time" => {
                if DURATION_REGEX.is_match(text) && text.trim_start_matches('-') != "P" && !text.ends_with('T') {
                    Ok(LiteralValue::Duration(text.to_string()))
                } else {
                    Err(QueryError::lex(format!("Invalid duration literal '{}'", text), start))
                }
            }
            _ => {
                if !BINARY_REGEX.is_match(text) {
                    return Err(QueryError::lex(format!("Invalid binary literal '{}'", text), start));
                }
                hex::decode(text)
                    .map(LiteralValue::Binary)
                    .map_err(|_| QueryError::lex(format!("Invalid binary literal '{}'", text), start))
            }
        }
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let captures = DATETIME_REGEX.captures(text)?;
    let number = |index: usize| -> Option<u32> {
        captures
            .get(index)
            .map(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(Some(0))
    };

    let year = captures.get(1)?.as_str().parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, number(2)?, number(3)?)?;
    let nanos = match captures.get(7) {
        Some(m) => {
            let digits = m.as_str();
            digits.parse::<u32>().ok()? * 10u32.pow(9 - digits.len() as u32)
        }
        None => 0,
    };
    let local = date.and_hms_nano_opt(number(4)?, number(5)?, number(6)?, nanos)?;

    match captures.get(8).map(|m| m.as_str()) {
        None | Some("Z") => Some(local),
        Some(_) => {
            let with_offset = DateTime::parse_from_rfc3339(&format!(
                "{}{}",
                local.format("%Y-%m-%dT%H:%M:%S%.f"),
                captures.get(8)?.as_str()
            ))
            .ok()?;
            Some(with_offset.with_timezone(&Utc).naive_utc())
        }
    }
}

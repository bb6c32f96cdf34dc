//! Error types for the query-expression pipeline.
//!
//! Every stage fails fast: lexing, parsing and formatting return the first
//! error they detect and keep no partial state behind.

use thiserror::Error;

/// Query compiler error type
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Lex error at offset {offset}: {message}")]
    LexError { message: String, offset: usize },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Format error: {0}")]
    FormatError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type for query compiler operations
pub type QueryResult<T> = Result<T, QueryError>;

impl QueryError {
    pub(crate) fn lex(message: impl Into<String>, offset: usize) -> Self {
        QueryError::LexError {
            message: message.into(),
            offset,
        }
    }

    /// Byte offset of a lexer error, if this is one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            QueryError::LexError { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

impl serde::Serialize for QueryError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = QueryError::lex("Unexpected character '#'", 4);
        assert_eq!(
            err.to_string(),
            "Lex error at offset 4: Unexpected character '#'"
        );

        let err = QueryError::ParseError("Expected operator".to_string());
        assert_eq!(err.to_string(), "Parse error: Expected operator");

        let err = QueryError::FormatError("Unknown function 'foo'".to_string());
        assert_eq!(err.to_string(), "Format error: Unknown function 'foo'");

        let err = QueryError::ConfigError("bad dialect".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad dialect");
    }

    #[test]
    fn test_offset() {
        assert_eq!(QueryError::lex("x", 7).offset(), Some(7));
        assert_eq!(QueryError::ParseError("x".to_string()).offset(), None);
    }

    #[test]
    fn test_serialize_as_string() {
        let err = QueryError::ParseError("unexpected token".to_string());
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value, serde_json::json!("Parse error: unexpected token"));
    }

    #[test]
    fn test_result_type() {
        let ok_result: QueryResult<i32> = Ok(42);
        assert_eq!(ok_result.unwrap(), 42);

        let err_result: QueryResult<i32> = Err(QueryError::FormatError("test".to_string()));
        assert!(err_result.is_err());
    }
}

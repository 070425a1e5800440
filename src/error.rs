//! Error types for rowset.

use thiserror::Error;

/// The main error type for rowset operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// An engine call reported a failure status.
    #[error("{operation}: {message}")]
    Engine {
        operation: String,
        code: i32,
        message: String,
    },

    /// A typed getter was called on a NULL value.
    #[error("Null value")]
    NullValue,

    /// The requested target type cannot be produced from the column.
    #[error("Type error: {0}")]
    Type(String),

    /// A narrowing numeric conversion left the target range.
    #[error("Overflow: {0}")]
    Overflow(String),

    /// No column with the given name exists in the result.
    #[error("Unknown column: '{0}'")]
    UnknownColumn(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Create an engine error for the named operation.
    pub fn engine(operation: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self::Engine {
            operation: operation.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    /// Create an overflow error.
    pub fn overflow(message: impl Into<String>) -> Self {
        Self::Overflow(message.into())
    }

    pub fn is_null_value(&self) -> bool {
        matches!(self, Self::NullValue)
    }

    pub fn is_type_error(&self) -> bool {
        matches!(self, Self::Type(_))
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow(_))
    }
}

/// Result type alias for rowset operations.
pub type FetchResult<T> = Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FetchError::engine("define", 1007, "ORA-01007: variable not in select list");
        assert_eq!(
            err.to_string(),
            "define: ORA-01007: variable not in select list"
        );
        assert_eq!(FetchError::NullValue.to_string(), "Null value");
    }

    #[test]
    fn test_error_kinds() {
        assert!(FetchError::NullValue.is_null_value());
        assert!(FetchError::type_error("x").is_type_error());
        assert!(FetchError::overflow("x").is_overflow());
        assert!(!FetchError::overflow("x").is_type_error());
    }
}

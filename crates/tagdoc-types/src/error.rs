use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("\"{0}\" is an invalid tag name since it contains one or more ':' characters")]
    InvalidTagName(String),

    #[error("\"{0}\" is an invalid tag name since it contains one or more '.' characters")]
    DottedTagName(String),

    #[error("\"{0}\" is an invalid tag value since it contains one or more ':' characters")]
    InvalidTagValue(String),

    #[error("corrupt record {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for type operations.
pub type TypeResult<T> = Result<T, TypeError>;

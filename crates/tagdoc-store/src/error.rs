use tagdoc_backend::BackendError;
use tagdoc_types::TypeError;

/// Errors from store and provider operations.
///
/// Validation errors are returned before any backend call. Not-found errors
/// ([`StoreError::DataNotFound`], [`StoreError::StoreNotFound`]) are kept
/// apart from every failure so callers can tell "absent" from "broken"; see
/// [`StoreError::is_not_found`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A store name was empty.
    #[error("store name cannot be empty")]
    EmptyStoreName,

    /// A key was empty.
    #[error("key cannot be empty")]
    EmptyKey,

    /// A bulk get was called without keys.
    #[error("keys must contain at least one key")]
    EmptyKeys,

    /// A batch was called without operations.
    #[error("batch requires at least one operation")]
    EmptyBatch,

    /// A tag name contains the reserved `:` separator.
    #[error("\"{0}\" is an invalid tag name since it contains one or more ':' characters")]
    InvalidTagName(String),

    /// A tag name contains `.`, which the database reads as a path separator.
    #[error("\"{0}\" is an invalid tag name since it contains one or more '.' characters")]
    DottedTagName(String),

    /// A tag value contains the reserved `:` separator.
    #[error("\"{0}\" is an invalid tag value since it contains one or more ':' characters")]
    InvalidTagValue(String),

    /// A query expression does not follow the expression grammar.
    #[error(
        "invalid expression format. It must be in the following format: \
         TagName:TagValue or TagName1:TagValue1&&TagName2:TagValue2. Tag values are optional"
    )]
    InvalidQueryExpression,

    /// An iterator was used outside its valid states.
    #[error("iterator {0}")]
    IteratorState(&'static str),

    /// No record exists under the key.
    #[error("data not found under key \"{key}\"")]
    DataNotFound { key: String },

    /// The store is not open, or its backing database does not exist.
    #[error("store not found: {name}")]
    StoreNotFound { name: String },

    /// A transient backend error persisted through every attempt.
    #[error(
        "failed to {operation} after {attempts} attempts. This storage provider may need \
         to be started with a higher max retry limit and/or higher time between retries. \
         Underlying error message: {last}"
    )]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: BackendError,
    },

    /// A backend call failed permanently.
    #[error("{context}: {source}")]
    Backend {
        context: String,
        source: BackendError,
    },

    /// A stored record could not be decoded.
    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl StoreError {
    /// Wrap a permanent backend failure with the operation it interrupted.
    pub fn backend(context: impl Into<String>, source: BackendError) -> Self {
        Self::Backend {
            context: context.into(),
            source,
        }
    }

    /// Whether this error means "absent" rather than "broken".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DataNotFound { .. } | Self::StoreNotFound { .. })
    }

    /// Whether this error is a retry budget running out.
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }

    /// Whether the caller's input was rejected before reaching the backend.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyStoreName
                | Self::EmptyKey
                | Self::EmptyKeys
                | Self::EmptyBatch
                | Self::InvalidTagName(_)
                | Self::DottedTagName(_)
                | Self::InvalidTagValue(_)
                | Self::InvalidQueryExpression
                | Self::IteratorState(_)
        )
    }

    /// Attach a key to a codec error from decoding that key's record.
    pub(crate) fn corrupt(key: &str, error: TypeError) -> Self {
        match error {
            TypeError::CorruptRecord { key, reason } => Self::Corrupt { key, reason },
            other => Self::Corrupt {
                key: key.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<TypeError> for StoreError {
    fn from(error: TypeError) -> Self {
        match error {
            TypeError::InvalidTagName(name) => Self::InvalidTagName(name),
            TypeError::DottedTagName(name) => Self::DottedTagName(name),
            TypeError::InvalidTagValue(value) => Self::InvalidTagValue(value),
            TypeError::CorruptRecord { key, reason } => Self::Corrupt { key, reason },
            TypeError::Serialization(reason) => Self::Corrupt {
                key: "<unknown>".into(),
                reason,
            },
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

use std::time::Duration;

/// Errors from document backend operations.
///
/// Errors are `Clone` so a backend can report the same failure to several
/// callers, and so the in-memory backend can replay injected faults.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The client has been disconnected.
    #[error("client is disconnected")]
    Disconnected,

    /// The call did not complete within its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The database rejected or failed the command.
    #[error("{0}")]
    Command(String),

    /// The cursor has already been closed.
    #[error("cursor is closed")]
    CursorClosed,
}

impl BackendError {
    /// Create a command error from any message.
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command(message.into())
    }
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

//! Bounded constant-delay retry.
//!
//! Backend errors are split into transient and permanent by an
//! [`ErrorClassifier`]. Transient errors are retried after a fixed delay
//! until the attempt budget is spent; permanent errors abort immediately.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tagdoc_backend::{BackendError, BackendResult};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Error-message fragments a document database emits when concurrent
/// writers or index builders collide.
pub const DEFAULT_TRANSIENT_PATTERNS: &[&str] = &[
    "duplicate key error collection",
    "Non-unique",
    "Existing index build in progress on the same collection. \
     Collection is limited to a single index build at a time.",
    "EOF",
    "incomplete read of message header",
];

/// How many times to attempt an operation and how long to wait in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Constant delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// A policy with at least one attempt.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Decides whether a backend error is worth retrying.
pub trait ErrorClassifier: Send + Sync + fmt::Debug {
    /// `true` if the error is expected to clear on its own.
    fn is_transient(&self, error: &BackendError) -> bool;
}

/// Classifies an error as transient when its message contains any of a set
/// of fragments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubstringClassifier {
    patterns: Vec<String>,
}

impl SubstringClassifier {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for SubstringClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSIENT_PATTERNS.iter().copied())
    }
}

impl ErrorClassifier for SubstringClassifier {
    fn is_transient(&self, error: &BackendError) -> bool {
        let message = error.to_string();
        self.patterns.iter().any(|p| message.contains(p.as_str()))
    }
}

/// Run `call` until it succeeds, fails permanently, or the policy's attempt
/// budget is spent.
///
/// `call` receives the 1-based attempt number. `store` and `operation` only
/// feed logs and error context.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    classifier: &dyn ErrorClassifier,
    store: &str,
    operation: &str,
    mut call: F,
) -> StoreResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = BackendResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let error = match call(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !classifier.is_transient(&error) {
            return Err(StoreError::backend(format!("failed to {operation}"), error));
        }
        info!(
            store,
            operation,
            attempt,
            max_attempts,
            %error,
            "transient backend error"
        );
        if attempt >= max_attempts {
            return Err(StoreError::RetriesExhausted {
                operation: operation.to_string(),
                attempts: attempt,
                last: error,
            });
        }

        debug!(store, operation, delay = ?policy.delay, "retrying");
        tokio::time::sleep(policy.delay).await;
        attempt += 1;
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::{RetryPolicy, DEFAULT_TRANSIENT_PATTERNS};

/// Default deadline for a single backend call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of attempts for retried operations.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default delay between retry attempts.
pub const DEFAULT_TIME_BETWEEN_RETRIES: Duration = Duration::from_secs(2);

/// Configuration shared by a provider and every store it opens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Prepended to every store name before it is lower-cased.
    pub db_prefix: String,
    /// Deadline for each individual backend call.
    pub timeout: Duration,
    /// Total attempts for operations that hit transient errors. Values
    /// below 1 fall back to [`DEFAULT_MAX_ATTEMPTS`].
    pub max_attempts: u32,
    /// Constant delay between attempts.
    pub time_between_retries: Duration,
    /// Error-message fragments that mark a backend error as transient.
    ///
    /// Two situations produce them when several providers share a
    /// database: concurrent upserts of the same key racing on the
    /// duplicate-key check, and concurrent index creation on one
    /// collection.
    pub transient_error_patterns: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            db_prefix: String::new(),
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            time_between_retries: DEFAULT_TIME_BETWEEN_RETRIES,
            transient_error_patterns: DEFAULT_TRANSIENT_PATTERNS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        }
    }
}

impl ProviderConfig {
    /// Set the store name prefix.
    pub fn with_db_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.db_prefix = prefix.into();
        self
    }

    /// Set the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the total number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the delay between attempts.
    pub fn with_time_between_retries(mut self, delay: Duration) -> Self {
        self.time_between_retries = delay;
        self
    }

    /// Replace the transient error fragments.
    pub fn with_transient_error_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transient_error_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Replace out-of-range values with their defaults.
    pub fn normalized(mut self) -> Self {
        if self.max_attempts < 1 {
            self.max_attempts = DEFAULT_MAX_ATTEMPTS;
        }
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        self
    }

    /// The retry policy described by this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.time_between_retries)
    }

    /// Normalise a store name: prefix, then lower-case.
    pub fn store_name(&self, name: &str) -> String {
        format!("{}{}", self.db_prefix, name).to_lowercase()
    }
}

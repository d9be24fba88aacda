use std::future::Future;
use std::time::Duration;

use tagdoc_backend::{BackendError, BackendResult};

/// Run one backend call under a deadline. Expiry becomes
/// [`BackendError::Timeout`] so it flows through classification like any
/// other backend failure.
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> BackendResult<T>
where
    F: Future<Output = BackendResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(timeout)),
    }
}

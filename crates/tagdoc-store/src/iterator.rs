//! Cursor-backed query results.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tagdoc_backend::{Document, DocumentBackend, DocumentCursor, Filter};
use tagdoc_types::{Record, Tag};

use crate::deadline::bounded;
use crate::error::{StoreError, StoreResult};

const NOT_POSITIONED: &str = "is not positioned on a record; call next first";
const CLOSED: &str = "is closed";

#[derive(Debug)]
enum State {
    /// Created, `next` not called yet.
    Ready,
    /// The last `next` returned `true`.
    Positioned(Document),
    /// The cursor ran out of results.
    Exhausted,
    Closed,
}

/// Single-pass iterator over the records matching a query.
///
/// Call [`next`](Self::next) before reading the current record through
/// [`key`](Self::key), [`value`](Self::value) or [`tags`](Self::tags). An
/// iterator cannot be rewound; run the query again instead.
pub struct StoreIterator {
    store: String,
    backend: Arc<dyn DocumentBackend>,
    cursor: Box<dyn DocumentCursor>,
    filter: Filter,
    timeout: Duration,
    state: State,
}

impl StoreIterator {
    pub(crate) fn new(
        store: String,
        backend: Arc<dyn DocumentBackend>,
        cursor: Box<dyn DocumentCursor>,
        filter: Filter,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            backend,
            cursor,
            filter,
            timeout,
            state: State::Ready,
        }
    }

    /// Advance to the next record. Returns `false` once results run out.
    pub async fn next(&mut self) -> StoreResult<bool> {
        match self.state {
            State::Closed => return Err(StoreError::IteratorState(CLOSED)),
            State::Exhausted => return Ok(false),
            State::Ready | State::Positioned(_) => {}
        }

        let next = bounded(self.timeout, self.cursor.next())
            .await
            .map_err(|e| StoreError::backend("failed to advance query results", e))?;
        match next {
            Some(document) => {
                self.state = State::Positioned(document);
                Ok(true)
            }
            None => {
                self.state = State::Exhausted;
                Ok(false)
            }
        }
    }

    /// Key of the current record.
    pub fn key(&self) -> StoreResult<String> {
        Ok(self.current()?.key)
    }

    /// Value of the current record.
    pub fn value(&self) -> StoreResult<Vec<u8>> {
        let record = self.current()?;
        record
            .raw_value()
            .map_err(|e| StoreError::corrupt(&record.key, e))
    }

    /// Tags of the current record.
    pub fn tags(&self) -> StoreResult<Vec<Tag>> {
        Ok(self.current()?.tag_list())
    }

    /// Number of records matching the query, independent of the cursor
    /// position. Runs a separate count on every call.
    pub async fn total_items(&self) -> StoreResult<u64> {
        if matches!(self.state, State::Closed) {
            return Err(StoreError::IteratorState(CLOSED));
        }
        bounded(self.timeout, self.backend.count(&self.store, &self.filter))
            .await
            .map_err(|e| StoreError::backend("failed to count query results", e))
    }

    /// Release the cursor. Closing twice is a no-op.
    pub async fn close(&mut self) -> StoreResult<()> {
        if matches!(self.state, State::Closed) {
            return Ok(());
        }
        self.state = State::Closed;
        bounded(self.timeout, self.cursor.close())
            .await
            .map_err(|e| StoreError::backend("failed to close query results", e))
    }

    fn current(&self) -> StoreResult<Record> {
        match &self.state {
            State::Positioned(document) => {
                Record::from_document(document).map_err(StoreError::from)
            }
            State::Closed => Err(StoreError::IteratorState(CLOSED)),
            State::Ready | State::Exhausted => Err(StoreError::IteratorState(NOT_POSITIONED)),
        }
    }
}

impl fmt::Debug for StoreIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreIterator")
            .field("store", &self.store)
            .field("filter", &self.filter)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagdoc_backend::{BackendError, BackendOp};

    use crate::query::{QueryOptions, SortOptions};
    use crate::store::Store;
    use crate::testing::provider;

    async fn seed(store: &Store) {
        for (key, age) in [("a", "30"), ("b", "25"), ("c", "41"), ("d", "30")] {
            store
                .put(key, key.as_bytes(), &[Tag::new("age", age), Tag::name_only("person")])
                .await
                .unwrap();
        }
    }

    async fn drain_keys(results: &mut StoreIterator) -> Vec<String> {
        let mut keys = Vec::new();
        while results.next().await.unwrap() {
            keys.push(results.key().unwrap());
        }
        keys
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn reads_require_a_current_record() {
        let (_server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        seed(&store).await;

        let mut results = store.query("age:25", QueryOptions::default()).await.unwrap();
        assert!(matches!(
            results.key(),
            Err(StoreError::IteratorState(NOT_POSITIONED))
        ));

        assert!(results.next().await.unwrap());
        assert_eq!(results.key().unwrap(), "b");
        assert_eq!(results.value().unwrap(), b"b");
        let tags = results.tags().unwrap();
        assert!(tags.contains(&Tag::new("age", "25")));
        assert!(tags.contains(&Tag::name_only("person")));

        assert!(!results.next().await.unwrap());
        assert!(!results.next().await.unwrap());
        assert!(results.value().is_err());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_final() {
        let (_server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        seed(&store).await;

        let mut results = store.query("person", QueryOptions::default()).await.unwrap();
        assert!(results.next().await.unwrap());
        results.close().await.unwrap();
        results.close().await.unwrap();

        assert!(matches!(
            results.next().await,
            Err(StoreError::IteratorState(CLOSED))
        ));
        assert!(matches!(
            results.key(),
            Err(StoreError::IteratorState(CLOSED))
        ));
        assert!(results.total_items().await.is_err());
    }

    #[tokio::test]
    async fn empty_results() {
        let (_server, provider) = provider();
        let store = provider.open_store("s").unwrap();

        let mut results = store.query("missing", QueryOptions::default()).await.unwrap();
        assert!(!results.next().await.unwrap());
        assert_eq!(results.total_items().await.unwrap(), 0);
        results.close().await.unwrap();
    }

    // -----------------------------------------------------------------------
    // Paging and ordering
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn total_items_ignores_paging_and_position() {
        let (_server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        seed(&store).await;

        let options = QueryOptions::default()
            .with_page_size(3)
            .with_initial_page(1)
            .with_sort(SortOptions::ascending("age"));
        let mut results = store.query("person", options).await.unwrap();
        assert_eq!(results.total_items().await.unwrap(), 4);
        assert_eq!(drain_keys(&mut results).await, vec!["c"]);
        assert_eq!(results.total_items().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn descending_sort() {
        let (_server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        seed(&store).await;

        let options = QueryOptions::default().with_sort(SortOptions::descending("age"));
        let mut results = store.query("age", options).await.unwrap();
        let keys = drain_keys(&mut results).await;
        assert_eq!(keys.first().map(String::as_str), Some("c"));
        assert_eq!(keys.last().map(String::as_str), Some("b"));
        assert_eq!(keys.len(), 4);
    }

    #[tokio::test]
    async fn backend_failures_during_iteration_are_reported() {
        let (server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        seed(&store).await;
        server.inject_fault(BackendOp::Count, BackendError::command("boom"), 1);

        let results = store.query("person", QueryOptions::default()).await.unwrap();
        let err = results.total_items().await.unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));
    }
}

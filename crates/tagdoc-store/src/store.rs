//! The per-store CRUD, batch and query surface.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tagdoc_backend::{BackendResult, DocumentBackend, DocumentCursor, Filter, WriteModel};
use tagdoc_types::{validate_tag, Record, Tag};
use tracing::debug;

use crate::deadline::bounded;
use crate::error::{StoreError, StoreResult};
use crate::iterator::StoreIterator;
use crate::provider::Registry;
use crate::query::{QueryOptions, TagQuery};
use crate::retry::{retry, ErrorClassifier, RetryPolicy};

/// Settings every store of a provider shares.
#[derive(Debug)]
pub(crate) struct StoreSettings {
    pub(crate) timeout: Duration,
    pub(crate) policy: RetryPolicy,
    pub(crate) classifier: Arc<dyn ErrorClassifier>,
}

/// One entry of a [`Store::batch`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    pub key: String,
    /// New value, or `None` to delete the key.
    pub value: Option<Vec<u8>>,
    /// Tags for the new value. Ignored for deletes.
    pub tags: Vec<Tag>,
}

impl Operation {
    /// Store `value` under `key`, replacing any existing record.
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>, tags: Vec<Tag>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            tags,
        }
    }

    /// Delete `key`.
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            tags: Vec::new(),
        }
    }
}

/// A named collection of tagged records.
///
/// Handles are obtained from [`Provider::open_store`](crate::Provider::open_store)
/// and shared: every open of the same name returns the same `Arc<Store>`.
pub struct Store {
    name: String,
    backend: Arc<dyn DocumentBackend>,
    settings: Arc<StoreSettings>,
    registry: Weak<Registry>,
}

impl Store {
    pub(crate) fn new(
        name: String,
        backend: Arc<dyn DocumentBackend>,
        settings: Arc<StoreSettings>,
        registry: Weak<Registry>,
    ) -> Self {
        Self {
            name,
            backend,
            settings,
            registry,
        }
    }

    /// The normalised store name, which is also its database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store `value` under `key` with `tags`, replacing any existing record
    /// and all of its tags.
    pub async fn put(&self, key: &str, value: &[u8], tags: &[Tag]) -> StoreResult<()> {
        require_key(key)?;
        tags.iter().try_for_each(validate_tag)?;

        let document = Record::new(key, value, tags).to_document();
        self.with_retry("store data", |_| {
            self.backend.replace_one(&self.name, key, document.clone())
        })
        .await?;
        debug!(store = %self.name, key, "stored data");
        Ok(())
    }

    /// The value stored under `key`.
    pub async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        let record = self.fetch(key).await?;
        record
            .raw_value()
            .map_err(|e| StoreError::corrupt(key, e))
    }

    /// The tags stored with `key`.
    pub async fn get_tags(&self, key: &str) -> StoreResult<Vec<Tag>> {
        Ok(self.fetch(key).await?.tag_list())
    }

    /// Values for several keys, in input order. Missing keys yield `None`
    /// at their position.
    pub async fn get_bulk<K: AsRef<str>>(&self, keys: &[K]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        let keys: Vec<&str> = keys.iter().map(AsRef::as_ref).collect();
        if keys.is_empty() {
            return Err(StoreError::EmptyKeys);
        }
        keys.iter().try_for_each(|key| require_key(key))?;

        let filter = Filter::id_in(keys.iter().copied());
        let mut cursor = self
            .call(self.backend.find(&self.name, &filter, &Default::default()))
            .await
            .map_err(|e| StoreError::backend("failed to run find for bulk get", e))?;

        let drained = self.drain(cursor.as_mut()).await;
        let closed = self.call(cursor.close()).await;
        let documents =
            drained.map_err(|e| StoreError::backend("failed to read bulk get results", e))?;
        closed.map_err(|e| StoreError::backend("failed to close bulk get cursor", e))?;

        let mut found = HashMap::with_capacity(documents.len());
        for document in &documents {
            let record = Record::from_document(document).map_err(StoreError::from)?;
            let value = record
                .raw_value()
                .map_err(|e| StoreError::corrupt(&record.key, e))?;
            found.insert(record.key, value);
        }

        Ok(keys
            .iter()
            .map(|key| found.get(*key).cloned())
            .collect())
    }

    /// Delete `key`. Deleting a missing key is not an error.
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        require_key(key)?;
        self.with_retry("delete data", |_| self.backend.delete_one(&self.name, key))
            .await?;
        debug!(store = %self.name, key, "deleted data");
        Ok(())
    }

    /// Apply several puts and deletes in one backend write.
    ///
    /// Operations are applied in order. If the write fails part-way,
    /// operations already applied stay applied.
    pub async fn batch(&self, operations: &[Operation]) -> StoreResult<()> {
        if operations.is_empty() {
            return Err(StoreError::EmptyBatch);
        }
        for operation in operations {
            require_key(&operation.key)?;
            if operation.value.is_some() {
                operation.tags.iter().try_for_each(validate_tag)?;
            }
        }

        let models: Vec<WriteModel> = operations
            .iter()
            .map(|operation| match &operation.value {
                Some(value) => WriteModel::Upsert {
                    id: operation.key.clone(),
                    document: Record::new(operation.key.as_str(), value, &operation.tags)
                        .to_document(),
                },
                None => WriteModel::Delete {
                    id: operation.key.clone(),
                },
            })
            .collect();
        let models = models.as_slice();

        self.with_retry("perform batch operation", |_| {
            self.backend.bulk_write(&self.name, models)
        })
        .await?;
        debug!(store = %self.name, operations = models.len(), "applied batch");
        Ok(())
    }

    /// Run a tag query. See [`crate::query`] for the expression grammar.
    pub async fn query(&self, expression: &str, options: QueryOptions) -> StoreResult<StoreIterator> {
        let filter = TagQuery::parse(expression)?.to_filter();
        options.validate()?;
        let find_options = options.to_find_options();
        let cursor = self
            .call(self.backend.find(&self.name, &filter, &find_options))
            .await
            .map_err(|e| StoreError::backend("failed to run find for query", e))?;
        Ok(StoreIterator::new(
            self.name.clone(),
            Arc::clone(&self.backend),
            cursor,
            filter,
            self.settings.timeout,
        ))
    }

    /// Writes are never buffered, so there is nothing to flush.
    pub fn flush(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Remove this store from its provider's open stores. The shared
    /// connection and the stored data are left alone.
    pub fn close(&self) -> StoreResult<()> {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self);
        }
        debug!(store = %self.name, "closed store");
        Ok(())
    }

    async fn fetch(&self, key: &str) -> StoreResult<Record> {
        require_key(key)?;
        let document = self
            .call(self.backend.find_one(&self.name, &Filter::by_id(key)))
            .await
            .map_err(|e| StoreError::backend(format!("failed to get data under key \"{key}\""), e))?
            .ok_or_else(|| StoreError::DataNotFound {
                key: key.to_string(),
            })?;
        Record::from_document(&document).map_err(|e| StoreError::corrupt(key, e))
    }

    async fn drain(
        &self,
        cursor: &mut dyn DocumentCursor,
    ) -> BackendResult<Vec<tagdoc_backend::Document>> {
        let mut documents = Vec::new();
        while let Some(document) = self.call(cursor.next()).await? {
            documents.push(document);
        }
        Ok(documents)
    }

    async fn call<T>(
        &self,
        call: impl std::future::Future<Output = BackendResult<T>>,
    ) -> BackendResult<T> {
        bounded(self.settings.timeout, call).await
    }

    async fn with_retry<F, Fut>(&self, operation: &str, mut call: F) -> StoreResult<()>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = BackendResult<()>>,
    {
        let timeout = self.settings.timeout;
        retry(
            &self.settings.policy,
            self.settings.classifier.as_ref(),
            &self.name,
            operation,
            |attempt| bounded(timeout, call(attempt)),
        )
        .await
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("name", &self.name).finish()
    }
}

fn require_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::EmptyKey);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tagdoc_backend::{BackendError, BackendOp, InMemoryServer};

    use crate::config::ProviderConfig;
    use crate::provider::Provider;
    use crate::query::SortOptions;
    use crate::testing::{fast_config, provider};

    async fn collect_keys(store: &Store, expression: &str) -> Vec<String> {
        let mut results = store.query(expression, QueryOptions::default()).await.unwrap();
        let mut keys = Vec::new();
        while results.next().await.unwrap() {
            keys.push(results.key().unwrap());
        }
        results.close().await.unwrap();
        keys.sort();
        keys
    }

    fn duplicate_key() -> BackendError {
        BackendError::command("E11000 duplicate key error collection: s.c index: _id_ dup key")
    }

    // -----------------------------------------------------------------------
    // Put / Get
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn put_then_get_each_value_shape() {
        let (_server, provider) = provider();
        let store = provider.open_store("shapes").unwrap();

        for (key, value) in [
            ("doc", br#"{"b":1,"a":[true,null]}"#.to_vec()),
            ("text", br#""hello""#.to_vec()),
            ("raw", vec![0xff, 0x00, 0x7b]),
            ("empty", Vec::new()),
        ] {
            store.put(key, &value, &[]).await.unwrap();
            assert_eq!(store.get(key).await.unwrap(), value, "key {key}");
        }
    }

    #[tokio::test]
    async fn overwrite_replaces_value_and_tags() {
        let (_server, provider) = provider();
        let store = provider.open_store("s").unwrap();

        store
            .put("k", br#"{"v":1}"#, &[Tag::new("a", "1"), Tag::new("b", "x")])
            .await
            .unwrap();
        store.put("k", b"\x01\x02", &[Tag::new("c", "y")]).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), b"\x01\x02");
        assert_eq!(store.get_tags("k").await.unwrap(), vec![Tag::new("c", "y")]);
        assert!(collect_keys(&store, "a").await.is_empty());
    }

    #[tokio::test]
    async fn numeric_tags_come_back_canonical() {
        let (_server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        store
            .put(
                "k",
                b"v",
                &[Tag::new("zip", "007"), Tag::new("n", "7"), Tag::new("name", "bob")],
            )
            .await
            .unwrap();

        let tags = store.get_tags("k").await.unwrap();
        assert!(tags.contains(&Tag::new("zip", "7")));
        assert!(tags.contains(&Tag::new("n", "7")));
        assert!(tags.contains(&Tag::new("name", "bob")));
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let (_server, provider) = provider();
        let store = provider.open_store("s").unwrap();

        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::DataNotFound { ref key } if key == "nope"));
        assert!(store.get_tags("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn validation_happens_before_the_backend() {
        let (server, provider) = provider();
        let store = provider.open_store("s").unwrap();

        assert!(matches!(store.put("", b"v", &[]).await, Err(StoreError::EmptyKey)));
        assert!(matches!(
            store.put("k", b"v", &[Tag::new("a:b", "v")]).await,
            Err(StoreError::InvalidTagName(_))
        ));
        assert!(matches!(
            store.put("k", b"v", &[Tag::new("a", "v:w")]).await,
            Err(StoreError::InvalidTagValue(_))
        ));
        assert!(matches!(
            store.put("k", b"v", &[Tag::new("user.age", "30")]).await,
            Err(StoreError::DottedTagName(_))
        ));
        assert!(matches!(
            store.query("user.age", QueryOptions::default()).await,
            Err(StoreError::DottedTagName(_))
        ));
        assert!(matches!(
            store
                .query("a", QueryOptions::default().with_sort(SortOptions::ascending("user.age")))
                .await,
            Err(StoreError::DottedTagName(_))
        ));
        assert!(matches!(store.get("").await, Err(StoreError::EmptyKey)));
        assert!(matches!(store.delete("").await, Err(StoreError::EmptyKey)));
        assert!(matches!(
            store.query("", QueryOptions::default()).await,
            Err(StoreError::InvalidQueryExpression)
        ));
        assert_eq!(server.call_count(BackendOp::ReplaceOne), 0);
        assert_eq!(server.call_count(BackendOp::Find), 0);
    }

    // -----------------------------------------------------------------------
    // Retry and failure modes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn duplicate_key_races_are_retried() {
        let (server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        server.inject_fault(BackendOp::ReplaceOne, duplicate_key(), 2);

        store.put("k", b"v", &[]).await.unwrap();
        assert_eq!(server.call_count(BackendOp::ReplaceOne), 3);
        assert_eq!(store.get("k").await.unwrap(), b"v");
    }

    #[tokio::test]
    async fn persistent_duplicate_key_exhausts_retries() {
        let (server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        server.inject_fault(BackendOp::ReplaceOne, duplicate_key(), 10);

        let err = store.put("k", b"v", &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(server.call_count(BackendOp::ReplaceOne), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let (server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        server.inject_fault(BackendOp::DeleteOne, BackendError::command("not primary"), 1);

        let err = store.delete("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));
        assert_eq!(server.call_count(BackendOp::DeleteOne), 1);
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = InMemoryServer::new();
        let provider = Provider::new(
            Arc::new(server.connect()),
            ProviderConfig::default().with_timeout(Duration::from_millis(10)),
        );
        let store = provider.open_store("s").unwrap();
        server.set_latency(Duration::from_millis(200));

        let err = store.get("k").await.unwrap_err();
        match err {
            StoreError::Backend { source, .. } => {
                assert_eq!(source, BackendError::Timeout(Duration::from_millis(10)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn corrupt_documents_surface_as_corruption() {
        let (server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        let raw = json!({"_id": "k", "bin": "not hex"});
        server.insert_raw("s", "k", raw.as_object().cloned().unwrap());

        let err = store.get("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref key, .. } if key == "k"));
    }

    // -----------------------------------------------------------------------
    // Bulk, delete, batch
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn get_bulk_keeps_input_order() {
        let (_server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        store.put("y", b"Y", &[]).await.unwrap();
        store.put("x", b"X", &[]).await.unwrap();

        let values = store.get_bulk(&["x", "missing", "y", "x"]).await.unwrap();
        assert_eq!(
            values,
            vec![Some(b"X".to_vec()), None, Some(b"Y".to_vec()), Some(b"X".to_vec())]
        );

        let empty: [&str; 0] = [];
        assert!(matches!(store.get_bulk(&empty).await, Err(StoreError::EmptyKeys)));
        assert!(matches!(store.get_bulk(&["x", ""]).await, Err(StoreError::EmptyKey)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        store.put("k", b"v", &[]).await.unwrap();

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn batch_mixes_puts_and_deletes() {
        let (server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        store.put("old", b"o", &[]).await.unwrap();

        store
            .batch(&[
                Operation::put("a", b"1".to_vec(), vec![Tag::new("t", "1")]),
                Operation::delete("old"),
                Operation::put("b", b"2".to_vec(), Vec::new()),
            ])
            .await
            .unwrap();

        assert_eq!(server.call_count(BackendOp::BulkWrite), 1);
        assert_eq!(store.get("a").await.unwrap(), b"1");
        assert_eq!(store.get("b").await.unwrap(), b"2");
        assert!(store.get("old").await.unwrap_err().is_not_found());
        assert_eq!(collect_keys(&store, "t:1").await, vec!["a"]);
    }

    #[tokio::test]
    async fn batch_validation() {
        let (server, provider) = provider();
        let store = provider.open_store("s").unwrap();

        assert!(matches!(store.batch(&[]).await, Err(StoreError::EmptyBatch)));
        assert!(matches!(
            store.batch(&[Operation::delete("")]).await,
            Err(StoreError::EmptyKey)
        ));
        assert!(matches!(
            store
                .batch(&[Operation::put("k", b"v".to_vec(), vec![Tag::new("a:b", "")])])
                .await,
            Err(StoreError::InvalidTagName(_))
        ));
        assert_eq!(server.call_count(BackendOp::BulkWrite), 0);
    }

    #[tokio::test]
    async fn batch_retries_transient_errors() {
        let (server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        server.inject_fault(BackendOp::BulkWrite, duplicate_key(), 1);

        store.batch(&[Operation::put("k", b"v".to_vec(), Vec::new())]).await.unwrap();
        assert_eq!(server.call_count(BackendOp::BulkWrite), 2);
    }

    // -----------------------------------------------------------------------
    // Query
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn query_and_semantics() {
        let (_server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        store.put("one", b"1", &[Tag::new("a", "1")]).await.unwrap();
        store.put("two", b"2", &[Tag::new("b", "2")]).await.unwrap();
        store
            .put("three", b"3", &[Tag::new("a", "1"), Tag::new("b", "2")])
            .await
            .unwrap();

        assert_eq!(collect_keys(&store, "a:1&&b:2").await, vec!["three"]);
        assert_eq!(collect_keys(&store, "a").await, vec!["one", "three"]);
        assert_eq!(collect_keys(&store, "a&&b").await, vec!["three"]);
        assert!(collect_keys(&store, "a:2").await.is_empty());
    }

    #[tokio::test]
    async fn query_sorts_numerically() {
        let (_server, provider) = provider();
        let store = provider.open_store("s").unwrap();
        for (key, n) in [("k9", "9"), ("k10", "10"), ("k1", "1")] {
            store.put(key, b"v", &[Tag::new("n", n)]).await.unwrap();
        }

        let options = QueryOptions::default().with_sort(SortOptions::ascending("n"));
        let mut results = store.query("n", options).await.unwrap();
        let mut keys = Vec::new();
        while results.next().await.unwrap() {
            keys.push(results.key().unwrap());
        }
        assert_eq!(keys, vec!["k1", "k9", "k10"]);
    }

    #[tokio::test]
    async fn flush_and_name() {
        let server = InMemoryServer::new();
        let provider = Provider::new(
            Arc::new(server.connect()),
            fast_config().with_db_prefix("App_"),
        );
        let store = provider.open_store("Things").unwrap();
        assert_eq!(store.name(), "app_things");
        store.flush().unwrap();
    }
}

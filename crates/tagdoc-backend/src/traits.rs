use async_trait::async_trait;

use crate::error::BackendResult;
use crate::model::{Document, Filter, FindOptions, IndexSpec, WriteModel};

/// Connection to a schemaless document database.
///
/// Each tagdoc store lives in its own database holding a single collection,
/// so every call names the database it targets. Implementations must be
/// thread-safe and must not retry on their own: every error is reported
/// for the attempt that produced it.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Names of existing databases, optionally restricted to an exact name.
    async fn list_database_names(&self, name: Option<&str>) -> BackendResult<Vec<String>>;

    /// Replace the document with primary key `id`, inserting it if absent.
    async fn replace_one(&self, database: &str, id: &str, document: Document)
        -> BackendResult<()>;

    /// Open a cursor over the documents matching `filter`.
    async fn find(
        &self,
        database: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> BackendResult<Box<dyn DocumentCursor>>;

    /// The first document matching `filter`, if any.
    ///
    /// Default implementation opens a single-document cursor. Backends with
    /// a native single-document lookup may override it.
    async fn find_one(&self, database: &str, filter: &Filter) -> BackendResult<Option<Document>> {
        let options = FindOptions {
            batch_size: Some(1),
            ..FindOptions::default()
        };
        let mut cursor = self.find(database, filter, &options).await?;
        let first = cursor.next().await;
        cursor.close().await?;
        first
    }

    /// Count the documents matching `filter`.
    async fn count(&self, database: &str, filter: &Filter) -> BackendResult<u64>;

    /// Delete the document with primary key `id`. Deleting a missing
    /// document is not an error.
    async fn delete_one(&self, database: &str, id: &str) -> BackendResult<()>;

    /// Apply writes in order. Writes applied before a failure stay applied.
    async fn bulk_write(&self, database: &str, models: &[WriteModel]) -> BackendResult<()>;

    /// List the indexes of a database's collection, including the primary
    /// index. A missing database has no indexes.
    async fn list_indexes(&self, database: &str) -> BackendResult<Vec<IndexSpec>>;

    /// Create several indexes in one call and return their names.
    ///
    /// Creating an index identical to an existing one is a no-op.
    async fn create_indexes(&self, database: &str, indexes: &[IndexSpec])
        -> BackendResult<Vec<String>>;

    /// Drop a secondary index by name.
    async fn drop_index(&self, database: &str, name: &str) -> BackendResult<()>;

    /// Close the connection. Calls made afterwards fail with
    /// [`BackendError::Disconnected`](crate::BackendError::Disconnected).
    async fn disconnect(&self) -> BackendResult<()>;
}

/// A forward-only cursor over find results.
#[async_trait]
pub trait DocumentCursor: Send {
    /// The next document, or `None` once the results are exhausted.
    async fn next(&mut self) -> BackendResult<Option<Document>>;

    /// Release the cursor. Closing twice is a no-op.
    async fn close(&mut self) -> BackendResult<()>;
}

//! In-memory document backend for tests and embedding.
//!
//! An [`InMemoryServer`] holds the databases. Each [`InMemoryClient`] is an
//! independent connection to it with its own connected flag, so several
//! clients on one server behave like several processes sharing one
//! database. The server also exposes test hooks: injected faults, artificial
//! latency and per-operation call counters.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{BackendError, BackendResult};
use crate::model::{
    compare_values, lookup, Document, Filter, FindOptions, IndexSpec, SortDirection, WriteModel,
    ID_FIELD, PRIMARY_INDEX_NAME,
};
use crate::traits::{DocumentBackend, DocumentCursor};

/// Backend operations, used to target injected faults and read call counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendOp {
    ListDatabaseNames,
    ReplaceOne,
    Find,
    Count,
    DeleteOne,
    BulkWrite,
    ListIndexes,
    CreateIndexes,
    DropIndex,
    Disconnect,
}

#[derive(Default)]
struct Database {
    documents: BTreeMap<String, Document>,
    indexes: Vec<IndexSpec>,
}

#[derive(Default)]
struct ServerState {
    databases: RwLock<HashMap<String, Database>>,
    faults: Mutex<HashMap<BackendOp, VecDeque<BackendError>>>,
    calls: Mutex<HashMap<BackendOp, u64>>,
    latency: Mutex<Duration>,
}

impl ServerState {
    fn read_databases(&self) -> RwLockReadGuard<'_, HashMap<String, Database>> {
        self.databases.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_databases(&self) -> RwLockWriteGuard<'_, HashMap<String, Database>> {
        self.databases.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_call(&self, op: BackendOp) {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        *calls.entry(op).or_default() += 1;
    }

    fn latency(&self) -> Duration {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_fault(&self, op: BackendOp) -> Option<BackendError> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        faults.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn list_database_names(&self, name: Option<&str>) -> Vec<String> {
        let databases = self.read_databases();
        let mut names: Vec<String> = databases
            .keys()
            .filter(|n| name.map_or(true, |wanted| wanted == n.as_str()))
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn replace_one(&self, database: &str, id: &str, mut document: Document) {
        document.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        let mut databases = self.write_databases();
        let db = databases.entry(database.to_string()).or_default();
        db.documents.insert(id.to_string(), document);
    }

    fn find(&self, database: &str, filter: &Filter, options: &FindOptions) -> Vec<Document> {
        let mut matched: Vec<Document> = {
            let databases = self.read_databases();
            databases
                .get(database)
                .map(|db| {
                    db.documents
                        .values()
                        .filter(|d| filter.matches(d))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        if let Some(sort) = &options.sort {
            matched.sort_by(|a, b| {
                let ordering = compare_values(lookup(a, &sort.path), lookup(b, &sort.path));
                match sort.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }

        let skip = options
            .skip
            .map_or(0, |s| usize::try_from(s).unwrap_or(usize::MAX));
        matched.into_iter().skip(skip).collect()
    }

    fn count(&self, database: &str, filter: &Filter) -> u64 {
        let databases = self.read_databases();
        databases.get(database).map_or(0, |db| {
            db.documents.values().filter(|d| filter.matches(d)).count() as u64
        })
    }

    fn delete_one(&self, database: &str, id: &str) {
        let mut databases = self.write_databases();
        if let Some(db) = databases.get_mut(database) {
            db.documents.remove(id);
        }
    }

    fn bulk_write(&self, database: &str, models: &[WriteModel]) {
        let mut databases = self.write_databases();
        let db = databases.entry(database.to_string()).or_default();
        for model in models {
            match model {
                WriteModel::Upsert { id, document } => {
                    let mut document = document.clone();
                    document.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                    db.documents.insert(id.clone(), document);
                }
                WriteModel::Delete { id } => {
                    db.documents.remove(id);
                }
            }
        }
    }

    fn list_indexes(&self, database: &str) -> Vec<IndexSpec> {
        let databases = self.read_databases();
        match databases.get(database) {
            Some(db) => {
                let mut indexes = vec![IndexSpec::ascending(PRIMARY_INDEX_NAME, ID_FIELD)];
                indexes.extend(db.indexes.iter().cloned());
                indexes
            }
            None => Vec::new(),
        }
    }

    fn create_indexes(&self, database: &str, specs: &[IndexSpec]) -> BackendResult<Vec<String>> {
        let mut databases = self.write_databases();
        let db = databases.entry(database.to_string()).or_default();

        // All specs are checked before any is applied.
        for spec in specs {
            if spec.name == PRIMARY_INDEX_NAME {
                return Err(BackendError::command(format!(
                    "cannot create index with reserved name {PRIMARY_INDEX_NAME}"
                )));
            }
            if let Some(existing) = db.indexes.iter().find(|i| i.name == spec.name) {
                if existing != spec {
                    return Err(BackendError::command(format!(
                        "Index with name: {} already exists with different options",
                        spec.name
                    )));
                }
                continue;
            }
            if let Some(existing) = db
                .indexes
                .iter()
                .find(|i| i.path == spec.path && i.direction == spec.direction)
            {
                return Err(BackendError::command(format!(
                    "Index already exists with a different name: {}",
                    existing.name
                )));
            }
        }

        for spec in specs {
            if !db.indexes.iter().any(|i| i.name == spec.name) {
                debug!(database, index = %spec.name, path = %spec.path, "index created");
                db.indexes.push(spec.clone());
            }
        }

        Ok(specs.iter().map(|s| s.name.clone()).collect())
    }

    fn drop_index(&self, database: &str, name: &str) -> BackendResult<()> {
        if name == PRIMARY_INDEX_NAME {
            return Err(BackendError::command("cannot drop _id index"));
        }
        let mut databases = self.write_databases();
        let db = databases
            .get_mut(database)
            .ok_or_else(|| BackendError::command(format!("ns not found {database}")))?;
        let before = db.indexes.len();
        db.indexes.retain(|i| i.name != name);
        if db.indexes.len() == before {
            return Err(BackendError::command(format!(
                "index not found with name [{name}]"
            )));
        }
        debug!(database, index = name, "index dropped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Shared in-memory database server.
///
/// Cloning the server yields another handle to the same data.
#[derive(Clone, Default)]
pub struct InMemoryServer {
    state: Arc<ServerState>,
}

impl InMemoryServer {
    /// Create an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new client connection to this server.
    pub fn connect(&self) -> InMemoryClient {
        InMemoryClient {
            state: Arc::clone(&self.state),
            connected: AtomicBool::new(true),
        }
    }

    /// Make the next `times` calls of `op` (from any client) fail with
    /// `error`. Faults queue up behind earlier ones for the same operation.
    pub fn inject_fault(&self, op: BackendOp, error: BackendError, times: usize) {
        let mut faults = self.state.faults.lock().unwrap_or_else(PoisonError::into_inner);
        faults
            .entry(op)
            .or_default()
            .extend(std::iter::repeat(error).take(times));
    }

    /// Discard all pending injected faults.
    pub fn clear_faults(&self) {
        self.state
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Delay every subsequent call by `latency` before it executes.
    pub fn set_latency(&self, latency: Duration) {
        *self.state.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Number of calls of `op` that reached the server.
    pub fn call_count(&self, op: BackendOp) -> u64 {
        let calls = self.state.calls.lock().unwrap_or_else(PoisonError::into_inner);
        calls.get(&op).copied().unwrap_or(0)
    }

    /// Sorted names of the databases that currently exist.
    pub fn database_names(&self) -> Vec<String> {
        self.state.list_database_names(None)
    }

    /// Number of documents stored in `database`.
    pub fn document_count(&self, database: &str) -> usize {
        self.state
            .read_databases()
            .get(database)
            .map_or(0, |db| db.documents.len())
    }

    /// Store a raw document, bypassing every check. Used to plant documents
    /// that no well-behaved writer would produce.
    pub fn insert_raw(&self, database: &str, id: &str, document: Document) {
        self.state.replace_one(database, id, document);
    }
}

impl std::fmt::Debug for InMemoryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryServer")
            .field("databases", &self.database_names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A connection to an [`InMemoryServer`].
pub struct InMemoryClient {
    state: Arc<ServerState>,
    connected: AtomicBool,
}

impl InMemoryClient {
    /// Common prologue of every call: connection check, call accounting,
    /// artificial latency, injected faults.
    async fn begin(&self, op: BackendOp) -> BackendResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BackendError::Disconnected);
        }
        self.state.record_call(op);
        let latency = self.state.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.state.take_fault(op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for InMemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryClient")
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl DocumentBackend for InMemoryClient {
    async fn list_database_names(&self, name: Option<&str>) -> BackendResult<Vec<String>> {
        self.begin(BackendOp::ListDatabaseNames).await?;
        Ok(self.state.list_database_names(name))
    }

    async fn replace_one(
        &self,
        database: &str,
        id: &str,
        document: Document,
    ) -> BackendResult<()> {
        self.begin(BackendOp::ReplaceOne).await?;
        self.state.replace_one(database, id, document);
        Ok(())
    }

    async fn find(
        &self,
        database: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> BackendResult<Box<dyn DocumentCursor>> {
        self.begin(BackendOp::Find).await?;
        let documents = self.state.find(database, filter, options);
        Ok(Box::new(InMemoryCursor::new(documents)))
    }

    async fn count(&self, database: &str, filter: &Filter) -> BackendResult<u64> {
        self.begin(BackendOp::Count).await?;
        Ok(self.state.count(database, filter))
    }

    async fn delete_one(&self, database: &str, id: &str) -> BackendResult<()> {
        self.begin(BackendOp::DeleteOne).await?;
        self.state.delete_one(database, id);
        Ok(())
    }

    async fn bulk_write(&self, database: &str, models: &[WriteModel]) -> BackendResult<()> {
        self.begin(BackendOp::BulkWrite).await?;
        self.state.bulk_write(database, models);
        Ok(())
    }

    async fn list_indexes(&self, database: &str) -> BackendResult<Vec<IndexSpec>> {
        self.begin(BackendOp::ListIndexes).await?;
        Ok(self.state.list_indexes(database))
    }

    async fn create_indexes(
        &self,
        database: &str,
        indexes: &[IndexSpec],
    ) -> BackendResult<Vec<String>> {
        self.begin(BackendOp::CreateIndexes).await?;
        self.state.create_indexes(database, indexes)
    }

    async fn drop_index(&self, database: &str, name: &str) -> BackendResult<()> {
        self.begin(BackendOp::DropIndex).await?;
        self.state.drop_index(database, name)
    }

    async fn disconnect(&self) -> BackendResult<()> {
        self.begin(BackendOp::Disconnect).await?;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Cursor over a snapshot of matching documents.
#[derive(Debug)]
pub struct InMemoryCursor {
    documents: VecDeque<Document>,
    closed: bool,
}

impl InMemoryCursor {
    fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: documents.into(),
            closed: false,
        }
    }
}

#[async_trait]
impl DocumentCursor for InMemoryCursor {
    async fn next(&mut self) -> BackendResult<Option<Document>> {
        if self.closed {
            return Err(BackendError::CursorClosed);
        }
        Ok(self.documents.pop_front())
    }

    async fn close(&mut self) -> BackendResult<()> {
        self.closed = true;
        self.documents.clear();
        Ok(())
    }
}

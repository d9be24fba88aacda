//! Document database capability surface for tagdoc.
//!
//! tagdoc treats its database as an external service. This crate names the
//! operations it needs from that service and nothing more:
//!
//! - replace-or-insert of a document by key
//! - filtered find with sort, skip and batch size, plus filtered count
//! - delete by key, and ordered bulk writes mixing upserts and deletes
//! - list, create and drop secondary indexes
//! - list database names, and disconnect
//!
//! # Storage Backends
//!
//! All backends implement the [`DocumentBackend`] trait:
//!
//! - [`InMemoryClient`] -- a client of an [`InMemoryServer`], for tests and
//!   embedding. Several clients may share one server, which is how
//!   independent processes sharing a database are modelled.
//!
//! # Design Rules
//!
//! 1. Every call is self-contained; no lock is held between calls.
//! 2. Databases are created lazily by the first write or index creation.
//! 3. The primary index ([`PRIMARY_INDEX_NAME`]) always exists and can
//!    never be dropped.
//! 4. Errors are surfaced to the caller per attempt; the backend never
//!    retries on its own.

pub mod error;
pub mod memory;
pub mod model;
pub mod traits;

pub use error::{BackendError, BackendResult};
pub use memory::{BackendOp, InMemoryClient, InMemoryCursor, InMemoryServer};
pub use model::{
    compare_values, lookup, values_equal, Condition, Document, Filter, FindOptions, IndexSpec,
    SortDirection, SortSpec, WriteModel, ID_FIELD, PRIMARY_INDEX_NAME,
};
pub use traits::{DocumentBackend, DocumentCursor};

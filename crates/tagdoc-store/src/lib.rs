//! Tagged key/value stores over a schemaless document database.
//!
//! A [`Provider`] owns one backend connection and a registry of open
//! [`Store`]s. Each store keeps byte values under string keys, annotated
//! with tags, and answers tag queries through a lazily consumed
//! [`StoreIterator`].
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tagdoc_backend::InMemoryServer;
//! use tagdoc_store::{Provider, ProviderConfig, QueryOptions};
//! use tagdoc_types::Tag;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tagdoc_store::StoreError> {
//! let server = InMemoryServer::new();
//! let provider = Provider::new(Arc::new(server.connect()), ProviderConfig::default());
//!
//! let store = provider.open_store("People")?;
//! store.put("alice", br#"{"city":"Oslo"}"#, &[Tag::new("age", "30")]).await?;
//!
//! let mut results = store.query("age:30", QueryOptions::default()).await?;
//! while results.next().await? {
//!     assert_eq!(results.key()?, "alice");
//! }
//! results.close().await?;
//! provider.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`query`] -- Tag query expressions and query options
//! - [`retry`] -- Bounded constant-delay retry with pluggable error classification
//! - [`indexes`] -- Convergence of secondary indexes to a [`StoreConfiguration`]
//! - [`store`] -- The per-store CRUD, batch and query surface
//! - [`iterator`] -- Cursor-backed query results
//! - [`provider`] -- Store registry and connection lifecycle
//!
//! [`StoreConfiguration`]: tagdoc_types::StoreConfiguration

pub mod config;
mod deadline;
pub mod error;
pub mod indexes;
pub mod iterator;
pub mod provider;
pub mod query;
pub mod retry;
pub mod store;

pub use config::ProviderConfig;
pub use error::{StoreError, StoreResult};
pub use indexes::{ConvergenceReport, IndexPlan};
pub use iterator::StoreIterator;
pub use provider::Provider;
pub use query::{QueryOptions, QueryTerm, SortOptions, TagQuery};
pub use retry::{retry, ErrorClassifier, RetryPolicy, SubstringClassifier};
pub use store::{Operation, Store};
pub use tagdoc_backend::SortDirection;

//! Store registry and connection lifecycle.
//!
//! A [`Provider`] owns the backend connection and hands out shared
//! [`Store`] handles. Opening a name that is already open returns the same
//! handle. The registry lock is only held for map access, never across a
//! backend call.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tagdoc_backend::{BackendError, DocumentBackend};
use tagdoc_types::StoreConfiguration;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::deadline::bounded;
use crate::error::{StoreError, StoreResult};
use crate::indexes::{self, ConvergenceReport};
use crate::retry::{ErrorClassifier, SubstringClassifier};
use crate::store::{Store, StoreSettings};

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Open stores by normalised name.
///
/// A poisoned lock is recovered: the map holds no invariant spanning
/// entries, so a panic mid-update cannot leave it inconsistent.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    stores: RwLock<HashMap<String, Arc<Store>>>,
}

impl Registry {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Store>>> {
        self.stores.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Store>>> {
        self.stores.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, name: &str) -> Option<Arc<Store>> {
        self.read().get(name).cloned()
    }

    fn get_or_insert_with(&self, name: &str, create: impl FnOnce() -> Store) -> Arc<Store> {
        let mut stores = self.write();
        Arc::clone(
            stores
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(create())),
        )
    }

    /// Remove `store`, but only if it is the handle registered under its
    /// name. A stale handle must not evict a newer store.
    pub(crate) fn remove(&self, store: &Store) {
        let mut stores = self.write();
        if stores
            .get(store.name())
            .is_some_and(|registered| std::ptr::eq(Arc::as_ptr(registered), store))
        {
            stores.remove(store.name());
        }
    }

    fn snapshot(&self) -> Vec<Arc<Store>> {
        self.read().values().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Entry point: opens stores, manages their index configuration, and owns
/// the shared backend connection.
pub struct Provider {
    backend: Arc<dyn DocumentBackend>,
    registry: Arc<Registry>,
    config: ProviderConfig,
    settings: Arc<StoreSettings>,
}

impl Provider {
    /// Create a provider over a connected backend.
    ///
    /// Out-of-range configuration values are replaced by their defaults.
    /// Backend errors are classified with a [`SubstringClassifier`] built
    /// from `config.transient_error_patterns`.
    pub fn new(backend: Arc<dyn DocumentBackend>, config: ProviderConfig) -> Self {
        let classifier = Arc::new(SubstringClassifier::new(
            config.transient_error_patterns.iter().cloned(),
        ));
        Self::with_classifier(backend, config, classifier)
    }

    /// Create a provider that classifies backend errors with `classifier`
    /// instead of `config.transient_error_patterns`. Every store opened by
    /// this provider shares it.
    pub fn with_classifier(
        backend: Arc<dyn DocumentBackend>,
        config: ProviderConfig,
        classifier: Arc<dyn ErrorClassifier>,
    ) -> Self {
        let config = config.normalized();
        let settings = Arc::new(StoreSettings {
            timeout: config.timeout,
            policy: config.retry_policy(),
            classifier,
        });
        Self {
            backend,
            registry: Arc::new(Registry::default()),
            config,
            settings,
        }
    }

    /// The effective configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Open the store called `name`, or return it if already open.
    ///
    /// Names are prefixed with the configured prefix and lower-cased, so
    /// `"Users"` and `"users"` refer to the same store. The backing database
    /// is created by the backend on first write.
    pub fn open_store(&self, name: &str) -> StoreResult<Arc<Store>> {
        if name.is_empty() {
            return Err(StoreError::EmptyStoreName);
        }
        let name = self.config.store_name(name);
        let store = self.registry.get_or_insert_with(&name, || {
            debug!(store = %name, "opened store");
            Store::new(
                name.clone(),
                Arc::clone(&self.backend),
                Arc::clone(&self.settings),
                Arc::downgrade(&self.registry),
            )
        });
        Ok(store)
    }

    /// Converge the indexes of an open store to `config`.
    ///
    /// Indexes for tag names missing from `config` are dropped, and the
    /// missing ones are created. Applying the same configuration again
    /// creates and drops nothing.
    pub async fn set_store_config(
        &self,
        name: &str,
        config: &StoreConfiguration,
    ) -> StoreResult<ConvergenceReport> {
        config.validate()?;
        let name = self.config.store_name(name);
        let store = self
            .registry
            .get(&name)
            .ok_or(StoreError::StoreNotFound { name })?;
        indexes::converge(self.backend.as_ref(), store.name(), config, &self.settings).await
    }

    /// The indexed tag names of a store, read from the backend.
    ///
    /// The store does not need to be open in this provider, but its
    /// database must exist.
    pub async fn get_store_config(&self, name: &str) -> StoreResult<StoreConfiguration> {
        if name.is_empty() {
            return Err(StoreError::EmptyStoreName);
        }
        let name = self.config.store_name(name);
        let databases = bounded(
            self.settings.timeout,
            self.backend.list_database_names(Some(&name)),
        )
        .await
        .map_err(|e| {
            StoreError::backend(
                format!("failed to determine if the underlying database exists for {name}"),
                e,
            )
        })?;
        if databases.is_empty() {
            return Err(StoreError::StoreNotFound { name });
        }

        let tag_names =
            indexes::existing_indexed_tag_names(self.backend.as_ref(), &name, &self.settings)
                .await?;
        Ok(StoreConfiguration::new(tag_names))
    }

    /// Handles of every store currently open, in no particular order.
    pub fn get_open_stores(&self) -> Vec<Arc<Store>> {
        self.registry.snapshot()
    }

    /// Close every open store, then disconnect from the backend.
    ///
    /// Disconnecting an already disconnected client is not an error.
    pub async fn close(&self) -> StoreResult<()> {
        for store in self.registry.snapshot() {
            store.close()?;
        }

        match bounded(self.settings.timeout, self.backend.disconnect()).await {
            Ok(()) | Err(BackendError::Disconnected) => {
                debug!("disconnected from backend");
                Ok(())
            }
            Err(e) => Err(StoreError::backend("failed to disconnect from the database", e)),
        }
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("config", &self.config)
            .field("open_stores", &self.registry.read().len())
            .finish()
    }
}

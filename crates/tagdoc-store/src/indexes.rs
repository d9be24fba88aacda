//! Convergence of a store's secondary indexes to a [`StoreConfiguration`].
//!
//! Each configured tag name gets an ascending index, named after the tag,
//! on the tag's field path. Convergence first computes an [`IndexPlan`]
//! from the existing index names, then drops stale indexes one by one and
//! creates the missing ones in a single batched call.

use std::collections::BTreeSet;

use tagdoc_backend::{DocumentBackend, IndexSpec, PRIMARY_INDEX_NAME};
use tagdoc_types::{tag_path, StoreConfiguration};
use tracing::info;

use crate::deadline::bounded;
use crate::error::{StoreError, StoreResult};
use crate::retry::retry;
use crate::store::StoreSettings;

/// What convergence will do, computed before touching the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexPlan {
    /// Existing indexes that are also targets.
    pub keep: Vec<String>,
    /// Existing indexes that are not targets.
    pub drop: Vec<String>,
    /// Targets with no existing index.
    pub create: Vec<String>,
}

impl IndexPlan {
    /// Plan the transition from `existing` secondary index names to the
    /// indexes `target` asks for. Duplicate target names are planned once.
    pub fn plan(existing: &[String], target: &StoreConfiguration) -> Self {
        let mut plan = Self::default();
        for name in existing {
            if target.contains(name) {
                plan.keep.push(name.clone());
            } else {
                plan.drop.push(name.clone());
            }
        }

        let mut seen = BTreeSet::new();
        for name in &target.tag_names {
            if seen.insert(name.as_str()) && !plan.keep.contains(name) {
                plan.create.push(name.clone());
            }
        }
        plan
    }

    /// `true` when the backend already matches the target.
    pub fn is_noop(&self) -> bool {
        self.drop.is_empty() && self.create.is_empty()
    }

    fn index_specs(&self) -> Vec<IndexSpec> {
        self.create
            .iter()
            .map(|name| IndexSpec::ascending(name.clone(), tag_path(name)))
            .collect()
    }
}

/// What a convergence run actually did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConvergenceReport {
    pub kept: Vec<String>,
    pub dropped: Vec<String>,
    pub created: Vec<String>,
}

impl ConvergenceReport {
    /// `true` when nothing was created or dropped.
    pub fn is_noop(&self) -> bool {
        self.dropped.is_empty() && self.created.is_empty()
    }
}

/// Names of the secondary indexes on `database`, primary index excluded.
pub(crate) async fn existing_indexed_tag_names(
    backend: &dyn DocumentBackend,
    database: &str,
    settings: &StoreSettings,
) -> StoreResult<Vec<String>> {
    let indexes = bounded(settings.timeout, backend.list_indexes(database))
        .await
        .map_err(|e| StoreError::backend("failed to get existing indexed tag names", e))?;
    Ok(indexes
        .into_iter()
        .filter(|index| index.name != PRIMARY_INDEX_NAME)
        .map(|index| index.name)
        .collect())
}

/// Bring the indexes of `database` in line with `target`.
pub(crate) async fn converge(
    backend: &dyn DocumentBackend,
    database: &str,
    target: &StoreConfiguration,
    settings: &StoreSettings,
) -> StoreResult<ConvergenceReport> {
    let existing = existing_indexed_tag_names(backend, database, settings).await?;
    let plan = IndexPlan::plan(&existing, target);

    for name in &plan.keep {
        info!(store = database, index = %name, "index already exists, skipping index creation");
    }

    for name in &plan.drop {
        bounded(settings.timeout, backend.drop_index(database, name))
            .await
            .map_err(|e| StoreError::backend(format!("failed to remove index for {name}"), e))?;
        info!(store = database, index = %name, "dropped stale index");
    }

    if !plan.create.is_empty() {
        let specs = plan.index_specs();
        let specs = specs.as_slice();
        retry(
            &settings.policy,
            settings.classifier.as_ref(),
            database,
            "create indexes",
            |_| bounded(settings.timeout, backend.create_indexes(database, specs)),
        )
        .await?;
    }

    info!(
        store = database,
        kept = plan.keep.len(),
        dropped = plan.drop.len(),
        created = plan.create.len(),
        "indexes converged"
    );

    Ok(ConvergenceReport {
        kept: plan.keep,
        dropped: plan.drop,
        created: plan.create,
    })
}

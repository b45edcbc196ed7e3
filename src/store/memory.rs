//! In-memory graph store.
//!
//! Serves catalogs straight from their adjacency lists. Used for tests and
//! for deployments where the catalog fits in process memory.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::catalog::{Catalog, CatalogSet};
use crate::types::{DatasetId, Variable, VariableId};
use super::GraphStore;

/// Error type for in-memory store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// Store was switched offline.
    #[error("In-memory store is offline")]
    Offline,
}

/// In-memory graph store.
///
/// Catalogs are held as `Arc<Catalog>`, so a query clones a pointer under a
/// short read lock and traverses without holding it. An unknown dataset
/// behaves like a dataset with no edges.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    catalogs: RwLock<BTreeMap<DatasetId, Arc<Catalog>>>,
    offline: AtomicBool,
}

impl InMemoryGraphStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store serving every catalog in the set.
    pub fn from_catalog_set(set: &CatalogSet) -> Self {
        let store = Self::new();
        {
            let mut catalogs = store.catalogs.write();
            for catalog in set.iter() {
                catalogs.insert(catalog.id().clone(), Arc::clone(catalog));
            }
        }
        store
    }

    /// Add or replace a catalog.
    pub fn insert_catalog(&self, catalog: Arc<Catalog>) {
        self.catalogs.write().insert(catalog.id().clone(), catalog);
    }

    /// Catalog for a dataset.
    pub fn catalog(&self, dataset: &DatasetId) -> Option<Arc<Catalog>> {
        self.catalogs.read().get(dataset).cloned()
    }

    /// Number of stored catalogs.
    pub fn num_catalogs(&self) -> usize {
        self.catalogs.read().len()
    }

    /// Simulate an unreachable backend: every query fails while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn online_catalog(&self, dataset: &DatasetId) -> Result<Option<Arc<Catalog>>, InMemoryError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(InMemoryError::Offline);
        }
        Ok(self.catalog(dataset))
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    type Error = InMemoryError;

    async fn load_catalog(&self, catalog: &Catalog) -> Result<(), Self::Error> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(InMemoryError::Offline);
        }
        self.insert_catalog(Arc::new(catalog.clone()));
        Ok(())
    }

    async fn load_catalogs(&self, catalogs: &[Arc<Catalog>]) -> Result<(), Self::Error> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(InMemoryError::Offline);
        }
        // One write lock: readers see either none or all of the batch
        let mut stored = self.catalogs.write();
        for catalog in catalogs {
            stored.insert(catalog.id().clone(), Arc::clone(catalog));
        }
        Ok(())
    }

    async fn list_datasets(&self) -> Result<Vec<DatasetId>, Self::Error> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(InMemoryError::Offline);
        }
        Ok(self.catalogs.read().keys().cloned().collect())
    }

    async fn get_variables(
        &self,
        dataset: &DatasetId,
        ids: &[VariableId],
    ) -> Result<Vec<Variable>, Self::Error> {
        let Some(catalog) = self.online_catalog(dataset)? else {
            return Ok(Vec::new());
        };

        let positions: BTreeSet<usize> = ids.iter().filter_map(|id| catalog.position(id)).collect();
        Ok(positions
            .into_iter()
            .map(|p| catalog.variables()[p].clone())
            .collect())
    }

    async fn get_requirements(
        &self,
        dataset: &DatasetId,
        ids: &[VariableId],
    ) -> Result<Vec<Variable>, Self::Error> {
        let Some(catalog) = self.online_catalog(dataset)? else {
            return Ok(Vec::new());
        };

        let positions: BTreeSet<usize> = ids
            .iter()
            .flat_map(|id| catalog.requirements_of(id))
            .filter_map(|v| catalog.position(&v.id))
            .collect();
        Ok(positions
            .into_iter()
            .map(|p| catalog.variables()[p].clone())
            .collect())
    }

    async fn resolve_closure(
        &self,
        dataset: &DatasetId,
        seeds: &[VariableId],
    ) -> Result<Vec<Variable>, Self::Error> {
        let Some(catalog) = self.online_catalog(dataset)? else {
            return Ok(Vec::new());
        };

        Ok(catalog.reachable_from(seeds).into_iter().cloned().collect())
    }

    async fn is_healthy(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }
}

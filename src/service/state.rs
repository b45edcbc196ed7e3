//! Service state management.
//!
//! Contains the CatalogRegistry and shared service state.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::augmenter::{UnknownVariablePolicy, VariableAugmenter};
use crate::canonical::canonical_hash_hex;
use crate::catalog::{Catalog, CatalogLoadError, CatalogSet};
use crate::resolver::TraversalMode;
use crate::store::GraphStore;
use crate::types::DatasetId;

/// Summary of one loaded catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSummary {
    /// Dataset identifier.
    pub dataset_id: DatasetId,
    /// Dataset display name.
    pub name: String,
    /// Number of variables.
    pub variable_count: usize,
    /// Number of declared edges (duplicates included).
    pub edge_count: usize,
    /// Content fingerprint.
    pub fingerprint: String,
    /// When this catalog was installed.
    pub loaded_at: DateTime<Utc>,
}

impl CatalogSummary {
    /// Summarize a catalog installed now.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        Self {
            dataset_id: catalog.id().clone(),
            name: catalog.name().to_string(),
            variable_count: catalog.variables().len(),
            edge_count: catalog.edges().len(),
            fingerprint: catalog.fingerprint().to_string(),
            loaded_at: Utc::now(),
        }
    }
}

/// Registry of the catalogs the service has installed.
///
/// The registry fingerprint covers dataset ids and catalog fingerprints, so
/// it changes exactly when the loaded content changes.
#[derive(Debug, Clone)]
pub struct CatalogRegistry {
    entries: BTreeMap<DatasetId, CatalogSummary>,
    registry_fingerprint: String,
}

impl CatalogRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        let mut registry = Self {
            entries: BTreeMap::new(),
            registry_fingerprint: String::new(),
        };
        registry.update_fingerprint();
        registry
    }

    /// Replace every entry.
    pub fn replace_all(&mut self, summaries: impl IntoIterator<Item = CatalogSummary>) {
        self.entries = summaries
            .into_iter()
            .map(|s| (s.dataset_id.clone(), s))
            .collect();
        self.update_fingerprint();
    }

    /// Look up one dataset.
    pub fn get(&self, dataset_id: &DatasetId) -> Option<&CatalogSummary> {
        self.entries.get(dataset_id)
    }

    /// All entries in dataset order.
    pub fn list(&self) -> Vec<CatalogSummary> {
        self.entries.values().cloned().collect()
    }

    /// Get the registry fingerprint.
    pub fn fingerprint(&self) -> &str {
        &self.registry_fingerprint
    }

    /// Number of registered catalogs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn update_fingerprint(&mut self) {
        let pairs: Vec<(&str, &str)> = self
            .entries
            .values()
            .map(|s| (s.dataset_id.as_str(), s.fingerprint.as_str()))
            .collect();
        self.registry_fingerprint = canonical_hash_hex(&pairs);
    }
}

impl Default for CatalogRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from installing or reloading catalogs.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// No catalog path was configured.
    #[error("No catalog source configured")]
    NoSource,
    /// Definitions could not be read or validated.
    #[error(transparent)]
    Load(#[from] CatalogLoadError),
    /// The store rejected a catalog.
    #[error("Store unavailable: {0}")]
    Store(String),
}

/// Shared service state.
///
/// Contains the graph store, the augmenter built on it, and the catalog
/// registry. Cloning shares all of them.
pub struct ServiceState<S: GraphStore + 'static> {
    /// The graph store backing resolution.
    pub store: Arc<S>,
    /// Augmenter used by request handlers.
    pub augmenter: Arc<VariableAugmenter<S>>,
    /// Installed catalogs.
    pub registry: Arc<RwLock<CatalogRegistry>>,
    /// Catalogs behind the registry entries, restored when an install fails.
    installed: Arc<RwLock<Vec<Arc<Catalog>>>>,
    /// Serializes installs.
    install_lock: Arc<tokio::sync::Mutex<()>>,
    catalog_source: Option<PathBuf>,
}

impl<S: GraphStore + 'static> ServiceState<S> {
    /// Create service state over a store.
    pub fn new(store: S) -> Self {
        Self::with_options(store, UnknownVariablePolicy::Ignore, TraversalMode::Delegated)
    }

    /// Create service state with explicit augmentation options.
    pub fn with_options(store: S, unknown: UnknownVariablePolicy, mode: TraversalMode) -> Self {
        let store = Arc::new(store);
        let augmenter = VariableAugmenter::new(Arc::clone(&store))
            .with_mode(mode)
            .with_unknown_policy(unknown);
        Self {
            store,
            augmenter: Arc::new(augmenter),
            registry: Arc::new(RwLock::new(CatalogRegistry::new())),
            installed: Arc::new(RwLock::new(Vec::new())),
            install_lock: Arc::new(tokio::sync::Mutex::new(())),
            catalog_source: None,
        }
    }

    /// Set the path re-read by [`ServiceState::reload`].
    pub fn with_catalog_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_source = Some(path.into());
        self
    }

    /// Configured catalog path.
    pub fn catalog_source(&self) -> Option<&PathBuf> {
        self.catalog_source.as_ref()
    }

    /// Store every catalog in the set and record it in the registry.
    ///
    /// All or nothing: if the store fails, the previously installed catalogs
    /// are written back and the registry is left as it was.
    pub async fn install(&self, set: &CatalogSet) -> Result<(), ReloadError> {
        let _guard = self.install_lock.lock().await;
        let catalogs: Vec<Arc<Catalog>> = set.iter().cloned().collect();

        if let Err(e) = self.store.load_catalogs(&catalogs).await {
            let error = e.to_string();
            tracing::warn!(error = %error, "Catalog install failed, restoring previous catalogs");
            self.restore_previous().await;
            return Err(ReloadError::Store(error));
        }

        *self.installed.write() = catalogs;
        let mut registry = self.registry.write();
        registry.replace_all(set.iter().map(|c| CatalogSummary::from_catalog(c)));
        tracing::info!(
            dataset_count = registry.len(),
            registry_fingerprint = %registry.fingerprint(),
            "Catalogs installed"
        );
        Ok(())
    }

    async fn restore_previous(&self) {
        let previous = self.installed.read().clone();
        if previous.is_empty() {
            return;
        }
        if let Err(e) = self.store.load_catalogs(&previous).await {
            tracing::error!(
                error = %e,
                dataset_count = previous.len(),
                "Failed to restore previous catalogs; store and registry may disagree"
            );
        }
    }

    /// Re-read the catalog source and install it.
    ///
    /// Definitions are fully validated before anything is stored, so a
    /// malformed file leaves the previous catalogs in service.
    pub async fn reload(&self) -> Result<Vec<CatalogSummary>, ReloadError> {
        let path = self.catalog_source.as_ref().ok_or(ReloadError::NoSource)?;
        let set = CatalogSet::load_path(path)?;
        self.install(&set).await?;
        Ok(self.registry.read().list())
    }
}

impl<S: GraphStore + 'static> Clone for ServiceState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            augmenter: Arc::clone(&self.augmenter),
            registry: Arc::clone(&self.registry),
            installed: Arc::clone(&self.installed),
            install_lock: Arc::clone(&self.install_lock),
            catalog_source: self.catalog_source.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;
    use crate::store::{InMemoryError, InMemoryGraphStore};
    use crate::types::{Variable, VariableId};

    /// In-memory store whose `fail_on`-th `load_catalog` call fails.
    struct FlakyStore {
        inner: InMemoryGraphStore,
        loads: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl GraphStore for FlakyStore {
        type Error = InMemoryError;

        async fn load_catalog(&self, catalog: &Catalog) -> Result<(), Self::Error> {
            if self.loads.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(InMemoryError::Offline);
            }
            self.inner.load_catalog(catalog).await
        }

        async fn list_datasets(&self) -> Result<Vec<DatasetId>, Self::Error> {
            self.inner.list_datasets().await
        }

        async fn get_variables(
            &self,
            dataset: &DatasetId,
            ids: &[VariableId],
        ) -> Result<Vec<Variable>, Self::Error> {
            self.inner.get_variables(dataset, ids).await
        }

        async fn get_requirements(
            &self,
            dataset: &DatasetId,
            ids: &[VariableId],
        ) -> Result<Vec<Variable>, Self::Error> {
            self.inner.get_requirements(dataset, ids).await
        }

        async fn resolve_closure(
            &self,
            dataset: &DatasetId,
            seeds: &[VariableId],
        ) -> Result<Vec<Variable>, Self::Error> {
            self.inner.resolve_closure(dataset, seeds).await
        }
    }

    const CATALOG: &str = r#"{"id": "A", "name": "a",
        "variables": [{"id": "x", "name": "/x"}, {"id": "y", "name": "/y"}],
        "edges": [{"origin": "x", "destination": "y"}]}"#;

    fn temp_file(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("vdk_state_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_registry_fingerprint_changes() {
        let mut registry = CatalogRegistry::new();
        let initial = registry.fingerprint().to_string();

        let set = CatalogSet::from_json_str(CATALOG).unwrap();
        registry.replace_all(set.iter().map(|c| CatalogSummary::from_catalog(c)));

        assert_ne!(registry.fingerprint(), initial);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_fingerprint_ignores_load_time() {
        let set = CatalogSet::from_json_str(CATALOG).unwrap();
        let mut a = CatalogRegistry::new();
        let mut b = CatalogRegistry::new();
        a.replace_all(set.iter().map(|c| CatalogSummary::from_catalog(c)));
        b.replace_all(set.iter().map(|c| CatalogSummary::from_catalog(c)));
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[tokio::test]
    async fn test_reload_without_source() {
        let state = ServiceState::new(InMemoryGraphStore::new());
        assert!(matches!(state.reload().await, Err(ReloadError::NoSource)));
    }

    #[tokio::test]
    async fn test_reload_installs_catalogs() {
        let path = temp_file(CATALOG);
        let state = ServiceState::new(InMemoryGraphStore::new()).with_catalog_source(&path);

        let listed = state.reload().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(state.store.num_catalogs(), 1);

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_catalogs() {
        let path = temp_file(CATALOG);
        let state = ServiceState::new(InMemoryGraphStore::new()).with_catalog_source(&path);
        state.reload().await.unwrap();
        let before = state.registry.read().fingerprint().to_string();

        std::fs::write(&path, r#"{"id": "A", "edges": [{"origin": "x", "destination": "nowhere"}]}"#).unwrap();
        let err = state.reload().await.unwrap_err();
        assert!(matches!(err, ReloadError::Load(CatalogLoadError::Integrity(_))));
        assert_eq!(state.registry.read().fingerprint(), before);

        let a = state.store.catalog(&DatasetId::new("A")).unwrap();
        assert_eq!(a.variables().len(), 2);

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_store_failure_mid_install_restores_previous_catalogs() {
        let v1 = CatalogSet::from_json_str(r#"[
            {"id": "A", "variables": [{"id": "x", "name": "/x"}, {"id": "y", "name": "/y"}],
             "edges": [{"origin": "x", "destination": "y"}]},
            {"id": "B", "variables": [{"id": "z", "name": "/z"}]}
        ]"#).unwrap();
        let v2 = CatalogSet::from_json_str(r#"[
            {"id": "A", "variables": [{"id": "x", "name": "/x"}, {"id": "y", "name": "/y"}]},
            {"id": "B", "variables": [{"id": "z", "name": "/z"}, {"id": "w", "name": "/w"}]}
        ]"#).unwrap();

        // Loads 1-2 install v1, load 3 writes v2's A, load 4 (B) fails
        let state = ServiceState::new(FlakyStore {
            inner: InMemoryGraphStore::new(),
            loads: AtomicUsize::new(0),
            fail_on: 4,
        });
        state.install(&v1).await.unwrap();
        let before = state.registry.read().fingerprint().to_string();

        let err = state.install(&v2).await.unwrap_err();
        assert!(matches!(err, ReloadError::Store(_)));
        assert_eq!(state.registry.read().fingerprint(), before);

        let a = DatasetId::new("A");
        let stored = state.store.inner.catalog(&a).unwrap();
        assert_eq!(stored.edges().len(), 1);
        assert_eq!(
            state.registry.read().get(&a).unwrap().fingerprint,
            stored.fingerprint()
        );
        let closure = state
            .store
            .resolve_closure(&a, &[VariableId::new("x")])
            .await
            .unwrap();
        assert_eq!(closure.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_first_install_leaves_registry_empty() {
        let store = InMemoryGraphStore::new();
        store.set_offline(true);
        let state = ServiceState::new(store);

        let set = CatalogSet::from_json_str(CATALOG).unwrap();
        assert!(matches!(state.install(&set).await, Err(ReloadError::Store(_))));
        assert!(state.registry.read().is_empty());
    }
}

//! Closure resolver.
//!
//! Computes, for a set of seed variables in one dataset, every variable
//! reachable by following one or more "requires" edges.
//!
//! ## Algorithm
//!
//! Two traversal modes produce the same set:
//!
//! - [`TraversalMode::Delegated`]: one store round trip; the backend walks
//!   the graph itself (adjacency lists in memory, recursive CTE in SQL).
//! - [`TraversalMode::Frontier`]: breadth-first, one
//!   [`GraphStore::get_requirements`] round trip per level. A variable is
//!   expanded at most once; seeds count as already expanded, but still
//!   surface in the result if another variable requires them.
//!
//! Either way the traversal terminates on cycles and self-loops, and an
//! empty seed set returns immediately without touching the store.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use crate::store::GraphStore;
use crate::types::{DatasetId, Variable, VariableId};

/// Error type for resolver operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The backing store was unreachable or the query failed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ResolveError {
    /// Create a store error from any error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

/// How the resolver walks the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalMode {
    /// Ask the store for the whole closure in one call.
    #[default]
    Delegated,
    /// Expand level by level through one-hop lookups.
    Frontier,
}

/// Transitive closure resolver over a [`GraphStore`].
///
/// Holds no mutable state; one resolver can serve any number of concurrent
/// requests.
pub struct ClosureResolver<S: GraphStore> {
    store: Arc<S>,
    mode: TraversalMode,
}

impl<S: GraphStore> ClosureResolver<S> {
    /// Create a resolver using delegated traversal.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            mode: TraversalMode::Delegated,
        }
    }

    /// Select the traversal mode.
    pub fn with_mode(mut self, mode: TraversalMode) -> Self {
        self.mode = mode;
        self
    }

    /// Resolve the variables reachable from `seeds` by one or more edges.
    ///
    /// The result is deduplicated. Its order is deterministic for a fixed
    /// catalog and seed set but carries no further meaning.
    pub async fn resolve(
        &self,
        dataset: &DatasetId,
        seeds: &BTreeSet<VariableId>,
    ) -> Result<Vec<Variable>, ResolveError> {
        if seeds.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let result = match self.mode {
            TraversalMode::Delegated => self.resolve_delegated(dataset, seeds).await,
            TraversalMode::Frontier => self.resolve_frontier(dataset, seeds).await,
        };

        match &result {
            Ok(closure) => tracing::debug!(
                dataset_id = %dataset,
                mode = ?self.mode,
                seed_count = seeds.len(),
                resolved_count = closure.len(),
                latency_ms = start.elapsed().as_millis() as u64,
                "Closure resolved"
            ),
            Err(e) => tracing::warn!(
                dataset_id = %dataset,
                mode = ?self.mode,
                seed_count = seeds.len(),
                error = %e,
                "Closure resolution failed"
            ),
        }
        result
    }

    async fn resolve_delegated(
        &self,
        dataset: &DatasetId,
        seeds: &BTreeSet<VariableId>,
    ) -> Result<Vec<Variable>, ResolveError> {
        let seeds: Vec<VariableId> = seeds.iter().cloned().collect();
        let closure = self
            .store
            .resolve_closure(dataset, &seeds)
            .await
            .map_err(ResolveError::from_store)?;
        Ok(dedup_by_id(closure))
    }

    async fn resolve_frontier(
        &self,
        dataset: &DatasetId,
        seeds: &BTreeSet<VariableId>,
    ) -> Result<Vec<Variable>, ResolveError> {
        let mut expanded: HashSet<VariableId> = seeds.iter().cloned().collect();
        let mut reached: HashSet<VariableId> = HashSet::new();
        let mut closure: Vec<Variable> = Vec::new();
        let mut frontier: Vec<VariableId> = seeds.iter().cloned().collect();
        let mut depth = 0usize;

        while !frontier.is_empty() {
            let required = self
                .store
                .get_requirements(dataset, &frontier)
                .await
                .map_err(ResolveError::from_store)?;

            frontier.clear();
            for variable in required {
                if expanded.insert(variable.id.clone()) {
                    frontier.push(variable.id.clone());
                }
                if reached.insert(variable.id.clone()) {
                    closure.push(variable);
                }
            }
            depth += 1;
        }

        tracing::trace!(dataset_id = %dataset, depth, "Frontier traversal finished");
        Ok(closure)
    }

    /// Get the traversal mode.
    pub fn mode(&self) -> TraversalMode {
        self.mode
    }

    /// Get a reference to the store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

fn dedup_by_id(variables: Vec<Variable>) -> Vec<Variable> {
    let mut seen = HashSet::with_capacity(variables.len());
    variables
        .into_iter()
        .filter(|v| seen.insert(v.id.clone()))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;

    use crate::catalog::Catalog;
    use crate::store::GraphStore;
    use crate::types::{DatasetId, Variable, VariableId};

    /// Wraps a store and counts every query call.
    pub struct CountingStore<S> {
        pub inner: S,
        pub calls: AtomicUsize,
    }

    impl<S> CountingStore<S> {
        pub fn new(inner: S) -> Self {
            Self { inner, calls: AtomicUsize::new(0) }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn tick(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl<S: GraphStore> GraphStore for CountingStore<S> {
        type Error = S::Error;

        async fn load_catalog(&self, catalog: &Catalog) -> Result<(), Self::Error> {
            self.inner.load_catalog(catalog).await
        }

        async fn list_datasets(&self) -> Result<Vec<DatasetId>, Self::Error> {
            self.tick();
            self.inner.list_datasets().await
        }

        async fn get_variables(&self, dataset: &DatasetId, ids: &[VariableId]) -> Result<Vec<Variable>, Self::Error> {
            self.tick();
            self.inner.get_variables(dataset, ids).await
        }

        async fn get_requirements(&self, dataset: &DatasetId, ids: &[VariableId]) -> Result<Vec<Variable>, Self::Error> {
            self.tick();
            self.inner.get_requirements(dataset, ids).await
        }

        async fn resolve_closure(&self, dataset: &DatasetId, seeds: &[VariableId]) -> Result<Vec<Variable>, Self::Error> {
            self.tick();
            self.inner.resolve_closure(dataset, seeds).await
        }
    }
}

//! Graph storage backends.
//!
//! A backend answers one bit-exact question: given seed variables in a
//! dataset, which variables are reachable by one or more "requires" edges.
//! Every backend must produce the same set for the same catalog.

pub mod query;
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;
use async_trait::async_trait;
use crate::catalog::Catalog;
use crate::types::{DatasetId, Variable, VariableId};

/// Trait for graph storage backends.
///
/// Results are deduplicated and deterministically ordered by catalog
/// declaration position. Query methods never write.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync;

    /// Store a validated catalog, replacing any previous one for the dataset.
    ///
    /// Called at startup or on explicit reload, never concurrently with the
    /// resolutions that read the same dataset.
    async fn load_catalog(&self, catalog: &Catalog) -> Result<(), Self::Error>;

    /// Store several catalogs.
    ///
    /// Backends that can commit them as one unit override this; the default
    /// stores them one by one and may stop partway on error.
    async fn load_catalogs(&self, catalogs: &[Arc<Catalog>]) -> Result<(), Self::Error> {
        for catalog in catalogs {
            self.load_catalog(catalog).await?;
        }
        Ok(())
    }

    /// Datasets currently stored (sorted).
    async fn list_datasets(&self) -> Result<Vec<DatasetId>, Self::Error>;

    /// Fetch the variables with the given ids. Unknown ids are skipped.
    async fn get_variables(
        &self,
        dataset: &DatasetId,
        ids: &[VariableId],
    ) -> Result<Vec<Variable>, Self::Error>;

    /// Variables directly required by any of `ids` (one hop).
    async fn get_requirements(
        &self,
        dataset: &DatasetId,
        ids: &[VariableId],
    ) -> Result<Vec<Variable>, Self::Error>;

    /// Variables reachable from any seed by one or more edges.
    ///
    /// Seeds are excluded unless reachable from another seed.
    async fn resolve_closure(
        &self,
        dataset: &DatasetId,
        seeds: &[VariableId],
    ) -> Result<Vec<Variable>, Self::Error>;

    /// Check if the backend is reachable.
    async fn is_healthy(&self) -> bool {
        true
    }
}

pub use memory::{InMemoryError, InMemoryGraphStore};
pub use query::{BoundQuery, ColumnRowMapper, QueryError, QueryParam, QueryTemplate, RowMapper};

#[cfg(feature = "postgres")]
pub use postgres::PostgresGraphStore;

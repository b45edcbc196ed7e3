//! # variable-dependency-kernel
//!
//! Transitive dependency resolution for dataset variable catalogs.
//!
//! The kernel answers one question:
//!
//! > Given the variables a user asked for, which other variables must come
//! > along for the request to be processed correctly?
//!
//! ## Core Contract
//!
//! 1. A catalog per dataset declares variables and directed "requires" edges
//! 2. For a set of requested variables, compute everything reachable along
//!    one or more edges
//! 3. Append what was not already requested, once, in a deterministic order
//!
//! ## Architecture
//!
//! ```text
//! RequestedVariableSet → VariableAugmenter → ClosureResolver → merge::augment → AugmentedVariableSet
//!                                                  ↓
//!                                    GraphStore (Memory or Postgres)
//!                                                  ↓
//!                                               Catalog
//! ```
//!
//! ## Guarantees
//!
//! - Cycles and self-loops terminate; duplicate edges collapse
//! - Empty requests never reach the store
//! - Store failures surface as errors, never as an empty closure
//! - Catalog inconsistencies fail at load time, never mid-request

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod canonical;
pub mod catalog;
pub mod config;
pub mod store;
pub mod resolver;
pub mod merge;
pub mod augmenter;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{
    DatasetId, VariableId, Variable, DependencyEdge, RequirementKind,
    VariableDescriptor, RequestedVariableSet, AugmentedVariableSet,
};
pub use catalog::{Catalog, CatalogDefinition, CatalogIntegrityError, CatalogLoadError, CatalogSet};
pub use config::{LogFormat, ServiceConfig, StoreConfig, StoreKind};
pub use store::{GraphStore, InMemoryGraphStore};
#[cfg(feature = "postgres")]
pub use store::PostgresGraphStore;
pub use resolver::{ClosureResolver, ResolveError, TraversalMode};
pub use augmenter::{AugmentError, InvalidRequestError, UnknownVariablePolicy, VariableAugmenter};
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};

// Service re-exports (when service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceState, CatalogRegistry, CatalogSummary};

/// Schema version for catalog definitions and service payloads.
/// Increment on breaking changes to any serialized type.
pub const VARIABLE_KERNEL_SCHEMA_VERSION: &str = "1.0.0";

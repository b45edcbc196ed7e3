//! Catalog model: one dataset's closed dependency graph.
//!
//! A [`Catalog`] is validated once at construction and immutable afterwards,
//! so it can be shared through `Arc` by any number of concurrent resolutions.
//!
//! ## Integrity
//!
//! Every malformed definition fails at load time with a
//! [`CatalogIntegrityError`]; traversal never discovers a dangling edge.
//!
//! ## Traversal
//!
//! [`Catalog::reachable_from`] is the in-memory reachability primitive:
//! breadth-first over positions with a visited set, so cycles, self-loops
//! and duplicate edges all terminate and collapse naturally.

pub mod definition;

use std::collections::{BTreeSet, HashMap, VecDeque};
use serde::Serialize;

use crate::canonical::canonical_hash_hex;
use crate::types::{DatasetId, DependencyEdge, RequirementKind, Variable, VariableId};

pub use definition::{CatalogDefinition, CatalogLoadError, CatalogSet};

/// A catalog references something it does not define, or defines it twice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogIntegrityError {
    /// Dataset identifier is empty.
    #[error("Catalog has an empty dataset identifier")]
    EmptyDatasetId,
    /// A variable has an empty identifier.
    #[error("Variable at position {position} in dataset {dataset} has an empty identifier")]
    EmptyVariableId {
        /// Dataset being loaded.
        dataset: DatasetId,
        /// Position of the offending variable.
        position: usize,
    },
    /// Two variables share an identifier.
    #[error("Duplicate variable id {variable} in dataset {dataset}")]
    DuplicateVariableId {
        /// Dataset being loaded.
        dataset: DatasetId,
        /// Repeated identifier.
        variable: VariableId,
    },
    /// Two variables share a name.
    #[error("Duplicate variable name {name} in dataset {dataset}")]
    DuplicateVariableName {
        /// Dataset being loaded.
        dataset: DatasetId,
        /// Repeated name.
        name: String,
    },
    /// An edge references a variable the catalog does not define.
    #[error("Edge {edge_index} in dataset {dataset} references undefined variable {variable}")]
    UndefinedVariable {
        /// Dataset being loaded.
        dataset: DatasetId,
        /// Position of the edge in declaration order.
        edge_index: usize,
        /// Missing identifier.
        variable: VariableId,
    },
    /// Two catalogs claim the same dataset identifier.
    #[error("Dataset {dataset} is defined more than once")]
    DuplicateDataset {
        /// Repeated dataset identifier.
        dataset: DatasetId,
    },
}

/// One dataset's variables and "requires" edges.
#[derive(Debug, Clone)]
pub struct Catalog {
    id: DatasetId,
    name: String,
    variables: Vec<Variable>,
    edges: Vec<DependencyEdge>,
    /// Variable id -> position in `variables`.
    index: HashMap<VariableId, usize>,
    /// Position -> positions it directly requires (deduplicated, edge order).
    requires: Vec<Vec<usize>>,
    fingerprint: String,
}

impl Catalog {
    /// Build and validate a catalog.
    pub fn new(
        id: DatasetId,
        name: impl Into<String>,
        variables: Vec<Variable>,
        edges: Vec<DependencyEdge>,
    ) -> Result<Self, CatalogIntegrityError> {
        if id.is_blank() {
            return Err(CatalogIntegrityError::EmptyDatasetId);
        }

        let mut index = HashMap::with_capacity(variables.len());
        let mut names = BTreeSet::new();
        for (position, variable) in variables.iter().enumerate() {
            if variable.id.is_blank() {
                return Err(CatalogIntegrityError::EmptyVariableId { dataset: id, position });
            }
            if index.insert(variable.id.clone(), position).is_some() {
                return Err(CatalogIntegrityError::DuplicateVariableId {
                    dataset: id,
                    variable: variable.id.clone(),
                });
            }
            if !names.insert(variable.name.as_str()) {
                return Err(CatalogIntegrityError::DuplicateVariableName {
                    dataset: id,
                    name: variable.name.clone(),
                });
            }
        }

        let mut requires: Vec<Vec<usize>> = vec![Vec::new(); variables.len()];
        for (edge_index, edge) in edges.iter().enumerate() {
            let lookup = |variable: &VariableId| {
                index.get(variable).copied().ok_or_else(|| CatalogIntegrityError::UndefinedVariable {
                    dataset: id.clone(),
                    edge_index,
                    variable: variable.clone(),
                })
            };
            let origin = lookup(&edge.origin)?;
            let destination = lookup(&edge.destination)?;
            if !requires[origin].contains(&destination) {
                requires[origin].push(destination);
            }
        }

        let self_loops = edges.iter().filter(|e| e.is_self_loop()).count();
        if self_loops > 0 {
            tracing::debug!(dataset_id = %id, self_loops, "Catalog declares self-loops");
        }

        let fingerprint = compute_fingerprint(&id, &variables, &edges);

        Ok(Self {
            id,
            name: name.into(),
            variables,
            edges,
            index,
            requires,
            fingerprint,
        })
    }

    /// Dataset identifier.
    pub fn id(&self) -> &DatasetId {
        &self.id
    }

    /// Dataset display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variables in declaration order.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Edges in declaration order, duplicates included.
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Deterministic fingerprint of the catalog's content.
    ///
    /// Independent of declaration order and of duplicated edges.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Look up a variable by id.
    pub fn variable(&self, id: &VariableId) -> Option<&Variable> {
        self.index.get(id).map(|&p| &self.variables[p])
    }

    /// Declaration position of a variable.
    pub fn position(&self, id: &VariableId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// True if the catalog defines this variable.
    pub fn contains(&self, id: &VariableId) -> bool {
        self.index.contains_key(id)
    }

    /// Variables directly required by `id` (empty if `id` is unknown).
    pub fn requirements_of(&self, id: &VariableId) -> Vec<&Variable> {
        self.index
            .get(id)
            .map(|&p| self.requires[p].iter().map(|&d| &self.variables[d]).collect())
            .unwrap_or_default()
    }

    /// Variables reachable from any seed by one or more edges.
    ///
    /// A seed appears in the result only when another reachable path leads
    /// back to it. Unknown seeds are skipped. The result is ordered by
    /// declaration position.
    pub fn reachable_from<'a, I>(&self, seeds: I) -> Vec<&Variable>
    where
        I: IntoIterator<Item = &'a VariableId>,
    {
        let mut expanded = vec![false; self.variables.len()];
        let mut reached = vec![false; self.variables.len()];
        let mut frontier: VecDeque<usize> = VecDeque::new();

        for seed in seeds {
            if let Some(&p) = self.index.get(seed) {
                if !expanded[p] {
                    expanded[p] = true;
                    frontier.push_back(p);
                }
            }
        }

        while let Some(p) = frontier.pop_front() {
            for &d in &self.requires[p] {
                reached[d] = true;
                if !expanded[d] {
                    expanded[d] = true;
                    frontier.push_back(d);
                }
            }
        }

        reached
            .iter()
            .enumerate()
            .filter_map(|(p, &r)| r.then(|| &self.variables[p]))
            .collect()
    }

    /// Convert back into a serializable definition.
    pub fn to_definition(&self) -> CatalogDefinition {
        CatalogDefinition {
            id: self.id.clone(),
            name: self.name.clone(),
            variables: self.variables.clone(),
            edges: self.edges.clone(),
        }
    }
}

/// Canonical form hashed into the catalog fingerprint.
#[derive(Serialize)]
struct FingerprintInput<'a> {
    dataset: &'a str,
    variables: Vec<(&'a str, &'a str, &'a str)>,
    edges: BTreeSet<(&'a str, &'a str, RequirementKind)>,
}

fn compute_fingerprint(id: &DatasetId, variables: &[Variable], edges: &[DependencyEdge]) -> String {
    let mut sorted: Vec<_> = variables
        .iter()
        .map(|v| (v.id.as_str(), v.name.as_str(), v.data_type.as_str()))
        .collect();
    sorted.sort();

    let input = FingerprintInput {
        dataset: id.as_str(),
        variables: sorted,
        edges: edges
            .iter()
            .map(|e| (e.origin.as_str(), e.destination.as_str(), e.kind))
            .collect(),
    };
    canonical_hash_hex(&input)
}

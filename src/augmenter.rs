//! Request augmentation: validate, resolve per dataset, merge.
//!
//! Either the complete augmented set is produced or an error is returned;
//! the caller's descriptors are never partially extended.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use serde::{Deserialize, Serialize};

use crate::merge;
use crate::resolver::{ClosureResolver, ResolveError, TraversalMode};
use crate::store::GraphStore;
use crate::types::{
    AugmentedVariableSet, DatasetId, RequestedVariableSet, VariableDescriptor, VariableId,
};

/// Handling of requested ids the dataset catalog does not define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownVariablePolicy {
    /// Keep them in the output; they contribute no dependencies.
    #[default]
    Ignore,
    /// Fail the request with [`InvalidRequestError::UnknownVariable`].
    Reject,
}

impl UnknownVariablePolicy {
    /// Parse a policy name.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ignore" | "" => Some(Self::Ignore),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Malformed augmentation input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRequestError {
    /// A descriptor has no usable variable identifier.
    #[error("Requested variable at index {index} has no identifier")]
    MissingVariableId {
        /// Position in the request.
        index: usize,
    },
    /// A descriptor has no usable dataset identifier.
    #[error("Requested variable at index {index} has no dataset identifier")]
    MissingDatasetId {
        /// Position in the request.
        index: usize,
    },
    /// A requested id is not defined by its dataset catalog.
    #[error("Variable {variable} is not defined in dataset {dataset}")]
    UnknownVariable {
        /// Dataset queried.
        dataset: DatasetId,
        /// Undefined identifier.
        variable: VariableId,
    },
}

/// Error type for augmentation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AugmentError {
    /// Input rejected before any resolution.
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] InvalidRequestError),
    /// The backing store could not answer.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<ResolveError> for AugmentError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::StoreUnavailable(msg) => Self::StoreUnavailable(msg),
        }
    }
}

/// Extends requested variable sets with their transitive requirements.
pub struct VariableAugmenter<S: GraphStore> {
    resolver: ClosureResolver<S>,
    store: Arc<S>,
    unknown: UnknownVariablePolicy,
}

impl<S: GraphStore> VariableAugmenter<S> {
    /// Create an augmenter with delegated traversal that ignores unknown ids.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            resolver: ClosureResolver::new(Arc::clone(&store)),
            store,
            unknown: UnknownVariablePolicy::Ignore,
        }
    }

    /// Select the traversal mode.
    pub fn with_mode(mut self, mode: TraversalMode) -> Self {
        self.resolver = ClosureResolver::new(Arc::clone(&self.store)).with_mode(mode);
        self
    }

    /// Select the unknown-variable policy.
    pub fn with_unknown_policy(mut self, policy: UnknownVariablePolicy) -> Self {
        self.unknown = policy;
        self
    }

    /// Get the resolver.
    pub fn resolver(&self) -> &ClosureResolver<S> {
        &self.resolver
    }

    /// Augment a request.
    ///
    /// The output starts with the requested descriptors (first occurrence of
    /// each `(dataset, id)` pair, in request order), followed by every
    /// required variable not already requested. Datasets are processed in
    /// first-seen order.
    pub async fn augment(
        &self,
        request: &RequestedVariableSet,
    ) -> Result<AugmentedVariableSet, AugmentError> {
        validate(request)?;

        let start = Instant::now();
        let mut seen: BTreeSet<(&DatasetId, &VariableId)> = BTreeSet::new();
        let requested: Vec<VariableDescriptor> = request
            .variables
            .iter()
            .filter(|d| d.id().map_or(false, |id| seen.insert((&d.dataset_id, id))))
            .cloned()
            .collect();

        let mut appended = Vec::new();
        for dataset in request.datasets() {
            let seeds = request.ids_for(&dataset);
            if self.unknown == UnknownVariablePolicy::Reject {
                self.check_known(&dataset, &seeds).await?;
            }

            let closure = self.resolver.resolve(&dataset, &seeds).await?;
            appended.extend(
                merge::augment(&seeds, &closure)
                    .iter()
                    .map(|v| VariableDescriptor::from_variable(&dataset, v)),
            );
        }

        let result = AugmentedVariableSet::new(requested, appended);
        tracing::info!(
            requested = result.requested_count(),
            added = result.added_count(),
            datasets = request.datasets().len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Variables augmented"
        );
        Ok(result)
    }

    /// Augment a caller-owned descriptor list in place.
    ///
    /// On error the list is left untouched. Returns how many descriptors
    /// were appended.
    pub async fn augment_in_place(
        &self,
        variables: &mut Vec<VariableDescriptor>,
    ) -> Result<usize, AugmentError> {
        let request = RequestedVariableSet::new(variables.clone());
        let augmented = self.augment(&request).await?;
        let added = augmented.added().to_vec();
        let count = added.len();
        variables.extend(added);
        Ok(count)
    }

    async fn check_known(
        &self,
        dataset: &DatasetId,
        seeds: &BTreeSet<VariableId>,
    ) -> Result<(), AugmentError> {
        let ids: Vec<VariableId> = seeds.iter().cloned().collect();
        let known: BTreeSet<VariableId> = self
            .store
            .get_variables(dataset, &ids)
            .await
            .map_err(|e| AugmentError::from(ResolveError::from_store(e)))?
            .into_iter()
            .map(|v| v.id)
            .collect();

        match seeds.iter().find(|id| !known.contains(*id)) {
            Some(missing) => Err(InvalidRequestError::UnknownVariable {
                dataset: dataset.clone(),
                variable: missing.clone(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

/// Reject malformed descriptors before any store interaction.
fn validate(request: &RequestedVariableSet) -> Result<(), InvalidRequestError> {
    for (index, descriptor) in request.variables.iter().enumerate() {
        if descriptor.dataset_id.is_blank() {
            return Err(InvalidRequestError::MissingDatasetId { index });
        }
        if descriptor.id().is_none() {
            return Err(InvalidRequestError::MissingVariableId { index });
        }
    }
    Ok(())
}

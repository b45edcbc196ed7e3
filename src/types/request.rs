//! Request and result collections exchanged with callers.

use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};

use super::variable::{DatasetId, Variable, VariableId};

/// A dataset-scoped variable descriptor supplied by, or returned to, a caller.
///
/// `variable_id` is optional on the wire so a descriptor missing its
/// identifier can be rejected as an invalid request instead of failing
/// deserialization of the whole body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    /// Dataset the variable belongs to.
    pub dataset_id: DatasetId,
    /// Variable identifier.
    #[serde(default)]
    pub variable_id: Option<VariableId>,
    /// Display name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl VariableDescriptor {
    /// Descriptor for a requested variable.
    pub fn new(dataset_id: impl Into<String>, variable_id: impl Into<String>) -> Self {
        Self {
            dataset_id: DatasetId::new(dataset_id),
            variable_id: Some(VariableId::new(variable_id)),
            name: None,
        }
    }

    /// Descriptor for a resolved catalog variable.
    pub fn from_variable(dataset_id: &DatasetId, variable: &Variable) -> Self {
        Self {
            dataset_id: dataset_id.clone(),
            variable_id: Some(variable.id.clone()),
            name: None,
        }
        .with_name(variable.name.as_str())
    }

    /// Attach a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The identifier, if present and not blank.
    pub fn id(&self) -> Option<&VariableId> {
        self.variable_id.as_ref().filter(|id| !id.is_blank())
    }
}

/// Caller-supplied set of requested variables, possibly spanning datasets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedVariableSet {
    /// Requested descriptors in caller order.
    pub variables: Vec<VariableDescriptor>,
}

impl RequestedVariableSet {
    /// Create a set from descriptors.
    pub fn new(variables: Vec<VariableDescriptor>) -> Self {
        Self { variables }
    }

    /// True if nothing was requested.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Number of requested descriptors.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Datasets referenced by the request, in first-seen order.
    pub fn datasets(&self) -> Vec<DatasetId> {
        let mut seen = BTreeSet::new();
        self.variables
            .iter()
            .filter(|v| seen.insert(v.dataset_id.clone()))
            .map(|v| v.dataset_id.clone())
            .collect()
    }

    /// Identifiers requested within one dataset.
    pub fn ids_for(&self, dataset_id: &DatasetId) -> BTreeSet<VariableId> {
        self.variables
            .iter()
            .filter(|v| &v.dataset_id == dataset_id)
            .filter_map(|v| v.id().cloned())
            .collect()
    }
}

/// Requested descriptors followed by every transitively required variable.
///
/// Only built through [`AugmentedVariableSet::new`], so the requested prefix
/// never exceeds the descriptor list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AugmentedVariableSet {
    variables: Vec<VariableDescriptor>,
    requested_count: usize,
}

impl AugmentedVariableSet {
    /// Build from the original request and the descriptors appended to it.
    pub fn new(requested: Vec<VariableDescriptor>, appended: Vec<VariableDescriptor>) -> Self {
        let requested_count = requested.len();
        let mut variables = requested;
        variables.extend(appended);
        Self { variables, requested_count }
    }

    /// Original descriptors first, then appended ones.
    pub fn variables(&self) -> &[VariableDescriptor] {
        &self.variables
    }

    /// Consume the set, keeping every descriptor.
    pub fn into_variables(self) -> Vec<VariableDescriptor> {
        self.variables
    }

    /// How many leading descriptors came from the request.
    pub fn requested_count(&self) -> usize {
        self.requested_count
    }

    /// Descriptors appended by augmentation.
    pub fn added(&self) -> &[VariableDescriptor] {
        &self.variables[self.requested_count..]
    }

    /// Number of appended descriptors.
    pub fn added_count(&self) -> usize {
        self.variables.len() - self.requested_count
    }

    /// Total number of descriptors.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// True if the set holds no descriptors.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Identifiers present for one dataset.
    pub fn ids_for(&self, dataset_id: &DatasetId) -> BTreeSet<VariableId> {
        self.variables
            .iter()
            .filter(|v| &v.dataset_id == dataset_id)
            .filter_map(|v| v.id().cloned())
            .collect()
    }

    /// Treat the augmented result as a fresh request.
    pub fn into_requested(self) -> RequestedVariableSet {
        RequestedVariableSet::new(self.variables)
    }
}

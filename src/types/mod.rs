//! Core types for the variable dependency kernel.

pub mod variable;
pub mod edge;
pub mod request;

pub use variable::{DatasetId, VariableId, Variable};
pub use edge::{DependencyEdge, RequirementKind};
pub use request::{VariableDescriptor, RequestedVariableSet, AugmentedVariableSet};

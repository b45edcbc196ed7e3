//! Merge policy: which resolved variables get appended to a request.

use std::collections::BTreeSet;

use crate::types::{Variable, VariableId};

/// Variables from `closure` that the request does not already hold.
///
/// Keeps the closure's order and drops repeats within the closure itself,
/// so a variable reachable along several paths is appended once. Pure: the
/// inputs are only read.
pub fn augment(original_ids: &BTreeSet<VariableId>, closure: &[Variable]) -> Vec<Variable> {
    let mut appended_ids: BTreeSet<&VariableId> = BTreeSet::new();
    closure
        .iter()
        .filter(|v| !original_ids.contains(&v.id))
        .filter(|v| appended_ids.insert(&v.id))
        .cloned()
        .collect()
}

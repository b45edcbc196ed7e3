//! Integration tests for request augmentation.
//!
//! Catalogs come from the JSON fixtures in `tests/fixtures/`.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use variable_dependency_kernel::{
    AugmentError, AugmentedVariableSet, CatalogSet, ClosureResolver, DatasetId,
    InMemoryGraphStore, InvalidRequestError, RequestedVariableSet, TraversalMode,
    UnknownVariablePolicy, VariableAugmenter, VariableDescriptor, VariableId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn store() -> Arc<InMemoryGraphStore> {
    let set = CatalogSet::load_path(fixtures()).expect("fixtures load");
    Arc::new(InMemoryGraphStore::from_catalog_set(&set))
}

fn request(dataset: &str, ids: &[&str]) -> RequestedVariableSet {
    RequestedVariableSet::new(ids.iter().map(|id| VariableDescriptor::new(dataset, *id)).collect())
}

fn added_ids(result: &AugmentedVariableSet) -> Vec<&str> {
    result
        .added()
        .iter()
        .filter_map(|d| d.variable_id.as_ref().map(|id| id.as_str()))
        .collect()
}

fn all_ids(result: &AugmentedVariableSet) -> Vec<&str> {
    result
        .variables()
        .iter()
        .filter_map(|d| d.variable_id.as_ref().map(|id| id.as_str()))
        .collect()
}

async fn augment(ids: &[&str]) -> AugmentedVariableSet {
    VariableAugmenter::new(store())
        .augment(&request("products", ids))
        .await
        .unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixture Loading
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_fixture_directory_loads_every_dataset() {
    let set = CatalogSet::load_path(fixtures()).unwrap();
    assert_eq!(set.len(), 3);
    assert!(set.get(&DatasetId::new("products")).is_some());
    assert!(set.get(&DatasetId::new("swath")).is_some());
    assert!(set.get(&DatasetId::new("gridded")).is_some());
}

#[test]
fn test_fixture_fingerprints_are_stable_across_loads() {
    let a = CatalogSet::load_path(fixtures()).unwrap();
    let b = CatalogSet::load_path(fixtures()).unwrap();
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.fingerprint(), y.fingerprint());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Closure Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chain_through_cycle() {
    let result = augment(&["P0"]).await;
    assert_eq!(all_ids(&result), vec!["P0", "P3", "P4", "P5", "P9", "P10", "P11"]);
}

#[tokio::test]
async fn test_requested_variables_appear_once() {
    let result = augment(&["P5", "P10"]).await;
    assert_eq!(added_ids(&result), vec!["P3", "P4", "P9", "P11"]);
    assert_eq!(result.requested_count(), 2);
}

#[tokio::test]
async fn test_cycle_member_is_not_duplicated() {
    let result = augment(&["P3"]).await;
    assert_eq!(all_ids(&result), vec!["P3", "P4"]);
}

#[tokio::test]
async fn test_leaf_adds_nothing() {
    let result = augment(&["P2"]).await;
    assert_eq!(result.added_count(), 0);
    assert_eq!(all_ids(&result), vec!["P2"]);
}

#[tokio::test]
async fn test_unrelated_components_stay_apart() {
    let result = augment(&["P1", "P6"]).await;
    assert_eq!(added_ids(&result), vec!["P2", "P7", "P8"]);
}

#[tokio::test]
async fn test_geophysical_variables_pull_coordinates() {
    let augmenter = VariableAugmenter::new(store());
    let result = augmenter
        .augment(&request(
            "swath",
            &[
                "rainfall_rate",
                "atmosphere_water_vapor_content",
                "atmosphere_cloud_liquid_water_content",
                "latitude",
            ],
        ))
        .await
        .unwrap();

    assert_eq!(added_ids(&result), vec!["longitude", "time"]);
    let names: Vec<_> = result.added().iter().filter_map(|d| d.name.as_deref()).collect();
    assert_eq!(names, vec!["/longitude", "/time"]);
}

#[tokio::test]
async fn test_two_hop_bounds_are_included() {
    let augmenter = VariableAugmenter::new(store());
    let result = augmenter.augment(&request("gridded", &["sst"])).await.unwrap();
    assert_eq!(added_ids(&result), vec!["lat", "lon", "lat_bnds", "lon_bnds"]);
}

#[tokio::test]
async fn test_mixed_datasets_resolve_independently() {
    let augmenter = VariableAugmenter::new(store());
    let request = RequestedVariableSet::new(vec![
        VariableDescriptor::new("gridded", "sst"),
        VariableDescriptor::new("swath", "rainfall_rate"),
        // Same id in another dataset has no meaning here
        VariableDescriptor::new("gridded", "time"),
    ]);
    let result = augmenter.augment(&request).await.unwrap();

    let added: Vec<(&str, &str)> = result
        .added()
        .iter()
        .map(|d| (d.dataset_id.as_str(), d.variable_id.as_ref().unwrap().as_str()))
        .collect();
    assert_eq!(
        added,
        vec![
            ("gridded", "lat"),
            ("gridded", "lon"),
            ("gridded", "lat_bnds"),
            ("gridded", "lon_bnds"),
            ("swath", "latitude"),
            ("swath", "longitude"),
            ("swath", "time"),
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Augmentation Properties
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_augmentation_is_idempotent() {
    let augmenter = VariableAugmenter::new(store());
    let first = augmenter.augment(&request("products", &["P0", "P6"])).await.unwrap();
    let second = augmenter.augment(&first.clone().into_requested()).await.unwrap();

    assert_eq!(second.added_count(), 0);
    assert_eq!(second.variables(), first.variables());
}

#[tokio::test]
async fn test_empty_request_returns_empty() {
    let result = VariableAugmenter::new(store())
        .augment(&RequestedVariableSet::default())
        .await
        .unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_augment_in_place_extends_caller_list() {
    let augmenter = VariableAugmenter::new(store());
    let mut variables = vec![VariableDescriptor::new("products", "P5")];

    let added = augmenter.augment_in_place(&mut variables).await.unwrap();

    assert_eq!(added, 5);
    assert_eq!(variables.len(), 6);
    assert_eq!(variables[0], VariableDescriptor::new("products", "P5"));
}

#[tokio::test]
async fn test_store_failure_leaves_list_untouched() {
    let store = store();
    let augmenter = VariableAugmenter::new(Arc::clone(&store));
    let mut variables = vec![VariableDescriptor::new("products", "P0")];
    store.set_offline(true);

    let err = augmenter.augment_in_place(&mut variables).await.unwrap_err();

    assert!(matches!(err, AugmentError::StoreUnavailable(_)));
    assert_eq!(variables, vec![VariableDescriptor::new("products", "P0")]);
}

#[tokio::test]
async fn test_unknown_variables_follow_policy() {
    let ignore = VariableAugmenter::new(store());
    let result = ignore.augment(&request("products", &["P1", "P99"])).await.unwrap();
    assert_eq!(all_ids(&result), vec!["P1", "P99", "P2"]);

    let reject = VariableAugmenter::new(store()).with_unknown_policy(UnknownVariablePolicy::Reject);
    let err = reject.augment(&request("products", &["P1", "P99"])).await.unwrap_err();
    assert_eq!(
        err,
        AugmentError::InvalidRequest(InvalidRequestError::UnknownVariable {
            dataset: DatasetId::new("products"),
            variable: VariableId::new("P99"),
        })
    );
}

#[tokio::test]
async fn test_traversal_modes_agree_on_fixtures() {
    let store = store();
    let delegated = ClosureResolver::new(Arc::clone(&store));
    let frontier = ClosureResolver::new(Arc::clone(&store)).with_mode(TraversalMode::Frontier);

    for seed in ["P0", "P1", "P3", "P5", "P6", "P9", "P11"] {
        let seeds: BTreeSet<VariableId> = [VariableId::new(seed)].into_iter().collect();
        let dataset = DatasetId::new("products");

        let a: BTreeSet<_> = delegated.resolve(&dataset, &seeds).await.unwrap().into_iter().map(|v| v.id).collect();
        let b: BTreeSet<_> = frontier.resolve(&dataset, &seeds).await.unwrap().into_iter().map(|v| v.id).collect();
        assert_eq!(a, b, "modes disagree for seed {seed}");
    }
}

//! # Population Loader Integration Tests

use std::sync::Arc;

use marker_sweep::config::PopulationConfig;
use marker_sweep::population::PopulationLoader;
use marker_sweep::store::InMemoryRecordStore;

#[tokio::test]
async fn test_load_writes_groups_with_trailing_partial_group() {
    let store = InMemoryRecordStore::new();
    let loader = PopulationLoader::new(Arc::new(store.clone()), 100, "USER-", "SYSTEM").unwrap();

    let summary = loader.load(250).await.unwrap();

    assert_eq!(summary.records_inserted, 250);
    assert_eq!(summary.groups_committed, 3);
    assert_eq!(store.committed_write_sizes(), vec![100, 100, 50]);
}

#[tokio::test]
async fn test_loaded_records_are_sequential_and_unmarked() {
    let store = InMemoryRecordStore::new();
    let loader = PopulationLoader::new(Arc::new(store.clone()), 4, "USER-", "loader").unwrap();

    loader.load(10).await.unwrap();

    let records = store.records();
    let labels: Vec<&str> = records.iter().map(|r| r.label.as_str()).collect();
    let expected: Vec<String> = (0..10).map(|i| format!("USER-{i}")).collect();

    assert_eq!(labels, expected.iter().map(String::as_str).collect::<Vec<_>>());
    assert!(records.iter().all(|r| r.is_eligible()));
    assert!(records.iter().all(|r| r.created_by == "loader"));
    assert!(records.iter().all(|r| r.last_modified_by == "loader"));
}

#[tokio::test]
async fn test_failed_group_stops_load_and_keeps_earlier_groups() {
    let store = InMemoryRecordStore::new();
    store.fail_commit_attempt(2);
    let loader = PopulationLoader::new(Arc::new(store.clone()), 100, "USER-", "SYSTEM").unwrap();

    let err = loader.load(300).await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(store.records().len(), 100);
    assert_eq!(store.committed_write_count(), 1);
}

#[tokio::test]
async fn test_loader_from_config() {
    let store = InMemoryRecordStore::new();
    let config = PopulationConfig {
        enabled_on_startup: true,
        record_count: 12,
        batch_size: 5,
        label_prefix: "ACCT-".to_string(),
        actor: "SYSTEM".to_string(),
    };
    let loader = PopulationLoader::from_config(Arc::new(store.clone()), &config).unwrap();

    loader.load(config.record_count).await.unwrap();

    assert_eq!(store.committed_write_sizes(), vec![5, 5, 2]);
    assert_eq!(store.records()[0].label, "ACCT-0");
}

//! # System Bootstrap Tests

mod common;

use common::*;
use std::sync::Arc;

use marker_sweep::bootstrap::SweepSystem;
use marker_sweep::config::{ConfigManager, SweepConfig};
use marker_sweep::store::InMemoryRecordStore;

fn test_config(populate: bool) -> SweepConfig {
    let mut config = SweepConfig::default();
    config.population.enabled_on_startup = populate;
    config.population.record_count = 120;
    config.population.batch_size = 50;
    config.processor.batch_size = 40;
    config.processor.fetch_size = 15;
    config.worker.shutdown_timeout_seconds = 5;
    config
}

#[tokio::test]
async fn test_bootstrap_populates_then_serves_runs() {
    let store = InMemoryRecordStore::new();
    let manager = ConfigManager::from_config(test_config(true), "test").unwrap();

    let system = SweepSystem::bootstrap_with_store(manager, Arc::new(store.clone()))
        .await
        .unwrap();

    let population = system.population().expect("population ran");
    assert_eq!(population.records_inserted, 120);
    assert_eq!(population.groups_committed, 3);
    assert_eq!(eligible_count(&store), 120);
    assert_eq!(system.processor().settings().batch_size(), 40);

    let handle = system.worker();
    handle.trigger().unwrap();
    wait_for_status(&handle, |s| s.runs_completed == 1).await;

    assert_eq!(eligible_count(&store), 0);
    system.shutdown().await.unwrap();
    assert!(handle.is_closed());
}

#[tokio::test]
async fn test_bootstrap_without_population() {
    let store = InMemoryRecordStore::new();
    let manager = ConfigManager::from_config(test_config(false), "test").unwrap();

    let system = SweepSystem::bootstrap_with_store(manager, Arc::new(store.clone()))
        .await
        .unwrap();

    assert!(system.population().is_none());
    assert!(store.records().is_empty());
    assert_eq!(system.config_manager().environment(), "test");

    system.shutdown().await.unwrap();
}

#[test]
fn test_invalid_chunk_size_fails_before_startup() {
    let mut config = test_config(false);
    config.processor.batch_size = 0;

    assert!(ConfigManager::from_config(config, "test").is_err());
}

//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use marker_sweep::error::SweepResult;
use marker_sweep::models::{NewRecord, Record};
use marker_sweep::processor::{CancellationFlag, ChunkedUpdateProcessor, ProcessorSettings};
use marker_sweep::store::{
    InMemoryRecordStore, RecordStore, ScanPredicate, ScanSession, WriteTransaction,
};
use marker_sweep::worker::{UpdateWorkerHandle, WorkerStatus};

pub fn seeded_store(count: usize) -> InMemoryRecordStore {
    let store = InMemoryRecordStore::new();
    store.seed(count, "USER-");
    store
}

pub fn processor_for(
    store: Arc<dyn RecordStore>,
    batch_size: usize,
    fetch_size: usize,
) -> ChunkedUpdateProcessor {
    let settings = ProcessorSettings::new(batch_size, fetch_size, "SYSTEM")
        .expect("valid processor settings");
    ChunkedUpdateProcessor::new(store, settings)
}

pub fn eligible_count(store: &InMemoryRecordStore) -> usize {
    store.records().iter().filter(|r| r.is_eligible()).count()
}

/// Poll the worker status until `done` holds, failing after five seconds
pub async fn wait_for_status<F>(handle: &UpdateWorkerHandle, done: F) -> WorkerStatus
where
    F: Fn(&WorkerStatus) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let status = handle.status();
        if done(&status) {
            return status;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "worker status never reached the expected state: {status:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Store wrapper that raises a cancellation flag once a given number of
/// write transactions have committed
#[derive(Debug, Clone)]
pub struct CancelAfterCommits {
    inner: InMemoryRecordStore,
    cancel: CancellationFlag,
    commits: Arc<AtomicUsize>,
    cancel_after: usize,
}

impl CancelAfterCommits {
    pub fn new(inner: InMemoryRecordStore, cancel: CancellationFlag, cancel_after: usize) -> Self {
        Self {
            inner,
            cancel,
            commits: Arc::new(AtomicUsize::new(0)),
            cancel_after,
        }
    }
}

#[async_trait]
impl RecordStore for CancelAfterCommits {
    async fn open_scan(
        &self,
        predicate: ScanPredicate,
        fetch_size: usize,
    ) -> SweepResult<Box<dyn ScanSession>> {
        self.inner.open_scan(predicate, fetch_size).await
    }

    async fn begin_write(&self) -> SweepResult<Box<dyn WriteTransaction>> {
        Ok(Box::new(CancellingTransaction {
            inner: self.inner.begin_write().await?,
            store: self.clone(),
        }))
    }

    async fn count_matching(&self, predicate: ScanPredicate) -> SweepResult<u64> {
        self.inner.count_matching(predicate).await
    }

    async fn health_check(&self) -> SweepResult<()> {
        self.inner.health_check().await
    }

    fn name(&self) -> &'static str {
        "cancel-after-commits"
    }
}

struct CancellingTransaction {
    inner: Box<dyn WriteTransaction>,
    store: CancelAfterCommits,
}

#[async_trait]
impl WriteTransaction for CancellingTransaction {
    async fn insert_records(&mut self, records: &[NewRecord], actor: &str) -> SweepResult<u64> {
        self.inner.insert_records(records, actor).await
    }

    async fn update_markers(&mut self, records: &[Record], actor: &str) -> SweepResult<u64> {
        self.inner.update_markers(records, actor).await
    }

    async fn commit(self: Box<Self>) -> SweepResult<()> {
        let CancellingTransaction { inner, store } = *self;
        inner.commit().await?;
        if store.commits.fetch_add(1, Ordering::SeqCst) + 1 >= store.cancel_after {
            store.cancel.cancel();
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> SweepResult<()> {
        self.inner.rollback().await
    }
}

//! In-process record store.
//!
//! Behaves like the PostgreSQL store at the trait boundary: scans are paged
//! in id order and re-evaluate the predicate at fetch time, writes are staged
//! and applied atomically on commit, and markers are unique. It also counts
//! committed write transactions and can inject scan or commit failures.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::{RecordStore, ScanPredicate, ScanSession, WriteTransaction};
use crate::error::{SweepError, SweepResult};
use crate::models::{NewRecord, Record};

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<i64, Record>,
    markers: HashSet<String>,
    next_id: i64,
    committed_write_sizes: Vec<usize>,
    commit_attempts: usize,
    fail_commit_attempt: Option<usize>,
    fail_scan_after_pages: Option<usize>,
    open_scans: usize,
    largest_page: usize,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `count` unmarked records directly, bypassing write accounting
    pub fn seed(&self, count: usize, label_prefix: &str) {
        let mut state = self.state.lock();
        for index in 0..count {
            state.insert(&NewRecord::sequential(label_prefix, index), "SEED");
        }
    }

    /// Snapshot of every record in id order
    pub fn records(&self) -> Vec<Record> {
        self.state.lock().records.values().cloned().collect()
    }

    /// Size of every committed write transaction, in commit order
    pub fn committed_write_sizes(&self) -> Vec<usize> {
        self.state.lock().committed_write_sizes.clone()
    }

    pub fn committed_write_count(&self) -> usize {
        self.state.lock().committed_write_sizes.len()
    }

    /// Scan sessions opened and not yet closed
    pub fn open_scan_count(&self) -> usize {
        self.state.lock().open_scans
    }

    /// Largest page any scan session has returned
    pub fn largest_page(&self) -> usize {
        self.state.lock().largest_page
    }

    /// Make the `attempt`-th commit (1-based, counted across all transactions) fail
    pub fn fail_commit_attempt(&self, attempt: usize) {
        self.state.lock().fail_commit_attempt = Some(attempt);
    }

    /// Make scans fail once they have served `pages` pages
    pub fn fail_scan_after_pages(&self, pages: usize) {
        self.state.lock().fail_scan_after_pages = Some(pages);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.fail_commit_attempt = None;
        state.fail_scan_after_pages = None;
    }
}

impl MemoryState {
    fn insert(&mut self, new_record: &NewRecord, actor: &str) -> i64 {
        self.next_id += 1;
        let now = Utc::now();
        let record = Record {
            id: self.next_id,
            label: new_record.label.clone(),
            marker: None,
            created_at: now,
            created_by: actor.to_string(),
            last_modified_at: now,
            last_modified_by: actor.to_string(),
        };
        self.records.insert(record.id, record);
        self.next_id
    }

    /// Validate a staged marker update against the current state
    fn check_marker_updates(&self, updates: &[MarkerUpdate]) -> SweepResult<()> {
        let mut staged = HashSet::with_capacity(updates.len());
        for update in updates {
            let current = self.records.get(&update.id).ok_or_else(|| {
                SweepError::integrity("commit", format!("record {} does not exist", update.id))
            })?;
            if current.marker.is_some() {
                return Err(SweepError::integrity(
                    "commit",
                    format!("record {} is no longer eligible", update.id),
                ));
            }
            if self.markers.contains(&update.marker) || !staged.insert(update.marker.as_str()) {
                return Err(SweepError::integrity(
                    "commit",
                    format!("duplicate marker {}", update.marker),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn open_scan(
        &self,
        predicate: ScanPredicate,
        fetch_size: usize,
    ) -> SweepResult<Box<dyn ScanSession>> {
        self.state.lock().open_scans += 1;
        Ok(Box::new(MemoryScanSession {
            state: Arc::clone(&self.state),
            predicate,
            fetch_size,
            after_id: 0,
            pages_served: 0,
            open: true,
        }))
    }

    async fn begin_write(&self) -> SweepResult<Box<dyn WriteTransaction>> {
        Ok(Box::new(MemoryWriteTransaction {
            state: Arc::clone(&self.state),
            staged: Vec::new(),
        }))
    }

    async fn count_matching(&self, predicate: ScanPredicate) -> SweepResult<u64> {
        let state = self.state.lock();
        Ok(state.records.values().filter(|r| predicate.matches(r)).count() as u64)
    }

    async fn health_check(&self) -> SweepResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryScanSession {
    state: Arc<Mutex<MemoryState>>,
    predicate: ScanPredicate,
    fetch_size: usize,
    after_id: i64,
    pages_served: usize,
    open: bool,
}

impl MemoryScanSession {
    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.state.lock().open_scans -= 1;
        }
    }
}

#[async_trait]
impl ScanSession for MemoryScanSession {
    async fn next_page(&mut self) -> SweepResult<Vec<Record>> {
        if !self.open {
            return Ok(Vec::new());
        }

        let mut state = self.state.lock();
        if state
            .fail_scan_after_pages
            .is_some_and(|limit| self.pages_served >= limit)
        {
            return Err(SweepError::transient("fetch page", "connection reset by peer"));
        }

        let page: Vec<Record> = state
            .records
            .range(self.after_id + 1..)
            .map(|(_, record)| record)
            .filter(|record| self.predicate.matches(record))
            .take(self.fetch_size)
            .cloned()
            .collect();

        if let Some(last) = page.last() {
            self.after_id = last.id;
        }
        self.pages_served += 1;
        state.largest_page = state.largest_page.max(page.len());

        Ok(page)
    }

    async fn close(mut self: Box<Self>) -> SweepResult<()> {
        self.release();
        Ok(())
    }
}

impl Drop for MemoryScanSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Clone)]
struct MarkerUpdate {
    id: i64,
    marker: String,
}

#[derive(Debug)]
enum StagedWrite {
    Insert {
        records: Vec<NewRecord>,
        actor: String,
    },
    UpdateMarkers {
        updates: Vec<MarkerUpdate>,
        actor: String,
    },
}

impl StagedWrite {
    fn len(&self) -> usize {
        match self {
            StagedWrite::Insert { records, .. } => records.len(),
            StagedWrite::UpdateMarkers { updates, .. } => updates.len(),
        }
    }
}

struct MemoryWriteTransaction {
    state: Arc<Mutex<MemoryState>>,
    staged: Vec<StagedWrite>,
}

#[async_trait]
impl WriteTransaction for MemoryWriteTransaction {
    async fn insert_records(&mut self, records: &[NewRecord], actor: &str) -> SweepResult<u64> {
        self.staged.push(StagedWrite::Insert {
            records: records.to_vec(),
            actor: actor.to_string(),
        });
        Ok(records.len() as u64)
    }

    async fn update_markers(&mut self, records: &[Record], actor: &str) -> SweepResult<u64> {
        let updates = records
            .iter()
            .map(|record| {
                record
                    .marker
                    .clone()
                    .map(|marker| MarkerUpdate {
                        id: record.id,
                        marker,
                    })
                    .ok_or_else(|| {
                        SweepError::integrity(
                            "update markers",
                            format!("record {} has no marker assigned", record.id),
                        )
                    })
            })
            .collect::<SweepResult<Vec<_>>>()?;

        self.state.lock().check_marker_updates(&updates)?;

        self.staged.push(StagedWrite::UpdateMarkers {
            updates,
            actor: actor.to_string(),
        });
        Ok(records.len() as u64)
    }

    async fn commit(self: Box<Self>) -> SweepResult<()> {
        let MemoryWriteTransaction { state, staged } = *self;
        let mut state = state.lock();
        state.commit_attempts += 1;
        if state.fail_commit_attempt == Some(state.commit_attempts) {
            return Err(SweepError::transient("commit", "connection reset by peer"));
        }

        for write in &staged {
            if let StagedWrite::UpdateMarkers { updates, .. } = write {
                state.check_marker_updates(updates)?;
            }
        }

        let mut size = 0;
        for write in staged {
            size += write.len();
            match write {
                StagedWrite::Insert { records, actor } => {
                    for record in &records {
                        state.insert(record, &actor);
                    }
                }
                StagedWrite::UpdateMarkers { updates, actor } => {
                    let now = Utc::now();
                    for update in updates {
                        state.markers.insert(update.marker.clone());
                        if let Some(record) = state.records.get_mut(&update.id) {
                            record.marker = Some(update.marker);
                            record.last_modified_at = now;
                            record.last_modified_by = actor.clone();
                        }
                    }
                }
            }
        }

        state.committed_write_sizes.push(size);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> SweepResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_pages_respect_fetch_size() {
        let store = InMemoryRecordStore::new();
        store.seed(25, "USER-");

        let mut scan = store.open_scan(ScanPredicate::Unmarked, 10).await.unwrap();
        let mut sizes = Vec::new();
        loop {
            let page = scan.next_page().await.unwrap();
            if page.is_empty() {
                break;
            }
            sizes.push(page.len());
        }
        scan.close().await.unwrap();

        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(store.largest_page(), 10);
        assert_eq!(store.open_scan_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_scan_is_released() {
        let store = InMemoryRecordStore::new();
        store.seed(3, "USER-");

        {
            let _scan = store.open_scan(ScanPredicate::Unmarked, 2).await.unwrap();
            assert_eq!(store.open_scan_count(), 1);
        }

        assert_eq!(store.open_scan_count(), 0);
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = InMemoryRecordStore::new();
        store.seed(2, "USER-");

        let mut records = store.records();
        records[0].marker = Some("a".to_string());

        let mut tx = store.begin_write().await.unwrap();
        tx.update_markers(&records[..1], "SYSTEM").await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.records().iter().all(Record::is_eligible));
        assert_eq!(store.committed_write_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_commit_failure() {
        let store = InMemoryRecordStore::new();
        store.fail_commit_attempt(1);

        let mut tx = store.begin_write().await.unwrap();
        tx.insert_records(&[NewRecord::new("USER-0")], "SYSTEM")
            .await
            .unwrap();

        let err = tx.commit().await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_marked_record_cannot_be_marked_twice() {
        let store = InMemoryRecordStore::new();
        store.seed(1, "USER-");

        let mut first = store.records();
        first[0].marker = Some("first".to_string());
        let mut tx = store.begin_write().await.unwrap();
        tx.update_markers(&first, "SYSTEM").await.unwrap();
        tx.commit().await.unwrap();

        let mut second = first.clone();
        second[0].marker = Some("second".to_string());
        let mut tx = store.begin_write().await.unwrap();
        let err = tx.update_markers(&second, "SYSTEM").await.unwrap_err();

        assert!(matches!(err, SweepError::DataIntegrity { .. }));
        assert_eq!(store.records()[0].marker.as_deref(), Some("first"));
    }
}

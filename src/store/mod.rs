//! # Store Gateway
//!
//! The engine talks to persistence through three seams:
//!
//! - [`RecordStore`] opens sessions and reports store health
//! - [`ScanSession`] is a forward-only, paged, read-only scan over records
//!   matching a [`ScanPredicate`]
//! - [`WriteTransaction`] is an independent write transaction, opened fresh for
//!   every chunk or population group, committed or rolled back as a whole
//!
//! A scan session and a write transaction never share a connection, so a chunk
//! commit cannot block on (or be blocked by) the open scan.
//!
//! Implementations:
//! - [`postgres::PgRecordStore`] - PostgreSQL server-side cursor plus a
//!   dedicated write pool
//! - [`memory::InMemoryRecordStore`] - ordered in-process map with fault
//!   injection, used by tests and benches

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::fmt;

use crate::error::SweepResult;
use crate::models::{NewRecord, Record};

pub use memory::InMemoryRecordStore;
pub use postgres::PgRecordStore;

/// Selects the records a scan session yields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanPredicate {
    /// Records whose marker is still null
    #[default]
    Unmarked,
}

impl ScanPredicate {
    pub fn sql_condition(&self) -> &'static str {
        match self {
            ScanPredicate::Unmarked => "marker IS NULL",
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            ScanPredicate::Unmarked => record.marker.is_none(),
        }
    }
}

impl fmt::Display for ScanPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_condition())
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// Open a read-only scan yielding at most `fetch_size` records per page
    async fn open_scan(
        &self,
        predicate: ScanPredicate,
        fetch_size: usize,
    ) -> SweepResult<Box<dyn ScanSession>>;

    /// Begin a new write transaction, independent of any open scan
    async fn begin_write(&self) -> SweepResult<Box<dyn WriteTransaction>>;

    async fn count_matching(&self, predicate: ScanPredicate) -> SweepResult<u64>;

    async fn health_check(&self) -> SweepResult<()>;

    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait ScanSession: Send {
    /// Next page in store order; an empty page means the scan is exhausted
    async fn next_page(&mut self) -> SweepResult<Vec<Record>>;

    /// Release the cursor and its read transaction
    async fn close(self: Box<Self>) -> SweepResult<()>;
}

#[async_trait]
pub trait WriteTransaction: Send {
    /// Insert new records stamped with `actor`; returns the number inserted
    async fn insert_records(&mut self, records: &[NewRecord], actor: &str) -> SweepResult<u64>;

    /// Persist the markers carried by `records`, stamping `actor`
    ///
    /// Every record must carry a marker and must still be unmarked in the
    /// store; anything else is a data integrity failure.
    async fn update_markers(&mut self, records: &[Record], actor: &str) -> SweepResult<u64>;

    async fn commit(self: Box<Self>) -> SweepResult<()>;

    async fn rollback(self: Box<Self>) -> SweepResult<()>;
}

/// A finite set of changes written atomically by [`bulk_write`]
#[derive(Debug, Clone, Copy)]
pub enum BulkWrite<'a> {
    Insert(&'a [NewRecord]),
    UpdateMarkers(&'a [Record]),
}

impl BulkWrite<'_> {
    pub fn len(&self) -> usize {
        match self {
            BulkWrite::Insert(records) => records.len(),
            BulkWrite::UpdateMarkers(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Apply `write` inside one fresh transaction: all of it commits or none of it does
pub async fn bulk_write(
    store: &dyn RecordStore,
    write: BulkWrite<'_>,
    actor: &str,
) -> SweepResult<u64> {
    let tx = store.begin_write().await?;
    apply_in_transaction(tx, write, actor).await
}

/// Apply `write` inside the supplied transaction and commit it
///
/// On failure the transaction is rolled back and the original error returned.
pub async fn apply_in_transaction(
    mut tx: Box<dyn WriteTransaction>,
    write: BulkWrite<'_>,
    actor: &str,
) -> SweepResult<u64> {
    let applied = match write {
        BulkWrite::Insert(records) => tx.insert_records(records, actor).await,
        BulkWrite::UpdateMarkers(records) => tx.update_markers(records, actor).await,
    };

    match applied {
        Ok(count) => {
            tx.commit().await?;
            Ok(count)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(
                    error = %rollback_err,
                    "Rollback after failed bulk write also failed"
                );
            }
            Err(err)
        }
    }
}

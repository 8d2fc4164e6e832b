//! # Chunked Update Processor
//!
//! Streams every eligible record through one read-only scan session, assigns
//! each a fresh marker, and commits the marked records in chunks of
//! `batch_size`, each in its own write transaction.
//!
//! ## Resource bounds
//!
//! - Memory: at most one chunk plus the unconsumed rest of one cursor page is
//!   held at any time, so `peak_buffered <= batch_size + fetch_size`.
//! - Transactions: `ceil(M / batch_size)` writes for `M` eligible records when
//!   the trailing chunk is flushed, `floor(M / batch_size)` when it is not.
//!
//! ## Failure model
//!
//! A failed chunk write is rolled back and ends the run with an error; chunks
//! committed before it stay committed. A failed page fetch ends the run the
//! same way. Nothing is retried here.
//!
//! ## Cancellation
//!
//! The [`CancellationFlag`] is checked before every chunk write. A cancelled run
//! discards its buffered chunk (those records stay eligible) and returns
//! [`RunStatus::Cancelled`].

pub mod chunk;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ProcessorConfig;
use crate::error::{SweepError, SweepResult};
use crate::logging::{log_chunk_operation, log_run_outcome};
use crate::models::{MarkerToken, Record};
use crate::store::{apply_in_transaction, BulkWrite, RecordStore, ScanPredicate, ScanSession, WriteTransaction};

pub use chunk::ChunkBuffer;

/// Shared stop signal, checked by a run at chunk boundaries
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Validated processor settings
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    batch_size: usize,
    fetch_size: usize,
    actor: String,
    flush_trailing_chunk: bool,
}

impl ProcessorSettings {
    pub fn new(batch_size: usize, fetch_size: usize, actor: impl Into<String>) -> SweepResult<Self> {
        let actor = actor.into();
        if batch_size == 0 {
            return Err(SweepError::configuration("chunk size must be greater than zero"));
        }
        if fetch_size == 0 {
            return Err(SweepError::configuration("fetch size must be greater than zero"));
        }
        if actor.trim().is_empty() {
            return Err(SweepError::configuration("audit actor must not be blank"));
        }

        Ok(Self {
            batch_size,
            fetch_size,
            actor,
            flush_trailing_chunk: true,
        })
    }

    pub fn from_config(config: &ProcessorConfig) -> SweepResult<Self> {
        Ok(Self::new(config.batch_size, config.fetch_size, config.actor.clone())?
            .with_trailing_flush(config.flush_trailing_chunk))
    }

    pub fn with_trailing_flush(mut self, flush: bool) -> Self {
        self.flush_trailing_chunk = flush;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn flush_trailing_chunk(&self) -> bool {
        self.flush_trailing_chunk
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// What a finished run did
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub pages_fetched: u64,
    pub records_visited: u64,
    pub records_committed: u64,
    pub chunks_committed: u64,
    /// Marked in memory but never written (cancelled run or unflushed trailing chunk)
    pub records_discarded: u64,
    /// Largest number of records held client-side at once
    pub peak_buffered: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

#[derive(Debug)]
struct RunProgress {
    run_id: Uuid,
    pages_fetched: u64,
    records_visited: u64,
    records_committed: u64,
    chunks_committed: u64,
    records_discarded: u64,
    peak_buffered: usize,
}

impl RunProgress {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            pages_fetched: 0,
            records_visited: 0,
            records_committed: 0,
            chunks_committed: 0,
            records_discarded: 0,
            peak_buffered: 0,
        }
    }

    fn observe_buffered(&mut self, buffered: usize) {
        self.peak_buffered = self.peak_buffered.max(buffered);
    }
}

/// Write one chunk inside `tx`, a transaction opened for this chunk alone
///
/// Commits on success; rolls back and returns the error otherwise.
pub async fn write_chunk(
    tx: Box<dyn WriteTransaction>,
    records: &[Record],
    actor: &str,
) -> SweepResult<u64> {
    apply_in_transaction(tx, BulkWrite::UpdateMarkers(records), actor).await
}

#[derive(Debug, Clone)]
pub struct ChunkedUpdateProcessor {
    store: Arc<dyn RecordStore>,
    settings: ProcessorSettings,
}

impl ChunkedUpdateProcessor {
    pub fn new(store: Arc<dyn RecordStore>, settings: ProcessorSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Records the next run would visit if started now
    pub async fn pending_count(&self) -> SweepResult<u64> {
        self.store.count_matching(ScanPredicate::Unmarked).await
    }

    /// Mark every currently eligible record, committing chunk by chunk
    pub async fn run(&self, run_id: Uuid, cancel: &CancellationFlag) -> SweepResult<RunSummary> {
        let started_at = Utc::now();
        let started = Instant::now();
        let mut progress = RunProgress::new(run_id);

        info!(
            run_id = %run_id,
            store = self.store.name(),
            batch_size = self.settings.batch_size,
            fetch_size = self.settings.fetch_size,
            "Starting chunked update run"
        );

        let mut scan = self
            .store
            .open_scan(ScanPredicate::Unmarked, self.settings.fetch_size)
            .await?;

        let outcome = self.drive(scan.as_mut(), &mut progress, cancel).await;
        match outcome {
            Ok(status) => {
                scan.close().await?;

                let summary = RunSummary {
                    run_id,
                    status,
                    pages_fetched: progress.pages_fetched,
                    records_visited: progress.records_visited,
                    records_committed: progress.records_committed,
                    chunks_committed: progress.chunks_committed,
                    records_discarded: progress.records_discarded,
                    peak_buffered: progress.peak_buffered,
                    started_at,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
                log_run_outcome(
                    run_id,
                    status.as_str(),
                    summary.records_committed,
                    summary.chunks_committed,
                    None,
                );
                Ok(summary)
            }
            Err(err) => {
                if let Err(close_err) = scan.close().await {
                    warn!(run_id = %run_id, error = %close_err, "Failed to close scan after run error");
                }
                log_run_outcome(
                    run_id,
                    "failed",
                    progress.records_committed,
                    progress.chunks_committed,
                    Some(&err.to_string()),
                );
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        scan: &mut dyn ScanSession,
        progress: &mut RunProgress,
        cancel: &CancellationFlag,
    ) -> SweepResult<RunStatus> {
        let mut chunk = ChunkBuffer::new(self.settings.batch_size);

        loop {
            let mut page = scan.next_page().await?;
            if page.is_empty() {
                break;
            }
            progress.pages_fetched += 1;

            let mut unconsumed = page.len();
            progress.observe_buffered(chunk.len() + unconsumed);

            for mut record in page.drain(..) {
                unconsumed -= 1;
                record.assign_marker(MarkerToken::generate());
                progress.records_visited += 1;
                debug!(run_id = %progress.run_id, record_id = record.id, "Assigned marker");

                let full = chunk.push(record);
                progress.observe_buffered(chunk.len() + unconsumed);

                if full && !self.flush(&mut chunk, progress, cancel).await? {
                    progress.records_discarded += unconsumed as u64;
                    return Ok(RunStatus::Cancelled);
                }
            }
        }

        if !chunk.is_empty() {
            if self.settings.flush_trailing_chunk {
                if !self.flush(&mut chunk, progress, cancel).await? {
                    return Ok(RunStatus::Cancelled);
                }
            } else {
                let dropped = chunk.take().len();
                progress.records_discarded += dropped as u64;
                info!(
                    run_id = %progress.run_id,
                    dropped = dropped,
                    "Trailing partial chunk not flushed"
                );
            }
        }

        Ok(RunStatus::Completed)
    }

    /// Write the buffered chunk; returns `false` without writing when cancelled
    async fn flush(
        &self,
        chunk: &mut ChunkBuffer,
        progress: &mut RunProgress,
        cancel: &CancellationFlag,
    ) -> SweepResult<bool> {
        if cancel.is_cancelled() {
            let discarded = chunk.take().len();
            progress.records_discarded += discarded as u64;
            info!(
                run_id = %progress.run_id,
                discarded = discarded,
                chunks_committed = progress.chunks_committed,
                "Run cancelled at chunk boundary"
            );
            return Ok(false);
        }

        let records = chunk.take();
        let chunk_index = progress.chunks_committed as usize;
        let chunk_started = Instant::now();

        let tx = self.store.begin_write().await?;
        match write_chunk(tx, &records, &self.settings.actor).await {
            Ok(written) => {
                progress.chunks_committed += 1;
                progress.records_committed += written;
                log_chunk_operation(
                    progress.run_id,
                    chunk_index,
                    records.len(),
                    "committed",
                    chunk_started.elapsed(),
                    None,
                );
                Ok(true)
            }
            Err(err) => {
                log_chunk_operation(
                    progress.run_id,
                    chunk_index,
                    records.len(),
                    "failed",
                    chunk_started.elapsed(),
                    Some(&err.to_string()),
                );
                Err(err)
            }
        }
    }
}

//! # Background Update Worker
//!
//! Fire-and-forget execution of processor runs.
//!
//! ```text
//! trigger() ──→ mpsc::Sender<WorkerCommand> ──→ worker task ──→ ChunkedUpdateProcessor::run
//!    │                                              │
//!    └── returns TriggerReceipt immediately         └── outcome recorded in WorkerStatus + logs
//! ```
//!
//! The worker task is the only consumer of its command channel, so runs never
//! overlap. At most one run waits behind the active one: triggers arriving
//! while a run is already queued are coalesced into it, since a queued run
//! will visit every record that is eligible when it starts anyway.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{SweepError, SweepResult};
use crate::processor::{CancellationFlag, ChunkedUpdateProcessor, RunStatus, RunSummary};

/// Commands accepted by the worker task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    RunUpdate { run_id: Uuid },
    Shutdown,
}

/// Acknowledgement returned to the trigger caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TriggerReceipt {
    pub run_id: Uuid,
    /// The request joined a run that was already queued
    pub coalesced: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStatus {
    pub active_run: Option<Uuid>,
    pub pending_run: Option<Uuid>,
    pub runs_completed: u64,
    pub runs_cancelled: u64,
    pub runs_failed: u64,
    pub last_summary: Option<RunSummary>,
    pub last_error: Option<String>,
}

impl WorkerStatus {
    pub fn is_running(&self) -> bool {
        self.active_run.is_some()
    }
}

/// Cloneable handle used by request paths to trigger runs
#[derive(Debug, Clone)]
pub struct UpdateWorkerHandle {
    sender: mpsc::Sender<WorkerCommand>,
    status: Arc<Mutex<WorkerStatus>>,
}

impl UpdateWorkerHandle {
    /// Schedule a run and return without waiting for it
    pub fn trigger(&self) -> SweepResult<TriggerReceipt> {
        if self.sender.is_closed() {
            return Err(SweepError::WorkerUnavailable(
                "worker has shut down".to_string(),
            ));
        }

        let mut status = self.status.lock();

        if let Some(run_id) = status.pending_run {
            debug!(run_id = %run_id, "Coalescing trigger into queued run");
            return Ok(TriggerReceipt {
                run_id,
                coalesced: true,
            });
        }

        let run_id = Uuid::new_v4();
        self.sender
            .try_send(WorkerCommand::RunUpdate { run_id })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    SweepError::WorkerUnavailable("worker command channel is full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    SweepError::WorkerUnavailable("worker has shut down".to_string())
                }
            })?;
        status.pending_run = Some(run_id);

        info!(run_id = %run_id, "Update run accepted");
        Ok(TriggerReceipt {
            run_id,
            coalesced: false,
        })
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Owner of the worker task
#[derive(Debug)]
pub struct UpdateWorker {
    handle: UpdateWorkerHandle,
    cancel: CancellationFlag,
    join: JoinHandle<()>,
}

impl UpdateWorker {
    /// Spawn the worker task on the current tokio runtime
    pub fn spawn(processor: ChunkedUpdateProcessor, command_buffer_size: usize) -> Self {
        // Room for one queued run plus the shutdown command
        let (sender, receiver) = mpsc::channel(command_buffer_size.max(2));
        let status = Arc::new(Mutex::new(WorkerStatus::default()));
        let cancel = CancellationFlag::new();

        let join = tokio::spawn(Self::run_loop(
            processor,
            receiver,
            Arc::clone(&status),
            cancel.clone(),
        ));

        info!("Update worker started");

        Self {
            handle: UpdateWorkerHandle { sender, status },
            cancel,
            join,
        }
    }

    pub fn handle(&self) -> UpdateWorkerHandle {
        self.handle.clone()
    }

    /// Stop the worker: the active run halts at its next chunk boundary and
    /// queued runs are skipped
    pub async fn shutdown(self, timeout: Duration) -> SweepResult<()> {
        self.cancel.cancel();
        if self.handle.sender.send(WorkerCommand::Shutdown).await.is_err() {
            debug!("Worker already stopped before shutdown command");
        }

        let abort = self.join.abort_handle();
        match tokio::time::timeout(timeout, self.join).await {
            Ok(Ok(())) => {
                info!("Update worker stopped");
                Ok(())
            }
            Ok(Err(join_err)) => Err(SweepError::WorkerUnavailable(format!(
                "worker task ended abnormally: {join_err}"
            ))),
            Err(_) => {
                abort.abort();
                warn!(timeout_ms = timeout.as_millis() as u64, "Update worker shutdown timed out");
                Err(SweepError::WorkerUnavailable(
                    "worker did not stop within the shutdown timeout".to_string(),
                ))
            }
        }
    }

    async fn run_loop(
        processor: ChunkedUpdateProcessor,
        mut receiver: mpsc::Receiver<WorkerCommand>,
        status: Arc<Mutex<WorkerStatus>>,
        cancel: CancellationFlag,
    ) {
        while let Some(command) = receiver.recv().await {
            match command {
                WorkerCommand::RunUpdate { run_id } => {
                    {
                        let mut status = status.lock();
                        if status.pending_run == Some(run_id) {
                            status.pending_run = None;
                        }
                        if cancel.is_cancelled() {
                            debug!(run_id = %run_id, "Skipping queued run after shutdown request");
                            continue;
                        }
                        status.active_run = Some(run_id);
                    }

                    let result = processor.run(run_id, &cancel).await;

                    let mut status = status.lock();
                    status.active_run = None;
                    match result {
                        Ok(summary) => {
                            match summary.status {
                                RunStatus::Completed => status.runs_completed += 1,
                                RunStatus::Cancelled => status.runs_cancelled += 1,
                            }
                            status.last_summary = Some(summary);
                        }
                        Err(err) => {
                            error!(
                                run_id = %run_id,
                                category = err.category(),
                                error = %err,
                                "Update run failed"
                            );
                            status.runs_failed += 1;
                            status.last_error = Some(err.to_string());
                        }
                    }
                }
                WorkerCommand::Shutdown => {
                    debug!("Worker received shutdown command");
                    break;
                }
            }
        }
    }
}

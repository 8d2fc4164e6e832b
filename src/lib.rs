#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Marker Sweep
//!
//! Bounded-memory batch mutation engine. It scans every record whose marker is
//! still null through one forward-only, paged cursor, assigns each a unique
//! marker, and commits the changes in small independent chunks.
//!
//! ## Guarantees
//!
//! - **Bounded memory**: one chunk plus one cursor page, regardless of table size
//! - **Bounded transactions**: one write per chunk, `ceil(M / B)` for `M` records
//! - **Chunk durability**: a crash or failed write loses at most the in-flight chunk
//!
//! ## Module Organization
//!
//! - [`store`] - Store gateway traits with PostgreSQL and in-memory implementations
//! - [`processor`] - The chunked update processor
//! - [`population`] - Synthetic bulk population
//! - [`worker`] - Single-flight background worker behind the trigger
//! - [`web`] - HTTP trigger and health endpoints
//! - [`config`] - YAML configuration with environment overrides
//! - [`error`] - Error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use marker_sweep::processor::{CancellationFlag, ChunkedUpdateProcessor, ProcessorSettings};
//! use marker_sweep::store::InMemoryRecordStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryRecordStore::new();
//! store.seed(250, "USER-");
//!
//! let settings = ProcessorSettings::new(100, 50, "SYSTEM")?;
//! let processor = ChunkedUpdateProcessor::new(Arc::new(store.clone()), settings);
//! let summary = processor.run(uuid::Uuid::new_v4(), &CancellationFlag::new()).await?;
//!
//! assert_eq!(summary.chunks_committed, 3);
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod population;
pub mod processor;
pub mod store;
pub mod web;
pub mod worker;

pub use config::{ConfigManager, SweepConfig};
pub use error::{SweepError, SweepResult};
pub use models::{MarkerToken, NewRecord, Record};
pub use processor::{CancellationFlag, ChunkedUpdateProcessor, ProcessorSettings, RunStatus, RunSummary};
pub use store::{RecordStore, ScanPredicate};
pub use worker::{TriggerReceipt, UpdateWorker, UpdateWorkerHandle};

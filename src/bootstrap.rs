//! # System Bootstrap
//!
//! Wires configuration, store, processor, population loader and background
//! worker into one [`SweepSystem`]. Every configuration problem, including an
//! unreachable database, surfaces here before any scan is opened.

use axum::Router;
use std::sync::Arc;
use tracing::info;

use crate::config::ConfigManager;
use crate::error::SweepResult;
use crate::population::{PopulationLoader, PopulationSummary};
use crate::processor::{ChunkedUpdateProcessor, ProcessorSettings};
use crate::store::{PgRecordStore, RecordStore};
use crate::web::{create_app, AppState};
use crate::worker::{UpdateWorker, UpdateWorkerHandle};

/// Running engine: store, processor and the worker that executes triggered runs
pub struct SweepSystem {
    config_manager: Arc<ConfigManager>,
    store: Arc<dyn RecordStore>,
    processor: ChunkedUpdateProcessor,
    worker: UpdateWorker,
    population: Option<PopulationSummary>,
}

impl SweepSystem {
    /// Connect to PostgreSQL, apply migrations and start the worker
    pub async fn bootstrap(config_manager: Arc<ConfigManager>) -> SweepResult<Self> {
        let store = PgRecordStore::connect(&config_manager.config().database).await?;
        store.migrate().await?;
        Self::bootstrap_with_store(config_manager, Arc::new(store)).await
    }

    /// Start the engine on an already-connected store
    pub async fn bootstrap_with_store(
        config_manager: Arc<ConfigManager>,
        store: Arc<dyn RecordStore>,
    ) -> SweepResult<Self> {
        let config = config_manager.config();
        let settings = ProcessorSettings::from_config(&config.processor)?;
        let loader = PopulationLoader::from_config(Arc::clone(&store), &config.population)?;

        store.health_check().await?;

        let population = if config.population.enabled_on_startup {
            Some(loader.load(config.population.record_count).await?)
        } else {
            None
        };

        let processor = ChunkedUpdateProcessor::new(Arc::clone(&store), settings);
        let worker = UpdateWorker::spawn(processor.clone(), config.worker.command_buffer_size);

        info!(
            environment = %config_manager.environment(),
            store = store.name(),
            populated = population.as_ref().map(|p| p.records_inserted),
            "Sweep system bootstrapped"
        );

        Ok(Self {
            config_manager,
            store,
            processor,
            worker,
            population,
        })
    }

    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn processor(&self) -> &ChunkedUpdateProcessor {
        &self.processor
    }

    pub fn worker(&self) -> UpdateWorkerHandle {
        self.worker.handle()
    }

    /// Result of the startup population, when it ran
    pub fn population(&self) -> Option<&PopulationSummary> {
        self.population.as_ref()
    }

    pub fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState::new(
            self.worker.handle(),
            Arc::clone(&self.store),
            self.config_manager.environment(),
        ))
    }

    pub fn router(&self) -> Router {
        create_app(
            self.app_state(),
            self.config_manager.config().web.request_timeout(),
        )
    }

    /// Stop the worker; an active run halts at its next chunk boundary
    pub async fn shutdown(self) -> SweepResult<()> {
        let timeout = self.config_manager.config().worker.shutdown_timeout();
        self.worker.shutdown(timeout).await
    }
}

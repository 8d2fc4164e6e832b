//! # Population Loader
//!
//! Seeds the store with synthetic unmarked records, `USER-0`, `USER-1`, and so
//! on, written in fixed-size groups. Every group is its own atomic write. The
//! first failing group stops the load; nothing is retried.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::config::PopulationConfig;
use crate::error::{SweepError, SweepResult};
use crate::models::NewRecord;
use crate::store::{bulk_write, BulkWrite, RecordStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopulationSummary {
    pub records_inserted: u64,
    pub groups_committed: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PopulationLoader {
    store: Arc<dyn RecordStore>,
    group_size: usize,
    label_prefix: String,
    actor: String,
}

impl PopulationLoader {
    pub fn new(
        store: Arc<dyn RecordStore>,
        group_size: usize,
        label_prefix: impl Into<String>,
        actor: impl Into<String>,
    ) -> SweepResult<Self> {
        if group_size == 0 {
            return Err(SweepError::configuration(
                "population group size must be greater than zero",
            ));
        }

        Ok(Self {
            store,
            group_size,
            label_prefix: label_prefix.into(),
            actor: actor.into(),
        })
    }

    pub fn from_config(store: Arc<dyn RecordStore>, config: &PopulationConfig) -> SweepResult<Self> {
        Self::new(
            store,
            config.batch_size,
            config.label_prefix.clone(),
            config.actor.clone(),
        )
    }

    /// Insert `count` records, one transaction per group
    ///
    /// A trailing group smaller than the group size is still written.
    pub async fn load(&self, count: usize) -> SweepResult<PopulationSummary> {
        let started = Instant::now();
        let mut records_inserted = 0u64;
        let mut groups_committed = 0u64;
        let mut group = Vec::with_capacity(self.group_size.min(count));

        info!(
            count = count,
            group_size = self.group_size,
            store = self.store.name(),
            "Starting population load"
        );

        for index in 0..count {
            group.push(NewRecord::sequential(&self.label_prefix, index));

            if group.len() == self.group_size || index + 1 == count {
                let inserted = bulk_write(self.store.as_ref(), BulkWrite::Insert(&group), &self.actor)
                    .await
                    .map_err(|err| {
                        error!(
                            group_index = groups_committed,
                            records_inserted = records_inserted,
                            error = %err,
                            "Population group failed, stopping load"
                        );
                        err
                    })?;

                records_inserted += inserted;
                groups_committed += 1;
                debug!(
                    group_index = groups_committed - 1,
                    inserted = inserted,
                    "Population group committed"
                );
                group.clear();
            }
        }

        let summary = PopulationSummary {
            records_inserted,
            groups_committed,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            records_inserted = summary.records_inserted,
            groups_committed = summary.groups_committed,
            elapsed_ms = summary.elapsed_ms,
            "Population load complete"
        );

        Ok(summary)
    }
}

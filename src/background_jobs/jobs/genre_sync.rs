//! Genre catalog refresh from the provider's seed list (run-genre-sync).

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, HookEvent, JobError, JobSchedule, ShutdownBehavior},
};
use crate::genre_sync::GenreSyncEngine;
use serde_json::Value as JsonValue;
use std::time::Duration;

pub const GENRE_SYNC_JOB_ID: &str = "genre_sync";

pub struct GenreSyncJob {
    interval: Duration,
}

impl GenreSyncJob {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackgroundJob for GenreSyncJob {
    fn id(&self) -> &'static str {
        GENRE_SYNC_JOB_ID
    }

    fn name(&self) -> &'static str {
        "Genre Sync"
    }

    fn description(&self) -> &'static str {
        "Upsert the provider's genre seed list"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Combined {
            interval: Some(self.interval),
            hooks: vec![HookEvent::OnStartup],
        }
    }

    /// The sync is a single transaction that never checks for cancellation.
    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::WaitForCompletion
    }

    fn execute(&self, ctx: &JobContext) -> Result<JsonValue, JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let result = GenreSyncEngine::new(ctx.catalog_store.clone(), ctx.provider.clone()).run()?;
        serde_json::to_value(&result)
            .map_err(|e| JobError::ExecutionFailed(format!("Failed to serialize summary: {}", e)))
    }
}

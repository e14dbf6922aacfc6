//! Embedding generation for entities that do not have one yet.

use super::summarize;
use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, HookEvent, JobError, JobSchedule},
};
use crate::recommender::{EmbeddingGenerator, EmbeddingSyncEngine};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

pub const EMBEDDING_SYNC_JOB_ID: &str = "embedding_sync";

pub struct EmbeddingSyncJob {
    generator: Arc<dyn EmbeddingGenerator>,
    interval: Duration,
}

impl EmbeddingSyncJob {
    pub fn new(generator: Arc<dyn EmbeddingGenerator>, interval: Duration) -> Self {
        Self {
            generator,
            interval,
        }
    }
}

impl BackgroundJob for EmbeddingSyncJob {
    fn id(&self) -> &'static str {
        EMBEDDING_SYNC_JOB_ID
    }

    fn name(&self) -> &'static str {
        "Embedding Sync"
    }

    fn description(&self) -> &'static str {
        "Generate embeddings for artists, albums and tracks missing one"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Combined {
            interval: Some(self.interval),
            hooks: vec![HookEvent::OnCatalogChange],
        }
    }

    fn execute(&self, ctx: &JobContext) -> Result<JsonValue, JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let engine = EmbeddingSyncEngine::new(ctx.enrichment_store.clone(), self.generator.clone());
        let result = engine.run_cancellable(&ctx.cancellation_token)?;
        summarize(self.id(), &result, result.cancelled)
    }
}

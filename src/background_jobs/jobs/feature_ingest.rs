//! Resumable audio-feature ingestion (run-feature-ingest).

use super::summarize;
use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, HookEvent, JobError, JobSchedule},
};
use crate::feature_ingest::{FeatureIngestionEngine, IngestSettings};
use serde_json::Value as JsonValue;
use std::time::Duration;

pub const FEATURE_INGEST_JOB_ID: &str = "feature_ingest";

pub struct FeatureIngestJob {
    settings: IngestSettings,
    interval: Duration,
}

impl FeatureIngestJob {
    pub fn new(settings: IngestSettings, interval: Duration) -> Self {
        Self { settings, interval }
    }
}

impl BackgroundJob for FeatureIngestJob {
    fn id(&self) -> &'static str {
        FEATURE_INGEST_JOB_ID
    }

    fn name(&self) -> &'static str {
        "Feature Ingestion"
    }

    fn description(&self) -> &'static str {
        "Fetch audio features for tracks that do not have them yet"
    }

    fn schedule(&self) -> JobSchedule {
        // Also runs right after a crawl added tracks
        JobSchedule::Combined {
            interval: Some(self.interval),
            hooks: vec![HookEvent::OnCatalogChange],
        }
    }

    fn execute(&self, ctx: &JobContext) -> Result<JsonValue, JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let engine = FeatureIngestionEngine::new(
            ctx.catalog_store.clone(),
            ctx.enrichment_store.clone(),
            ctx.provider.clone(),
            self.settings.clone(),
        );
        let result = engine.run_cancellable(&ctx.cancellation_token)?;
        summarize(self.id(), &result, result.cancelled)
    }
}

//! Genre-seeded catalog crawl (run-crawl).

use super::summarize;
use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, HookEvent, JobError, JobSchedule},
};
use crate::crawl::{CrawlEngine, CrawlSettings};
use serde_json::Value as JsonValue;
use std::time::Duration;

pub const CATALOG_CRAWL_JOB_ID: &str = "catalog_crawl";

pub struct CatalogCrawlJob {
    settings: CrawlSettings,
    interval: Duration,
}

impl CatalogCrawlJob {
    pub fn new(settings: CrawlSettings, interval: Duration) -> Self {
        Self { settings, interval }
    }
}

impl BackgroundJob for CatalogCrawlJob {
    fn id(&self) -> &'static str {
        CATALOG_CRAWL_JOB_ID
    }

    fn name(&self) -> &'static str {
        "Catalog Crawl"
    }

    fn description(&self) -> &'static str {
        "Crawl artists, albums and tracks for every genre seed"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.interval)
    }

    fn execute(&self, ctx: &JobContext) -> Result<JsonValue, JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let engine = CrawlEngine::new(
            ctx.catalog_store.clone(),
            ctx.provider.clone(),
            self.settings.clone(),
        );
        let result = engine.run_cancellable(&ctx.cancellation_token)?;

        if result.artists_created + result.albums_created + result.tracks_created > 0 {
            ctx.emit(HookEvent::OnCatalogChange);
        }
        summarize(self.id(), &result, result.cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::{CatalogStore, SqliteCatalogStore};
    use crate::provider::FixtureProvider;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn context(temp_dir: &TempDir) -> (JobContext, mpsc::Receiver<HookEvent>, Arc<SqliteCatalogStore>) {
        let store = Arc::new(SqliteCatalogStore::new(temp_dir.path().join("catalog.db")).unwrap());
        let (tx, rx) = mpsc::channel(10);
        let ctx = JobContext::new(
            CancellationToken::new(),
            store.clone(),
            store.clone(),
            Arc::new(FixtureProvider::new()),
        )
        .with_hook_sender(tx);
        (ctx, rx, store)
    }

    fn job() -> CatalogCrawlJob {
        CatalogCrawlJob::new(CrawlSettings::default(), Duration::from_secs(3600))
    }

    #[test]
    fn crawl_emits_catalog_change_only_when_something_was_created() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, mut rx, store) = context(&temp_dir);

        let summary = job().execute(&ctx).unwrap();
        assert_eq!(summary["artists_created"], 10);
        assert_eq!(summary["tracks_created"], 60);
        assert_eq!(store.get_tracks_count(), 60);
        assert_eq!(rx.try_recv().unwrap(), HookEvent::OnCatalogChange);

        let summary = job().execute(&ctx).unwrap();
        assert_eq!(summary["albums_skipped"], 20);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn cancelled_context_does_not_crawl() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, _rx, store) = context(&temp_dir);
        ctx.cancellation_token.cancel();

        assert!(matches!(job().execute(&ctx), Err(JobError::Cancelled)));
        assert_eq!(store.get_artists_count(), 0);
    }
}

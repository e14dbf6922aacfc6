//! Specific background job implementations.

pub mod catalog_crawl;
pub mod embedding_sync;
pub mod feature_ingest;
pub mod genre_sync;

pub use catalog_crawl::CatalogCrawlJob;
pub use embedding_sync::EmbeddingSyncJob;
pub use feature_ingest::FeatureIngestJob;
pub use genre_sync::GenreSyncJob;

use super::job::JobError;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::info;

/// Turn an engine result into a job summary.
///
/// A run that stopped early on cancellation is logged with its partial
/// counts and reported as `JobError::Cancelled`.
fn summarize<T: Serialize>(job_id: &str, result: &T, cancelled: bool) -> Result<JsonValue, JobError> {
    let summary = serde_json::to_value(result)
        .map_err(|e| JobError::ExecutionFailed(format!("Failed to serialize summary: {}", e)))?;
    if cancelled {
        info!("Job {} stopped early: {}", job_id, summary);
        return Err(JobError::Cancelled);
    }
    Ok(summary)
}

use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all catalog metrics
const PREFIX: &str = "juke";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Crawl Metrics
    pub static ref CRAWL_ENTITIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_crawl_entities_total"), "Entities visited by the crawl"),
        &["entity", "outcome"]
    ).expect("Failed to create crawl_entities_total metric");

    // Feature Ingestion Metrics
    pub static ref FEATURES_INGESTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_features_ingested_total"), "Tracks processed by feature ingestion"),
        &["outcome"]
    ).expect("Failed to create features_ingested_total metric");

    // Provider Metrics
    pub static ref PROVIDER_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_provider_requests_total"), "Requests sent to the music provider"),
        &["operation", "status"]
    ).expect("Failed to create provider_requests_total metric");

    // Recommendation Metrics
    pub static ref RECOMMENDATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_recommendations_total"), "Recommendations served"),
        &["resource_type"]
    ).expect("Failed to create recommendations_total metric");

    // Background Job Metrics
    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_executions_total"), "Background job runs"),
        &["job_id", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job duration in seconds"
        )
        .buckets(vec![0.1, 1.0, 10.0, 60.0, 300.0, 900.0, 3600.0]),
        &["job_id"]
    ).expect("Failed to create background_job_duration_seconds metric");

    pub static ref BACKGROUND_JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_job_running"), "Whether a background job is running"),
        &["job_id"]
    ).expect("Failed to create background_job_running metric");

    // Catalog Metrics
    pub static ref CATALOG_ITEMS_TOTAL: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_catalog_items_total"), "Total items in catalog"),
        &["type"]
    ).expect("Failed to create catalog_items_total metric");

    pub static ref TRACKS_WITH_FEATURES: Gauge = Gauge::new(
        format!("{PREFIX}_tracks_with_features"),
        "Tracks that have audio features"
    ).expect("Failed to create tracks_with_features metric");
}

/// Register all metrics with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(CRAWL_ENTITIES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FEATURES_INGESTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROVIDER_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RECOMMENDATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_ITEMS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TRACKS_WITH_FEATURES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn set_catalog_metrics(
    num_artists: usize,
    num_albums: usize,
    num_tracks: usize,
    tracks_with_features: usize,
) {
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["artist"])
        .set(num_artists as f64);
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["album"])
        .set(num_albums as f64);
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["track"])
        .set(num_tracks as f64);
    TRACKS_WITH_FEATURES.set(tracks_with_features as f64);
}

/// `entity` is seed, artist, album or track; `outcome` is created, skipped or failed.
pub fn record_crawl_entity(entity: &str, outcome: &str) {
    CRAWL_ENTITIES_TOTAL
        .with_label_values(&[entity, outcome])
        .inc();
}

pub fn record_feature_ingest(outcome: &str) {
    FEATURES_INGESTED_TOTAL.with_label_values(&[outcome]).inc();
}

/// `status` is a coarse outcome label such as ok, rate_limited or http_error.
pub fn record_provider_request(operation: &str, status: &str) {
    PROVIDER_REQUESTS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

pub fn record_recommendation(resource_type: &str) {
    RECOMMENDATIONS_TOTAL
        .with_label_values(&[resource_type])
        .inc();
}

pub fn record_background_job_execution(job_id: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_id, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
}

pub fn set_background_job_running(job_id: &str, running: bool) {
    BACKGROUND_JOB_RUNNING
        .with_label_values(&[job_id])
        .set(if running { 1.0 } else { 0.0 });
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

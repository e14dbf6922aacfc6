mod file_config;

pub use file_config::{
    CrawlConfig, FileConfig, IngestConfig, JobsConfig, ProviderConfig, RecommenderConfig,
};

use crate::crawl::{CrawlSettings, DEFAULT_SEARCH_LIMIT};
use crate::feature_ingest::IngestSettings;
use crate::provider::{SpotifyProviderSettings, MAX_FEATURE_BATCH};
use crate::provider::{DEFAULT_API_BASE_URL, DEFAULT_TOKEN_URL};
use crate::recommender::{
    RecommenderSettings, DEFAULT_MAX_LIMIT, DEFAULT_MODEL_VERSION, DEFAULT_VECTOR_DIM,
};
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_METRICS_PORT: u16 = 9091;
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RATE_LIMIT_INTERVAL_MS: u64 = 100;

const HOUR: u64 = 60 * 60;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub use_stub_data: bool,
    pub metrics_port: Option<u16>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub use_stub_data: bool,
    pub metrics_port: u16,

    /// `None` when stub data is used.
    pub provider: Option<SpotifyProviderSettings>,
    pub crawl: CrawlSettings,
    pub ingest: IngestSettings,
    pub recommender: RecommenderSettings,
    pub jobs: JobsSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobsSettings {
    pub crawl_interval: Duration,
    pub ingest_interval: Duration,
    pub genre_sync_interval: Duration,
    pub embedding_sync_interval: Duration,
}

impl Default for JobsSettings {
    fn default() -> Self {
        Self {
            crawl_interval: Duration::from_secs(24 * HOUR),
            ingest_interval: Duration::from_secs(6 * HOUR),
            genre_sync_interval: Duration::from_secs(168 * HOUR),
            embedding_sync_interval: Duration::from_secs(12 * HOUR),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let use_stub_data = file.use_stub_data.unwrap_or(cli.use_stub_data);
        let metrics_port = file
            .metrics_port
            .or(cli.metrics_port)
            .unwrap_or(DEFAULT_METRICS_PORT);

        let provider = if use_stub_data {
            None
        } else {
            Some(resolve_provider(cli, file.provider.unwrap_or_default())?)
        };

        let crawl_file = file.crawl.unwrap_or_default();
        let crawl = CrawlSettings {
            genre_seeds: crawl_file
                .genre_seeds
                .unwrap_or_else(|| CrawlSettings::default().genre_seeds),
            search_limit: crawl_file.search_limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
        };
        if crawl.search_limit == 0 {
            bail!("crawl.search_limit must be at least 1");
        }

        let ingest = IngestSettings {
            batch_size: file
                .ingest
                .and_then(|i| i.batch_size)
                .unwrap_or(MAX_FEATURE_BATCH),
        };

        let rec_file = file.recommender.unwrap_or_default();
        let recommender = RecommenderSettings {
            vector_dim: rec_file.vector_dim.unwrap_or(DEFAULT_VECTOR_DIM),
            model_version: rec_file
                .model_version
                .unwrap_or_else(|| DEFAULT_MODEL_VERSION.to_string()),
            max_limit: rec_file.max_limit.unwrap_or(DEFAULT_MAX_LIMIT),
        };
        if recommender.vector_dim == 0 {
            bail!("recommender.vector_dim must be at least 1");
        }
        if recommender.max_limit == 0 {
            bail!("recommender.max_limit must be at least 1");
        }

        let jobs_file = file.jobs.unwrap_or_default();
        let defaults = JobsSettings::default();
        let hours = |value: Option<u64>, default: Duration| {
            value.map_or(default, |h| Duration::from_secs(h * HOUR))
        };
        let jobs = JobsSettings {
            crawl_interval: hours(jobs_file.crawl_interval_hours, defaults.crawl_interval),
            ingest_interval: hours(jobs_file.ingest_interval_hours, defaults.ingest_interval),
            genre_sync_interval: hours(
                jobs_file.genre_sync_interval_hours,
                defaults.genre_sync_interval,
            ),
            embedding_sync_interval: hours(
                jobs_file.embedding_sync_interval_hours,
                defaults.embedding_sync_interval,
            ),
        };
        if [
            jobs.crawl_interval,
            jobs.ingest_interval,
            jobs.genre_sync_interval,
            jobs.embedding_sync_interval,
        ]
        .contains(&Duration::ZERO)
        {
            bail!("Job intervals must be at least one hour");
        }

        Ok(Self {
            db_dir,
            use_stub_data,
            metrics_port,
            provider,
            crawl,
            ingest,
            recommender,
            jobs,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }
}

fn resolve_provider(cli: &CliConfig, file: ProviderConfig) -> Result<SpotifyProviderSettings> {
    let client_id = file.client_id.or_else(|| cli.client_id.clone());
    let client_secret = file.client_secret.or_else(|| cli.client_secret.clone());
    let (Some(client_id), Some(client_secret)) = (client_id, client_secret) else {
        bail!("Provider client_id and client_secret are required unless --use-stub-data is set");
    };
    if client_id.trim().is_empty() || client_secret.trim().is_empty() {
        bail!("Provider client_id and client_secret must not be empty");
    }

    Ok(SpotifyProviderSettings {
        client_id,
        client_secret,
        api_base_url: file
            .api_base_url
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
        token_url: file
            .token_url
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
        timeout: Duration::from_secs(
            file.timeout_secs.unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS),
        ),
        rate_limit_interval: Duration::from_millis(
            file.rate_limit_interval_ms
                .unwrap_or(DEFAULT_RATE_LIMIT_INTERVAL_MS),
        ),
    })
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub use_stub_data: Option<bool>,
    pub metrics_port: Option<u16>,

    // Feature configs
    pub provider: Option<ProviderConfig>,
    pub crawl: Option<CrawlConfig>,
    pub ingest: Option<IngestConfig>,
    pub recommender: Option<RecommenderConfig>,
    pub jobs: Option<JobsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base_url: Option<String>,
    pub token_url: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Minimum time between two provider requests.
    pub rate_limit_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CrawlConfig {
    pub genre_seeds: Option<Vec<String>>,
    pub search_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub batch_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RecommenderConfig {
    pub vector_dim: Option<usize>,
    pub model_version: Option<String>,
    pub max_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JobsConfig {
    pub crawl_interval_hours: Option<u64>,
    pub ingest_interval_hours: Option<u64>,
    pub genre_sync_interval_hours: Option<u64>,
    pub embedding_sync_interval_hours: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            db_dir = "/data"
            use_stub_data = false
            metrics_port = 9100

            [provider]
            client_id = "id"
            client_secret = "secret"
            timeout_secs = 10
            rate_limit_interval_ms = 250

            [crawl]
            genre_seeds = ["post-rock", "math rock"]
            search_limit = 5

            [ingest]
            batch_size = 25

            [recommender]
            vector_dim = 16
            model_version = "v2"
            max_limit = 20

            [jobs]
            crawl_interval_hours = 12
        "#;
        let config: FileConfig = toml::from_str(toml).unwrap();

        assert_eq!(config.db_dir.as_deref(), Some("/data"));
        assert_eq!(config.metrics_port, Some(9100));
        let provider = config.provider.unwrap();
        assert_eq!(provider.client_id.as_deref(), Some("id"));
        assert_eq!(provider.rate_limit_interval_ms, Some(250));
        assert!(provider.api_base_url.is_none());
        let crawl = config.crawl.unwrap();
        assert_eq!(crawl.genre_seeds.unwrap(), vec!["post-rock", "math rock"]);
        assert_eq!(crawl.search_limit, Some(5));
        assert_eq!(config.ingest.unwrap().batch_size, Some(25));
        assert_eq!(config.recommender.unwrap().model_version.as_deref(), Some("v2"));
        let jobs = config.jobs.unwrap();
        assert_eq!(jobs.crawl_interval_hours, Some(12));
        assert!(jobs.ingest_interval_hours.is_none());
    }

    #[test]
    fn test_empty_config() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.db_dir.is_none());
        assert!(config.provider.is_none());
        assert!(config.jobs.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "use_stub_data = true").unwrap();
        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.use_stub_data, Some(true));

        assert!(FileConfig::load(Path::new("/nonexistent/juke.toml")).is_err());
    }
}

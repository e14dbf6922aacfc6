use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use juke_catalog::background_jobs::jobs::{
    CatalogCrawlJob, EmbeddingSyncJob, FeatureIngestJob, GenreSyncJob,
};
use juke_catalog::background_jobs::{create_scheduler, BackgroundJob, JobContext};
use juke_catalog::catalog_store::{CatalogStore, SqliteCatalogStore};
use juke_catalog::config::{AppConfig, CliConfig, FileConfig};
use juke_catalog::crawl::CatalogFetcher;
use juke_catalog::enrichment_store::EnrichmentStore;
use juke_catalog::provider::build_provider;
use juke_catalog::recommender::{
    EmbeddingGenerator, HashingEmbedder, RecommendationRequest, Recommender, ResourceType,
};
use juke_catalog::server::{self, metrics};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How often the catalog size gauges are refreshed while serving jobs.
const CATALOG_METRICS_REFRESH: Duration = Duration::from_secs(60);

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

fn parse_resource_type(s: &str) -> Result<ResourceType, String> {
    ResourceType::from_name(s).ok_or_else(|| format!("unknown resource type: {}", s))
}

#[derive(Parser, Debug)]
#[command(name = "juke-catalog")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
#[command(about = "Music catalog crawler, feature ingestion and recommendations")]
struct CliArgs {
    /// Path to a TOML config file. Its values override CLI arguments.
    #[arg(long, global = true, value_parser = parse_path)]
    config: Option<PathBuf>,

    /// Directory holding catalog.db.
    #[arg(long, global = true, value_parser = parse_path)]
    db_dir: Option<PathBuf>,

    /// Use deterministic fixture data instead of the live provider.
    #[arg(long, global = true, default_value_t = false)]
    use_stub_data: bool,

    /// Provider OAuth client id.
    #[arg(long, global = true)]
    client_id: Option<String>,

    /// Provider OAuth client secret.
    #[arg(long, global = true)]
    client_secret: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl artists, albums and tracks for every genre seed.
    Crawl,
    /// Fetch audio features for tracks that do not have them yet.
    IngestFeatures,
    /// Upsert the provider's genre seed list.
    SyncGenres,
    /// Generate embeddings for entities missing one.
    SyncEmbeddings,
    /// Print recommendations for the given seeds.
    Recommend {
        #[arg(long = "artist")]
        artists: Vec<String>,
        #[arg(long = "album")]
        albums: Vec<String>,
        #[arg(long = "track")]
        tracks: Vec<String>,
        #[arg(long = "genre")]
        genres: Vec<String>,
        #[arg(long, default_value_t = juke_catalog::recommender::DEFAULT_LIMIT)]
        limit: usize,
        /// Comma-separated subset of artists, albums, tracks.
        #[arg(long, value_delimiter = ',', value_parser = parse_resource_type)]
        types: Vec<ResourceType>,
    },
    /// Fetch one entity from the provider and persist it.
    Fetch {
        #[command(subcommand)]
        target: FetchTarget,
    },
    /// Run the job scheduler until interrupted.
    ServeJobs {
        /// The port for the metrics server (Prometheus scraping).
        #[arg(long)]
        metrics_port: Option<u16>,
    },
}

#[derive(Subcommand, Debug)]
enum FetchTarget {
    Artist { id: String },
    Album { id: String },
    Track { id: String },
}

impl CliArgs {
    fn cli_config(&self) -> CliConfig {
        let metrics_port = match &self.command {
            Command::ServeJobs { metrics_port } => *metrics_port,
            _ => None,
        };
        CliConfig {
            db_dir: self.db_dir.clone(),
            use_stub_data: self.use_stub_data,
            metrics_port,
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;
    info!(
        "juke-catalog {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let config = AppConfig::resolve(&cli_args.cli_config(), file_config)?;

    info!(
        "Opening SQLite catalog database at {:?}...",
        config.catalog_db_path()
    );
    let store = Arc::new(SqliteCatalogStore::new(config.catalog_db_path())?);
    // Kept alive here so the blocking HTTP client is never dropped on a runtime thread.
    let provider = build_provider(config.use_stub_data, config.provider.clone())?;
    let ctx = JobContext::new(
        CancellationToken::new(),
        store.clone(),
        store.clone(),
        provider.clone(),
    );
    let embedder: Arc<dyn EmbeddingGenerator> = Arc::new(HashingEmbedder::new(
        config.recommender.vector_dim,
        config.recommender.model_version.clone(),
    ));

    match cli_args.command {
        Command::Crawl => {
            let job = CatalogCrawlJob::new(config.crawl.clone(), config.jobs.crawl_interval);
            print_json(&job.execute(&ctx)?)
        }
        Command::IngestFeatures => {
            let job = FeatureIngestJob::new(config.ingest.clone(), config.jobs.ingest_interval);
            print_json(&job.execute(&ctx)?)
        }
        Command::SyncGenres => {
            let job = GenreSyncJob::new(config.jobs.genre_sync_interval);
            print_json(&job.execute(&ctx)?)
        }
        Command::SyncEmbeddings => {
            let job = EmbeddingSyncJob::new(embedder, config.jobs.embedding_sync_interval);
            print_json(&job.execute(&ctx)?)
        }
        Command::Recommend {
            artists,
            albums,
            tracks,
            genres,
            limit,
            types,
        } => {
            let request = RecommendationRequest {
                artists,
                albums,
                tracks,
                genres,
                limit,
                resource_types: types,
            };
            let recommender = Recommender::new(store.clone(), config.recommender.clone());
            print_json(&recommender.recommend(&request)?)
        }
        Command::Fetch { target } => {
            let fetcher = CatalogFetcher::new(store.clone(), provider.clone());
            match target {
                FetchTarget::Artist { id } => print_json(&fetcher.fetch_artist(&id)?),
                FetchTarget::Album { id } => print_json(&fetcher.fetch_album(&id)?),
                FetchTarget::Track { id } => print_json(&fetcher.fetch_track(&id)?),
            }
        }
        Command::ServeJobs { .. } => serve_jobs(&config, ctx, embedder, store),
    }
}

fn refresh_catalog_metrics(store: &SqliteCatalogStore) {
    let with_features = match store.get_enrichment_stats() {
        Ok(stats) => stats.tracks_with_features,
        Err(e) => {
            error!("Failed to read enrichment stats: {:#}", e);
            return;
        }
    };
    metrics::set_catalog_metrics(
        store.get_artists_count(),
        store.get_albums_count(),
        store.get_tracks_count(),
        with_features,
    );
}

fn serve_jobs(
    config: &AppConfig,
    ctx: JobContext,
    embedder: Arc<dyn EmbeddingGenerator>,
    store: Arc<SqliteCatalogStore>,
) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;

    runtime.block_on(async move {
        info!("Initializing metrics...");
        metrics::init_metrics();
        refresh_catalog_metrics(&store);

        let shutdown_token = CancellationToken::new();
        let (hook_sender, hook_receiver) = mpsc::channel(100);
        // Not tied to the shutdown token: the scheduler cancels each job
        // according to its shutdown behavior.
        let job_context = ctx.with_hook_sender(hook_sender);

        let (mut scheduler, handle) =
            create_scheduler(hook_receiver, shutdown_token.clone(), job_context);
        scheduler
            .register_job(Arc::new(CatalogCrawlJob::new(
                config.crawl.clone(),
                config.jobs.crawl_interval,
            )))
            .await;
        scheduler
            .register_job(Arc::new(FeatureIngestJob::new(
                config.ingest.clone(),
                config.jobs.ingest_interval,
            )))
            .await;
        scheduler
            .register_job(Arc::new(GenreSyncJob::new(config.jobs.genre_sync_interval)))
            .await;
        scheduler
            .register_job(Arc::new(EmbeddingSyncJob::new(
                embedder,
                config.jobs.embedding_sync_interval,
            )))
            .await;
        for job in handle.list_jobs().await {
            info!(
                "Job {} ({}): {}",
                job.id, job.schedule.schedule_type, job.description
            );
        }

        let metrics_server = tokio::spawn(server::run_metrics_server(
            config.metrics_port,
            shutdown_token.clone(),
        ));

        let ctrl_c_token = shutdown_token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl-C, shutting down...");
                    ctrl_c_token.cancel();
                }
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
        });

        let metrics_token = shutdown_token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CATALOG_METRICS_REFRESH);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let store = store.clone();
                        let _ = tokio::task::spawn_blocking(move || refresh_catalog_metrics(&store)).await;
                    }
                    _ = metrics_token.cancelled() => break,
                }
            }
        });

        scheduler.run().await;

        match metrics_server.await {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("Metrics server task failed: {}", e)),
        }
    })
}

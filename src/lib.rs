//! Juke Catalog Library
//!
//! Genre-seeded catalog crawl, resumable audio-feature ingestion and
//! embedding-based recommendations over a single SQLite database.

pub mod background_jobs;
pub mod catalog_store;
pub mod config;
pub mod crawl;
pub mod enrichment_store;
pub mod feature_ingest;
pub mod genre_sync;
pub mod provider;
pub mod recommender;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use catalog_store::{CatalogStore, SqliteCatalogStore};
pub use enrichment_store::EnrichmentStore;
pub use provider::{build_provider, FixtureProvider, MusicProvider};

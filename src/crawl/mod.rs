//! Genre-seeded catalog crawl.
//!
//! Walks genre seed -> artists -> albums -> tracks and persists every level.
//! Failures stay local to the seed, artist or track that caused them, and an
//! album that already has tracks is not fetched again, so re-running the
//! crawl after an interruption converges to the same catalog.

mod on_demand;
pub(crate) mod persist;

pub use on_demand::CatalogFetcher;

use crate::catalog_store::CatalogStore;
use crate::provider::{ArtistPayload, ArtistRefPayload, MusicProvider};
use crate::server::metrics;
use anyhow::Result;
use chrono::Utc;
use persist::{is_duplicate_track_number, save_album, save_artist, save_track};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub genre_seeds: Vec<String>,
    pub search_limit: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            genre_seeds: crate::provider::FIXTURE_GENRE_SEEDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

/// Summary of one crawl run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub artists_created: usize,
    /// Artists returned by more than one seed in the same run.
    pub artists_skipped: usize,
    pub albums_created: usize,
    /// Albums left alone because they already have tracks.
    pub albums_skipped: usize,
    pub tracks_created: usize,
    pub tracks_skipped: usize,
    pub failed_seeds: Vec<String>,
    pub failed_artist_ids: Vec<String>,
    pub failed_track_ids: Vec<String>,
    /// RFC 3339 timestamp of the end of the run.
    pub crawled_at: String,
    #[serde(default)]
    pub cancelled: bool,
}

pub struct CrawlEngine {
    catalog_store: Arc<dyn CatalogStore>,
    provider: Arc<dyn MusicProvider>,
    settings: CrawlSettings,
}

impl CrawlEngine {
    pub fn new(
        catalog_store: Arc<dyn CatalogStore>,
        provider: Arc<dyn MusicProvider>,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            catalog_store,
            provider,
            settings,
        }
    }

    pub fn run(&self) -> Result<CrawlResult> {
        self.run_cancellable(&CancellationToken::new())
    }

    /// Crawl every seed, stopping between artists once `cancel` fires.
    ///
    /// Only a failure to read the initial artist snapshot is returned as an
    /// error; everything else is recorded in the result.
    pub fn run_cancellable(&self, cancel: &CancellationToken) -> Result<CrawlResult> {
        let existing_artist_ids = self.catalog_store.list_artist_ids()?;
        let mut seen_artist_ids: HashSet<String> = HashSet::new();
        let mut result = CrawlResult::default();

        info!(
            "Starting catalog crawl over {} genre seeds ({} artists already stored)",
            self.settings.genre_seeds.len(),
            existing_artist_ids.len()
        );

        'seeds: for seed in &self.settings.genre_seeds {
            if cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }

            let artists = match self
                .provider
                .search_by_genre(seed, self.settings.search_limit)
            {
                Ok(artists) => artists,
                Err(e) => {
                    warn!("Genre search for '{}' failed: {}", seed, e);
                    metrics::record_crawl_entity("seed", "failed");
                    result.failed_seeds.push(seed.clone());
                    continue;
                }
            };
            debug!("Seed '{}' returned {} artists", seed, artists.len());

            for artist in artists {
                if cancel.is_cancelled() {
                    result.cancelled = true;
                    break 'seeds;
                }
                if !seen_artist_ids.insert(artist.id.clone()) {
                    result.artists_skipped += 1;
                    metrics::record_crawl_entity("artist", "skipped");
                    continue;
                }
                if let Err(e) = self.crawl_artist(&artist, &existing_artist_ids, &mut result) {
                    error!("Failed to crawl artist {} ({}): {:#}", artist.id, artist.name, e);
                    metrics::record_crawl_entity("artist", "failed");
                    result.failed_artist_ids.push(artist.id.clone());
                }
            }
        }

        result.crawled_at = Utc::now().to_rfc3339();
        info!(
            "Catalog crawl finished: artists {} created / {} skipped, albums {} created / {} skipped, \
             tracks {} created / {} skipped, {} failed seeds, {} failed artists, {} failed tracks",
            result.artists_created,
            result.artists_skipped,
            result.albums_created,
            result.albums_skipped,
            result.tracks_created,
            result.tracks_skipped,
            result.failed_seeds.len(),
            result.failed_artist_ids.len(),
            result.failed_track_ids.len()
        );
        Ok(result)
    }

    fn crawl_artist(
        &self,
        artist: &ArtistPayload,
        existing_artist_ids: &HashSet<String>,
        result: &mut CrawlResult,
    ) -> Result<()> {
        let store = self.catalog_store.as_ref();

        save_artist(store, artist)?;
        if !existing_artist_ids.contains(&artist.id) {
            result.artists_created += 1;
            metrics::record_crawl_entity("artist", "created");
            info!("Created artist {} ({})", artist.id, artist.name);
        }

        let canonical_artist: ArtistRefPayload = artist.to_ref();
        for mut album in self.provider.list_albums(&artist.id)? {
            let stored_tracks = store.get_album_track_count(&album.id)?.unwrap_or(0);
            if stored_tracks > 0 {
                debug!("Skipping album {}: {} tracks already stored", album.id, stored_tracks);
                result.albums_skipped += 1;
                metrics::record_crawl_entity("album", "skipped");
                continue;
            }

            album.artists = vec![canonical_artist.clone()];
            save_album(store, &album)?;
            result.albums_created += 1;
            metrics::record_crawl_entity("album", "created");
            info!("Saved album {} ({})", album.id, album.name);

            for track in self.provider.list_tracks(&album.id)? {
                if store.track_exists(&track.id)? {
                    result.tracks_skipped += 1;
                    metrics::record_crawl_entity("track", "skipped");
                    continue;
                }

                match save_track(store, &track, &album.id) {
                    Ok(_) => {
                        result.tracks_created += 1;
                        metrics::record_crawl_entity("track", "created");
                        debug!("Created track {} ({})", track.id, track.name);
                    }
                    Err(e) if is_duplicate_track_number(&e) => {
                        warn!("Skipping track {}: {}", track.id, e);
                        metrics::record_crawl_entity("track", "failed");
                        result.failed_track_ids.push(track.id.clone());
                    }
                    Err(e) => return Err(e.context(format!("track {}", track.id))),
                }
            }
        }
        Ok(())
    }
}

//! Audio feature backfill.
//!
//! Visits the whole catalog in a fixed order (artists by name and id, albums
//! by name, tracks by number) and fetches features for tracks that have no
//! features row yet. The features row is the only progress marker, so a
//! re-run picks up exactly the tracks that are still missing.

use crate::catalog_store::{Album, CatalogStore, Track};
use crate::enrichment_store::EnrichmentStore;
use crate::provider::{FeaturePayload, MusicProvider, MAX_FEATURE_BATCH};
use crate::server::metrics;
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Tracks per provider call, clamped to `1..=MAX_FEATURE_BATCH`.
    pub batch_size: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            batch_size: MAX_FEATURE_BATCH,
        }
    }
}

impl IngestSettings {
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_FEATURE_BATCH)
    }
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResult {
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_track_ids: Vec<String>,
    pub batches: usize,
    pub ingested_at: String,
    #[serde(default)]
    pub cancelled: bool,
}

impl IngestResult {
    fn mark_failed(&mut self, track_id: &str) {
        self.failed += 1;
        self.failed_track_ids.push(track_id.to_string());
        metrics::record_feature_ingest("failed");
    }
}

pub struct FeatureIngestionEngine {
    catalog_store: Arc<dyn CatalogStore>,
    enrichment_store: Arc<dyn EnrichmentStore>,
    provider: Arc<dyn MusicProvider>,
    settings: IngestSettings,
}

impl FeatureIngestionEngine {
    pub fn new(
        catalog_store: Arc<dyn CatalogStore>,
        enrichment_store: Arc<dyn EnrichmentStore>,
        provider: Arc<dyn MusicProvider>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            catalog_store,
            enrichment_store,
            provider,
            settings,
        }
    }

    pub fn run(&self) -> Result<IngestResult> {
        self.run_cancellable(&CancellationToken::new())
    }

    /// Ingest features for every pending track, stopping between albums once
    /// `cancel` fires.
    pub fn run_cancellable(&self, cancel: &CancellationToken) -> Result<IngestResult> {
        let artists = self.catalog_store.list_artists_ordered()?;
        let batch_size = self.settings.effective_batch_size();
        let mut visited_albums: HashSet<String> = HashSet::new();
        let mut result = IngestResult::default();

        info!(
            "Starting audio feature ingestion over {} artists (batch size {})",
            artists.len(),
            batch_size
        );

        'artists: for artist in &artists {
            let albums = match self.catalog_store.list_artist_albums(&artist.id) {
                Ok(albums) => albums,
                Err(e) => {
                    error!("Failed to list albums of artist {}: {:#}", artist.id, e);
                    continue;
                }
            };

            for album in albums {
                if cancel.is_cancelled() {
                    result.cancelled = true;
                    break 'artists;
                }
                // Albums shared by several artists are processed once.
                if !visited_albums.insert(album.id.clone()) {
                    continue;
                }
                if let Err(e) = self.ingest_album(&album, batch_size, &mut result) {
                    error!("Failed to ingest features for album {}: {:#}", album.id, e);
                }
            }
        }

        result.ingested_at = Utc::now().to_rfc3339();
        info!(
            "Audio feature ingestion finished: {} ingested, {} skipped, {} failed in {} batches",
            result.ingested, result.skipped, result.failed, result.batches
        );
        Ok(result)
    }

    fn ingest_album(&self, album: &Album, batch_size: usize, result: &mut IngestResult) -> Result<()> {
        let mut pending: Vec<Track> = Vec::new();
        for track in self.catalog_store.list_album_tracks(&album.id)? {
            if self.enrichment_store.has_audio_features(&track.id)? {
                result.skipped += 1;
                metrics::record_feature_ingest("skipped");
            } else {
                pending.push(track);
            }
        }
        if pending.is_empty() {
            return Ok(());
        }

        debug!("Album {}: {} tracks pending", album.id, pending.len());
        for batch in pending.chunks(batch_size) {
            self.ingest_batch(batch, result);
        }
        Ok(())
    }

    fn ingest_batch(&self, batch: &[Track], result: &mut IngestResult) {
        result.batches += 1;
        let ids: Vec<String> = batch.iter().map(|t| t.id.clone()).collect();

        let payloads = match self.provider.batch_features(&ids) {
            Ok(payloads) => payloads,
            Err(e) => {
                warn!("Audio features batch of {} tracks failed: {}", ids.len(), e);
                for id in &ids {
                    result.mark_failed(id);
                }
                return;
            }
        };

        let mut by_id: HashMap<String, FeaturePayload> = payloads
            .into_iter()
            .flatten()
            .map(|p| (p.id.clone(), p))
            .collect();

        for track in batch {
            let Some(payload) = by_id.remove(&track.id) else {
                warn!("Provider returned no audio features for track {}", track.id);
                result.mark_failed(&track.id);
                continue;
            };
            match self
                .enrichment_store
                .upsert_audio_features(&payload.into_audio_features())
            {
                Ok(()) => {
                    result.ingested += 1;
                    metrics::record_feature_ingest("ingested");
                }
                Err(e) => {
                    warn!("Failed to store audio features for track {}: {:#}", track.id, e);
                    result.mark_failed(&track.id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(IngestSettings { batch_size: 0 }.effective_batch_size(), 1);
        assert_eq!(IngestSettings { batch_size: 10 }.effective_batch_size(), 10);
        assert_eq!(IngestSettings { batch_size: 500 }.effective_batch_size(), MAX_FEATURE_BATCH);
    }
}

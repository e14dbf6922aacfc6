use super::embedder::EmbeddingGenerator;
use crate::enrichment_store::{EnrichmentStore, EntityKind};
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSyncResult {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
    pub failed_ids: Vec<String>,
    pub synced_at: String,
    #[serde(default)]
    pub cancelled: bool,
}

/// Writes embeddings for every catalog entity that does not have one yet.
pub struct EmbeddingSyncEngine {
    enrichment_store: Arc<dyn EnrichmentStore>,
    generator: Arc<dyn EmbeddingGenerator>,
}

impl EmbeddingSyncEngine {
    pub fn new(enrichment_store: Arc<dyn EnrichmentStore>, generator: Arc<dyn EmbeddingGenerator>) -> Self {
        Self {
            enrichment_store,
            generator,
        }
    }

    pub fn run(&self) -> Result<EmbeddingSyncResult> {
        self.run_cancellable(&CancellationToken::new())
    }

    pub fn run_cancellable(&self, cancel: &CancellationToken) -> Result<EmbeddingSyncResult> {
        let mut result = EmbeddingSyncResult::default();

        'kinds: for kind in EntityKind::ALL {
            let subjects = self.enrichment_store.list_subjects_missing_embedding(kind)?;
            for subject in subjects {
                if cancel.is_cancelled() {
                    result.cancelled = true;
                    break 'kinds;
                }
                let written = self
                    .generator
                    .embed(&subject)
                    .and_then(|embedding| self.enrichment_store.upsert_embedding(kind, &embedding));
                match written {
                    Ok(()) => match kind {
                        EntityKind::Artist => result.artists += 1,
                        EntityKind::Album => result.albums += 1,
                        EntityKind::Track => result.tracks += 1,
                    },
                    Err(e) => {
                        warn!("Failed to embed {} {}: {:#}", kind, subject.id, e);
                        result.failed_ids.push(subject.id.clone());
                    }
                }
            }
        }

        result.synced_at = Utc::now().to_rfc3339();
        info!(
            "Embedding sync finished: {} artists, {} albums, {} tracks, {} failed",
            result.artists,
            result.albums,
            result.tracks,
            result.failed_ids.len()
        );
        Ok(result)
    }
}

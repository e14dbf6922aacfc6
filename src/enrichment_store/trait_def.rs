use super::models::{
    AudioFeatures, Embedding, EmbeddingCandidate, EmbeddingSubject, EnrichmentStats, EntityKind,
};
use anyhow::Result;

/// Storage for data derived from catalog entities: per-track audio features
/// and per-entity embeddings.
pub trait EnrichmentStore: Send + Sync {
    // =========================================================================
    // Audio Features
    // =========================================================================

    /// Whether the track already has an audio features row.
    fn has_audio_features(&self, track_id: &str) -> Result<bool>;

    /// Create or replace the audio features row of a track.
    fn upsert_audio_features(&self, features: &AudioFeatures) -> Result<()>;

    fn get_audio_features(&self, track_id: &str) -> Result<Option<AudioFeatures>>;

    // =========================================================================
    // Embeddings
    // =========================================================================

    /// Create or replace the embedding of an entity.
    fn upsert_embedding(&self, kind: EntityKind, embedding: &Embedding) -> Result<()>;

    /// Every stored embedding of `kind` whose vector is a non-empty array,
    /// joined with the entity name.
    fn list_embedding_candidates(&self, kind: EntityKind) -> Result<Vec<EmbeddingCandidate>>;

    /// Entities of `kind` that have no embedding yet.
    fn list_subjects_missing_embedding(&self, kind: EntityKind) -> Result<Vec<EmbeddingSubject>>;

    fn get_enrichment_stats(&self) -> Result<EnrichmentStats>;
}

use super::vector::hash_tokens;
use crate::enrichment_store::{Embedding, EmbeddingSubject, EntityKind};
use anyhow::Result;
use serde_json::{Map, Value as JsonValue};

/// Produces an embedding for a catalog entity.
pub trait EmbeddingGenerator: Send + Sync {
    fn embed(&self, subject: &EmbeddingSubject) -> Result<Embedding>;
}

/// Embeds an entity by hashing its descriptive attributes, the same way
/// recommendation queries are built.
pub struct HashingEmbedder {
    vector_dim: usize,
    model_version: String,
}

pub const HASHING_EMBEDDER_QUALITY: f64 = 0.9;

impl HashingEmbedder {
    pub fn new(vector_dim: usize, model_version: impl Into<String>) -> Self {
        Self {
            vector_dim,
            model_version: model_version.into(),
        }
    }

    fn tokens(subject: &EmbeddingSubject) -> Vec<&str> {
        let mut tokens = vec![subject.name.as_str(), subject.id.as_str()];
        match subject.kind {
            EntityKind::Artist => {}
            EntityKind::Album => {
                tokens.extend(subject.artist_names.iter().map(String::as_str));
            }
            EntityKind::Track => {
                tokens.extend(subject.album_name.as_deref());
                tokens.extend(subject.artist_names.iter().map(String::as_str));
            }
        }
        tokens
    }
}

impl EmbeddingGenerator for HashingEmbedder {
    fn embed(&self, subject: &EmbeddingSubject) -> Result<Embedding> {
        let vector = hash_tokens(&Self::tokens(subject), self.vector_dim);
        let mut metadata = Map::new();
        metadata.insert(
            "resource_type".to_string(),
            JsonValue::String(subject.kind.as_str().to_string()),
        );
        Ok(Embedding {
            entity_id: subject.id.clone(),
            vector,
            model_version: self.model_version.clone(),
            quality_score: Some(HASHING_EMBEDDER_QUALITY),
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(kind: EntityKind) -> EmbeddingSubject {
        EmbeddingSubject {
            kind,
            id: "t1".to_string(),
            name: "Schism".to_string(),
            album_name: Some("Lateralus".to_string()),
            artist_names: vec!["TOOL".to_string()],
        }
    }

    #[test]
    fn tokens_depend_on_kind() {
        assert_eq!(HashingEmbedder::tokens(&subject(EntityKind::Artist)), vec!["Schism", "t1"]);
        assert_eq!(
            HashingEmbedder::tokens(&subject(EntityKind::Album)),
            vec!["Schism", "t1", "TOOL"]
        );
        assert_eq!(
            HashingEmbedder::tokens(&subject(EntityKind::Track)),
            vec!["Schism", "t1", "Lateralus", "TOOL"]
        );
    }

    #[test]
    fn embedding_carries_model_and_metadata() {
        let embedder = HashingEmbedder::new(32, "v1.0.0");
        let embedding = embedder.embed(&subject(EntityKind::Track)).unwrap();
        assert_eq!(embedding.vector.len(), 32);
        assert_eq!(embedding.model_version, "v1.0.0");
        assert_eq!(embedding.quality_score, Some(0.9));
        assert_eq!(embedding.metadata["resource_type"], "track");
    }
}

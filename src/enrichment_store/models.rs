//! Data models for per-track audio features and per-entity embeddings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Musical mode of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Major,
    Minor,
}

impl Mode {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "major" => Some(Mode::Major),
            "minor" => Some(Mode::Minor),
            _ => None,
        }
    }

    pub fn to_db_str(self) -> &'static str {
        match self {
            Mode::Major => "major",
            Mode::Minor => "minor",
        }
    }
}

/// Audio features of a single track, as reported by the provider.
///
/// The presence of this row is what marks a track as ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub track_id: String,
    pub energy: f64,
    pub valence: f64,
    pub tempo: f64,
    pub key: i32,
    pub mode: Mode,
    pub danceability: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub speechiness: f64,
    pub loudness: f64,
    pub time_signature: i32,
}

/// Catalog entity kinds that can carry an embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Artist,
    Album,
    Track,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Artist, EntityKind::Album, EntityKind::Track];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::Album => "album",
            EntityKind::Track => "track",
        }
    }

    pub(crate) fn entity_table(self) -> &'static str {
        match self {
            EntityKind::Artist => "artists",
            EntityKind::Album => "albums",
            EntityKind::Track => "tracks",
        }
    }

    pub(crate) fn embedding_table(self) -> &'static str {
        match self {
            EntityKind::Artist => "artist_embeddings",
            EntityKind::Album => "album_embeddings",
            EntityKind::Track => "track_embeddings",
        }
    }

    pub(crate) fn entity_column(self) -> &'static str {
        match self {
            EntityKind::Artist => "artist_rowid",
            EntityKind::Album => "album_rowid",
            EntityKind::Track => "track_rowid",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An embedding to be written for one catalog entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub entity_id: String,
    pub vector: Vec<f64>,
    pub model_version: String,
    pub quality_score: Option<f64>,
    pub metadata: Map<String, JsonValue>,
}

/// A stored embedding joined with the entity it describes, ready for scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingCandidate {
    pub name: String,
    pub external_id: String,
    pub vector: Vec<f64>,
    pub model_version: Option<String>,
    pub quality_score: Option<f64>,
    pub metadata: Map<String, JsonValue>,
}

/// A catalog entity that has no embedding yet, with the attributes an
/// embedding generator needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingSubject {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    pub album_name: Option<String>,
    pub artist_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentStats {
    pub tracks_with_features: usize,
    pub artist_embeddings: usize,
    pub album_embeddings: usize,
    pub track_embeddings: usize,
}

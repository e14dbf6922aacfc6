use super::vector::{cosine, fit_to_dimension, hash_tokens, norm};
use crate::enrichment_store::{EmbeddingCandidate, EnrichmentStore, EntityKind};
use crate::server::metrics;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_VECTOR_DIM: usize = 32;
pub const DEFAULT_MODEL_VERSION: &str = "v1.0.0";
pub const DEFAULT_LIMIT: usize = 10;
pub const DEFAULT_MAX_LIMIT: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecommendError {
    #[error("at least one seed is required")]
    NoSeeds,

    #[error("limit must be between 1 and {max}, got {limit}")]
    InvalidLimit { limit: usize, max: usize },

    #[error("seeds hash to a zero query vector")]
    ZeroQueryVector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Artists,
    Albums,
    Tracks,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [ResourceType::Artists, ResourceType::Albums, ResourceType::Tracks];

    pub fn entity_kind(self) -> EntityKind {
        match self {
            ResourceType::Artists => EntityKind::Artist,
            ResourceType::Albums => EntityKind::Album,
            ResourceType::Tracks => EntityKind::Track,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Artists => "artists",
            ResourceType::Albums => "albums",
            ResourceType::Tracks => "tracks",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "artists" | "artist" => Some(ResourceType::Artists),
            "albums" | "album" => Some(ResourceType::Albums),
            "tracks" | "track" => Some(ResourceType::Tracks),
            _ => None,
        }
    }
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub albums: Vec<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Empty means all resource types.
    #[serde(default)]
    pub resource_types: Vec<ResourceType>,
}

impl Default for RecommendationRequest {
    fn default() -> Self {
        Self {
            artists: vec![],
            albums: vec![],
            tracks: vec![],
            genres: vec![],
            limit: DEFAULT_LIMIT,
            resource_types: vec![],
        }
    }
}

fn normalize_seeds(seeds: &[String]) -> Vec<String> {
    seeds
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

impl RecommendationRequest {
    /// Seed lists trimmed, deduplicated and sorted; resource types defaulted
    /// and deduplicated.
    pub fn normalized(&self) -> Self {
        let mut resource_types: Vec<ResourceType> = Vec::new();
        for rt in &self.resource_types {
            if !resource_types.contains(rt) {
                resource_types.push(*rt);
            }
        }
        if resource_types.is_empty() {
            resource_types = ResourceType::ALL.to_vec();
        }
        Self {
            artists: normalize_seeds(&self.artists),
            albums: normalize_seeds(&self.albums),
            tracks: normalize_seeds(&self.tracks),
            genres: normalize_seeds(&self.genres),
            limit: self.limit,
            resource_types,
        }
    }

    pub fn seeds(&self) -> Vec<&str> {
        self.artists
            .iter()
            .chain(&self.albums)
            .chain(&self.tracks)
            .chain(&self.genres)
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub name: String,
    pub likeness: f64,
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub artists: Vec<RecommendationItem>,
    pub albums: Vec<RecommendationItem>,
    pub tracks: Vec<RecommendationItem>,
    pub model_version: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RecommenderSettings {
    pub vector_dim: usize,
    pub model_version: String,
    pub max_limit: usize,
}

impl Default for RecommenderSettings {
    fn default() -> Self {
        Self {
            vector_dim: DEFAULT_VECTOR_DIM,
            model_version: DEFAULT_MODEL_VERSION.to_string(),
            max_limit: DEFAULT_MAX_LIMIT,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn extra_for(candidate: &EmbeddingCandidate, default_model_version: &str) -> Map<String, JsonValue> {
    let mut extra = Map::new();
    extra.insert(
        "external_id".to_string(),
        JsonValue::String(candidate.external_id.clone()),
    );
    extra.insert(
        "model_version".to_string(),
        JsonValue::String(
            candidate
                .model_version
                .clone()
                .unwrap_or_else(|| default_model_version.to_string()),
        ),
    );
    if let Some(quality) = candidate.quality_score {
        extra.insert("quality_score".to_string(), JsonValue::from(quality));
    }
    if !candidate.metadata.is_empty() {
        extra.insert(
            "metadata".to_string(),
            JsonValue::Object(candidate.metadata.clone()),
        );
    }
    extra
}

/// Rank `candidates` by cosine similarity to `query`.
///
/// `exclude` holds lowercased seed names. Candidate vectors are fitted to the
/// query's dimension; zero-norm candidates are dropped.
pub fn rank_candidates(
    query: &[f64],
    candidates: &[EmbeddingCandidate],
    limit: usize,
    exclude: &HashSet<String>,
    default_model_version: &str,
) -> Vec<RecommendationItem> {
    if candidates.is_empty() || norm(query) == 0.0 {
        return vec![];
    }

    let mut ranked: Vec<RecommendationItem> = candidates
        .iter()
        .filter(|c| !c.name.is_empty() && !exclude.contains(&c.name.to_lowercase()))
        .filter_map(|c| {
            let vector = fit_to_dimension(&c.vector, query.len());
            let score = cosine(query, &vector)?.clamp(0.0, 1.0);
            Some(RecommendationItem {
                name: c.name.clone(),
                likeness: round2(score),
                extra: extra_for(c, default_model_version),
            })
        })
        .collect();

    ranked.sort_by(|a, b| b.likeness.total_cmp(&a.likeness));
    ranked.truncate(limit);
    ranked
}

/// Scores stored embeddings against a seed set. Holds no per-request state.
pub struct Recommender {
    enrichment_store: Arc<dyn EnrichmentStore>,
    settings: RecommenderSettings,
}

impl Recommender {
    pub fn new(enrichment_store: Arc<dyn EnrichmentStore>, settings: RecommenderSettings) -> Self {
        Self {
            enrichment_store,
            settings,
        }
    }

    pub fn recommend(&self, request: &RecommendationRequest) -> Result<RecommendationResponse> {
        let request = request.normalized();
        if request.limit == 0 || request.limit > self.settings.max_limit {
            return Err(RecommendError::InvalidLimit {
                limit: request.limit,
                max: self.settings.max_limit,
            }
            .into());
        }

        let seeds = request.seeds();
        if seeds.is_empty() {
            return Err(RecommendError::NoSeeds.into());
        }
        let query = hash_tokens(&seeds, self.settings.vector_dim);
        if norm(&query) == 0.0 {
            return Err(RecommendError::ZeroQueryVector.into());
        }
        let exclude: HashSet<String> = seeds.iter().map(|s| s.to_lowercase()).collect();

        let mut response = RecommendationResponse {
            artists: vec![],
            albums: vec![],
            tracks: vec![],
            model_version: self.settings.model_version.clone(),
            generated_at: Utc::now(),
        };

        for resource_type in &request.resource_types {
            let candidates = self
                .enrichment_store
                .list_embedding_candidates(resource_type.entity_kind())?;
            let ranked = rank_candidates(
                &query,
                &candidates,
                request.limit,
                &exclude,
                &self.settings.model_version,
            );
            debug!(
                "Ranked {} of {} {} candidates",
                ranked.len(),
                candidates.len(),
                resource_type.as_str()
            );
            metrics::record_recommendation(resource_type.as_str());
            match resource_type {
                ResourceType::Artists => response.artists = ranked,
                ResourceType::Albums => response.albums = ranked,
                ResourceType::Tracks => response.tracks = ranked,
            }
        }

        response.generated_at = Utc::now();
        Ok(response)
    }
}

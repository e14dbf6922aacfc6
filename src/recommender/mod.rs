//! Embedding-based recommendations.
//!
//! Seeds are hashed into a query vector and compared against stored
//! embeddings by cosine similarity. Embeddings are produced by an
//! [`EmbeddingGenerator`] through [`EmbeddingSyncEngine`].

mod embedder;
mod embedding_sync;
mod scorer;
pub mod vector;

pub use embedder::{EmbeddingGenerator, HashingEmbedder, HASHING_EMBEDDER_QUALITY};
pub use embedding_sync::{EmbeddingSyncEngine, EmbeddingSyncResult};
pub use scorer::{
    rank_candidates, RecommendError, RecommendationItem, RecommendationRequest,
    RecommendationResponse, Recommender, RecommenderSettings, ResourceType, DEFAULT_LIMIT,
    DEFAULT_MAX_LIMIT, DEFAULT_MODEL_VERSION, DEFAULT_VECTOR_DIM,
};

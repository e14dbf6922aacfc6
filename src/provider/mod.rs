//! Access to the streaming provider's catalog.
//!
//! Engines depend only on [`MusicProvider`]. [`SpotifyProvider`] talks to the
//! real Web API, [`FixtureProvider`] returns deterministic data for tests and
//! offline runs. The implementation is chosen once, in [`build_provider`].

mod fixture;
mod models;
mod spotify;

pub use fixture::{
    FixtureProvider, DISPOSITION_TRACK_ID, FIXTURE_GENRE_SEEDS, LATERALUS_ALBUM_ID, TOOL_ARTIST_ID,
};
pub use models::*;
pub use spotify::{
    SpotifyProvider, SpotifyProviderSettings, DEFAULT_API_BASE_URL, DEFAULT_TOKEN_URL,
};

use std::sync::Arc;
use thiserror::Error;

/// The provider answers at most this many ids per audio-features call.
pub const MAX_FEATURE_BATCH: usize = 50;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limited by provider (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Catalog lookups against the streaming provider.
///
/// Every call may fail transiently; callers treat failures as local to the
/// unit of work they are processing.
pub trait MusicProvider: Send + Sync {
    /// Artists tagged with `seed`, at most `limit` of them.
    fn search_by_genre(&self, seed: &str, limit: usize) -> Result<Vec<ArtistPayload>, ProviderError>;

    /// Full-length albums of an artist, all pages.
    fn list_albums(&self, artist_id: &str) -> Result<Vec<AlbumPayload>, ProviderError>;

    /// Tracks of an album, all pages.
    fn list_tracks(&self, album_id: &str) -> Result<Vec<TrackPayload>, ProviderError>;

    /// Audio features for up to [`MAX_FEATURE_BATCH`] tracks.
    ///
    /// The result is positional; `None` marks a track the provider omitted.
    fn batch_features(&self, track_ids: &[String]) -> Result<Vec<Option<FeaturePayload>>, ProviderError>;

    fn get_artist(&self, id: &str) -> Result<ArtistPayload, ProviderError>;

    fn get_album(&self, id: &str) -> Result<AlbumPayload, ProviderError>;

    fn get_track(&self, id: &str) -> Result<TrackPayload, ProviderError>;

    /// Genre names the provider accepts as recommendation seeds.
    fn genre_seeds(&self) -> Result<Vec<String>, ProviderError>;
}

/// Pick the provider implementation for this process.
pub fn build_provider(
    use_stub_data: bool,
    settings: Option<SpotifyProviderSettings>,
) -> anyhow::Result<Arc<dyn MusicProvider>> {
    if use_stub_data {
        return Ok(Arc::new(FixtureProvider::new()));
    }
    let Some(settings) = settings else {
        anyhow::bail!("Spotify credentials are required unless stub data is enabled");
    };
    Ok(Arc::new(SpotifyProvider::new(settings)?))
}

//! Spotify Web API client.
//!
//! Uses the client-credentials flow; the access token is cached until shortly
//! before it expires. Requests are spaced by a minimum interval.

use super::models::*;
use super::{MusicProvider, ProviderError, MAX_FEATURE_BATCH};
use crate::server::metrics;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Refresh the token this long before the provider says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// Tokens are never cached longer than this, whatever `expires_in` says.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 3600);
/// Characters of an error body kept in `ProviderError::Status`.
const ERROR_BODY_LIMIT: usize = 512;
const PAGE_SIZE: usize = 50;
const MAX_PAGES: usize = 40;

#[derive(Debug, Clone)]
pub struct SpotifyProviderSettings {
    pub client_id: String,
    pub client_secret: String,
    pub api_base_url: String,
    pub token_url: String,
    pub timeout: Duration,
    pub rate_limit_interval: Duration,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct SpotifyProvider {
    client: Client,
    settings: SpotifyProviderSettings,
    token: Mutex<Option<CachedToken>>,
    last_request: Mutex<Option<Instant>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct ArtistSearchResponse {
    artists: Page<ArtistPayload>,
}

#[derive(Deserialize)]
struct AudioFeaturesResponse {
    audio_features: Vec<Option<serde_json::Value>>,
}

#[derive(Deserialize)]
struct GenreSeedsResponse {
    genres: Vec<String>,
}

impl SpotifyProvider {
    pub fn new(settings: SpotifyProviderSettings) -> Result<Self, ProviderError> {
        if settings.client_id.is_empty() || settings.client_secret.is_empty() {
            return Err(ProviderError::Unavailable(
                "client id and secret must be set".to_string(),
            ));
        }
        let client = Client::builder().timeout(settings.timeout).build()?;
        let api_base_url = settings.api_base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            settings: SpotifyProviderSettings {
                api_base_url,
                ..settings
            },
            token: Mutex::new(None),
            last_request: Mutex::new(None),
        })
    }

    fn rate_limit(&self) {
        let interval = self.settings.rate_limit_interval;
        let mut last = self.last_request.lock().unwrap();
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }

    fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().unwrap();
        if let Some(token) = cached.as_ref() {
            let remaining = token.expires_at.saturating_duration_since(Instant::now());
            if remaining > TOKEN_EXPIRY_MARGIN {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Requesting new Spotify access token");
        let credentials = BASE64.encode(format!(
            "{}:{}",
            self.settings.client_id, self.settings.client_secret
        ));
        let response = self
            .client
            .post(&self.settings.token_url)
            .header("Authorization", format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials")])
            .send()?;
        let response = check_status(response)?;
        let body: TokenResponse = response
            .json()
            .map_err(|e| ProviderError::InvalidPayload(format!("token response: {}", e)))?;

        let now = Instant::now();
        let lifetime = Duration::from_secs(body.expires_in).min(MAX_TOKEN_LIFETIME);
        let token = body.access_token.clone();
        *cached = Some(CachedToken {
            access_token: body.access_token,
            expires_at: now.checked_add(lifetime).unwrap_or(now),
        });
        Ok(token)
    }

    fn get_json<T: DeserializeOwned>(&self, operation: &str, url: &str) -> Result<T, ProviderError> {
        let result = self.get_json_inner(url);
        let status = match &result {
            Ok(_) => "ok",
            Err(ProviderError::RateLimited { .. }) => "rate_limited",
            Err(ProviderError::Status { .. }) => "http_error",
            Err(ProviderError::InvalidPayload(_)) => "invalid_payload",
            Err(_) => "error",
        };
        metrics::record_provider_request(operation, status);
        result
    }

    fn get_json_inner<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        let token = self.access_token()?;
        self.rate_limit();

        let response = self.client.get(url).bearer_auth(token).send()?;
        if response.status() == StatusCode::UNAUTHORIZED {
            *self.token.lock().unwrap() = None;
        }
        let response = check_status(response)?;
        response
            .json()
            .map_err(|e| ProviderError::InvalidPayload(format!("{}: {}", url, e)))
    }

    fn get_all_pages<T: DeserializeOwned>(
        &self,
        operation: &str,
        first_url: String,
    ) -> Result<Vec<T>, ProviderError> {
        let mut items = Vec::new();
        let mut next = Some(first_url);
        let mut pages = 0;
        while let Some(url) = next {
            if pages == MAX_PAGES {
                warn!("Stopping {} after {} pages", operation, MAX_PAGES);
                break;
            }
            let page: Page<T> = self.get_json(operation, &url)?;
            items.extend(page.items);
            next = page.next;
            pages += 1;
        }
        Ok(items)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.api_base_url, path)
    }
}

fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        return Err(ProviderError::RateLimited { retry_after_secs });
    }
    if !status.is_success() {
        let body: String = response
            .text()
            .unwrap_or_default()
            .chars()
            .take(ERROR_BODY_LIMIT)
            .collect();
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

impl MusicProvider for SpotifyProvider {
    fn search_by_genre(&self, seed: &str, limit: usize) -> Result<Vec<ArtistPayload>, ProviderError> {
        let query = format!("genre:\"{}\"", seed);
        let url = self.url(&format!(
            "/v1/search?q={}&type=artist&limit={}",
            urlencoding::encode(&query),
            limit.clamp(1, PAGE_SIZE)
        ));
        let response: ArtistSearchResponse = self.get_json("search", &url)?;
        let mut artists = response.artists.items;
        artists.truncate(limit);
        for artist in &artists {
            artist.validate()?;
        }
        Ok(artists)
    }

    fn list_albums(&self, artist_id: &str) -> Result<Vec<AlbumPayload>, ProviderError> {
        let url = self.url(&format!(
            "/v1/artists/{}/albums?include_groups=album&limit={}",
            urlencoding::encode(artist_id),
            PAGE_SIZE
        ));
        let albums: Vec<AlbumPayload> = self.get_all_pages("artist_albums", url)?;
        for album in &albums {
            album.validate()?;
        }
        Ok(albums)
    }

    fn list_tracks(&self, album_id: &str) -> Result<Vec<TrackPayload>, ProviderError> {
        let url = self.url(&format!(
            "/v1/albums/{}/tracks?limit={}",
            urlencoding::encode(album_id),
            PAGE_SIZE
        ));
        let tracks: Vec<TrackPayload> = self.get_all_pages("album_tracks", url)?;
        for track in &tracks {
            track.validate()?;
        }
        Ok(tracks)
    }

    fn batch_features(&self, track_ids: &[String]) -> Result<Vec<Option<FeaturePayload>>, ProviderError> {
        if track_ids.len() > MAX_FEATURE_BATCH {
            return Err(ProviderError::InvalidRequest(format!(
                "at most {} track ids per audio features call, got {}",
                MAX_FEATURE_BATCH,
                track_ids.len()
            )));
        }
        if track_ids.is_empty() {
            return Ok(vec![]);
        }

        let ids = track_ids
            .iter()
            .map(|id| urlencoding::encode(id).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        let url = self.url(&format!("/v1/audio-features?ids={}", ids));
        let response: AudioFeaturesResponse = self.get_json("audio_features", &url)?;

        let features = response
            .audio_features
            .into_iter()
            .map(|entry| {
                let value = entry?;
                match serde_json::from_value::<FeaturePayload>(value) {
                    Ok(payload) if payload.validate().is_ok() => Some(payload),
                    Ok(payload) => {
                        warn!("Dropping audio features entry without id ({:?})", payload);
                        None
                    }
                    Err(e) => {
                        warn!("Dropping malformed audio features entry: {}", e);
                        None
                    }
                }
            })
            .collect();
        Ok(features)
    }

    fn get_artist(&self, id: &str) -> Result<ArtistPayload, ProviderError> {
        let url = self.url(&format!("/v1/artists/{}", urlencoding::encode(id)));
        let artist: ArtistPayload = self.get_json("artist", &url)?;
        artist.validate()?;
        Ok(artist)
    }

    fn get_album(&self, id: &str) -> Result<AlbumPayload, ProviderError> {
        let url = self.url(&format!("/v1/albums/{}", urlencoding::encode(id)));
        let album: AlbumPayload = self.get_json("album", &url)?;
        album.validate()?;
        Ok(album)
    }

    fn get_track(&self, id: &str) -> Result<TrackPayload, ProviderError> {
        let url = self.url(&format!("/v1/tracks/{}", urlencoding::encode(id)));
        let track: TrackPayload = self.get_json("track", &url)?;
        track.validate()?;
        Ok(track)
    }

    fn genre_seeds(&self) -> Result<Vec<String>, ProviderError> {
        let url = self.url("/v1/recommendations/available-genre-seeds");
        let response: GenreSeedsResponse = self.get_json("genre_seeds", &url)?;
        Ok(response.genres)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment_store::Mode;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode as HttpStatus;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value as JsonValue};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn settings() -> SpotifyProviderSettings {
        SpotifyProviderSettings {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            // Nothing listens here; tests below must fail before any request.
            api_base_url: "http://127.0.0.1:9/".to_string(),
            token_url: "http://127.0.0.1:9/token".to_string(),
            timeout: Duration::from_secs(1),
            rate_limit_interval: Duration::from_millis(0),
        }
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let mut settings = settings();
        settings.client_secret.clear();
        assert!(matches!(
            SpotifyProvider::new(settings),
            Err(ProviderError::Unavailable(_))
        ));
    }

    #[test]
    fn oversized_feature_batch_is_rejected_without_network() {
        let provider = SpotifyProvider::new(settings()).unwrap();
        let ids: Vec<String> = (0..=MAX_FEATURE_BATCH).map(|i| format!("t{}", i)).collect();
        assert!(matches!(
            provider.batch_features(&ids),
            Err(ProviderError::InvalidRequest(_))
        ));
        assert!(provider.batch_features(&[]).unwrap().is_empty());
    }

    // =========================================================================
    // Local Provider Server
    // =========================================================================

    #[derive(Clone)]
    struct ServerState {
        base_url: String,
        token_expires_in: u64,
        token_requests: Arc<AtomicUsize>,
    }

    /// A provider lookalike on a local port, served from its own runtime so
    /// the blocking client can be used from the test thread.
    struct LocalProvider {
        base_url: String,
        token_requests: Arc<AtomicUsize>,
        _runtime: tokio::runtime::Runtime,
    }

    impl LocalProvider {
        fn start(token_expires_in: u64) -> Self {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            let listener = runtime
                .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
                .unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let token_requests = Arc::new(AtomicUsize::new(0));
            let state = ServerState {
                base_url: base_url.clone(),
                token_expires_in,
                token_requests: token_requests.clone(),
            };

            let app = Router::new()
                .route("/token", post(token))
                .route("/token-unavailable", post(token_unavailable))
                .route("/v1/search", get(search))
                .route("/v1/artists/{id}", get(artist))
                .route("/v1/artists/{id}/albums", get(artist_albums))
                .route("/v1/audio-features", get(audio_features))
                .with_state(state);
            runtime.spawn(async move {
                axum::serve(listener, app).await.ok();
            });

            Self {
                base_url,
                token_requests,
                _runtime: runtime,
            }
        }

        fn provider(&self) -> SpotifyProvider {
            self.provider_with_token_path("/token")
        }

        fn provider_with_token_path(&self, token_path: &str) -> SpotifyProvider {
            SpotifyProvider::new(SpotifyProviderSettings {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                api_base_url: self.base_url.clone(),
                token_url: format!("{}{}", self.base_url, token_path),
                timeout: Duration::from_secs(5),
                rate_limit_interval: Duration::from_millis(0),
            })
            .unwrap()
        }

        fn token_requests(&self) -> usize {
            self.token_requests.load(Ordering::SeqCst)
        }
    }

    async fn token(State(state): State<ServerState>) -> Json<JsonValue> {
        state.token_requests.fetch_add(1, Ordering::SeqCst);
        Json(json!({
            "access_token": "local-token",
            "token_type": "Bearer",
            "expires_in": state.token_expires_in,
        }))
    }

    async fn token_unavailable() -> impl IntoResponse {
        // Byte 512 falls inside a two-byte character.
        let body = format!("{}{}", "x".repeat(511), "é".repeat(10));
        (HttpStatus::INTERNAL_SERVER_ERROR, body)
    }

    async fn search() -> impl IntoResponse {
        (HttpStatus::TOO_MANY_REQUESTS, [("Retry-After", "7")], "slow down")
    }

    async fn artist(Path(id): Path<String>) -> Json<JsonValue> {
        Json(json!({ "id": id, "name": "Local Artist", "genres": ["math rock"] }))
    }

    async fn artist_albums(
        State(state): State<ServerState>,
        Path(id): Path<String>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<JsonValue> {
        let (index, next) = match params.get("page").map(String::as_str) {
            Some("2") => (1, JsonValue::Null),
            _ => (
                0,
                json!(format!("{}/v1/artists/{}/albums?page=2", state.base_url, id)),
            ),
        };
        Json(json!({
            "items": [{
                "id": format!("{}-album-{}", id, index),
                "name": format!("Album {}", index),
                "album_type": "album",
                "total_tracks": 1,
                "release_date": "2001",
                "release_date_precision": "year",
                "artists": [{ "id": id, "name": "Local Artist" }],
            }],
            "next": next,
        }))
    }

    async fn audio_features(Query(params): Query<HashMap<String, String>>) -> Json<JsonValue> {
        let entries: Vec<JsonValue> = params
            .get("ids")
            .map(|ids| ids.split(',').collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
            .map(|id| {
                if id.starts_with("missing") {
                    JsonValue::Null
                } else {
                    json!({
                        "id": id,
                        "energy": 0.5, "valence": 0.25, "tempo": 120.0, "key": 5, "mode": 1,
                        "danceability": 0.1, "acousticness": 0.2, "instrumentalness": 0.3,
                        "liveness": 0.4, "speechiness": 0.05, "loudness": -7.5,
                        "time_signature": 4,
                    })
                }
            })
            .collect();
        Json(json!({ "audio_features": entries }))
    }

    #[test]
    fn token_is_reused_until_close_to_expiry() {
        let server = LocalProvider::start(3600);
        let provider = server.provider();

        provider.get_artist("a1").unwrap();
        provider.get_artist("a2").unwrap();

        assert_eq!(server.token_requests(), 1);
    }

    #[test]
    fn token_inside_expiry_margin_is_refreshed() {
        // Expires in less than the refresh margin, so every call needs a new one.
        let server = LocalProvider::start(30);
        let provider = server.provider();

        provider.get_artist("a1").unwrap();
        provider.get_artist("a2").unwrap();

        assert_eq!(server.token_requests(), 2);
    }

    #[test]
    fn huge_expires_in_is_capped() {
        let server = LocalProvider::start(u64::MAX);
        let provider = server.provider();

        provider.get_artist("a1").unwrap();
        provider.get_artist("a2").unwrap();

        assert_eq!(server.token_requests(), 1);
    }

    #[test]
    fn album_pages_are_followed_through_next() {
        let server = LocalProvider::start(3600);
        let albums = server.provider().list_albums("a1").unwrap();

        let ids: Vec<&str> = albums.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1-album-0", "a1-album-1"]);
    }

    #[test]
    fn too_many_requests_carries_retry_after() {
        let server = LocalProvider::start(3600);
        let result = server.provider().search_by_genre("math rock", 20);

        assert!(matches!(
            result,
            Err(ProviderError::RateLimited {
                retry_after_secs: Some(7)
            })
        ));
    }

    #[test]
    fn null_feature_entries_are_omitted() {
        let server = LocalProvider::start(3600);
        let ids = vec!["t1".to_string(), "missing-t2".to_string()];

        let features = server.provider().batch_features(&ids).unwrap();

        assert_eq!(features.len(), 2);
        let first = features[0].as_ref().unwrap();
        assert_eq!(first.id, "t1");
        assert_eq!(first.mode, Mode::Major);
        assert_eq!(first.time_signature, 4);
        assert!(features[1].is_none());
    }

    #[test]
    fn non_ascii_error_body_is_truncated_on_char_boundary() {
        let server = LocalProvider::start(3600);
        let provider = server.provider_with_token_path("/token-unavailable");

        match provider.get_artist("a1") {
            Err(ProviderError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body.chars().count(), ERROR_BODY_LIMIT);
                assert!(body.ends_with('é'));
            }
            other => panic!("expected a status error, got {:?}", other.map(|a| a.id)),
        }
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let provider = SpotifyProvider::new(settings()).unwrap();
        assert_eq!(provider.url("/v1/artists/x"), "http://127.0.0.1:9/v1/artists/x");
    }
}

//! Test catalogs and a scriptable provider

use juke_catalog::catalog_store::{Album, Artist, ArtistRef, CatalogStore, ReleaseDatePrecision, SqliteCatalogStore, Track};
use juke_catalog::crawl::{CrawlEngine, CrawlSettings};
use juke_catalog::feature_ingest::{FeatureIngestionEngine, IngestSettings};
use juke_catalog::provider::{
    AlbumPayload, ArtistPayload, FeaturePayload, FixtureProvider, MusicProvider, ProviderError,
    TrackPayload,
};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A catalog database in a temporary directory.
pub struct TestCatalog {
    pub store: Arc<SqliteCatalogStore>,
    _temp_dir: TempDir,
}

impl TestCatalog {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteCatalogStore::new(temp_dir.path().join("catalog.db")).unwrap());
        Self {
            store,
            _temp_dir: temp_dir,
        }
    }

    pub fn crawl_engine(&self, provider: Arc<dyn MusicProvider>) -> CrawlEngine {
        CrawlEngine::new(self.store.clone(), provider, CrawlSettings::default())
    }

    pub fn ingest_engine(&self, provider: Arc<dyn MusicProvider>, batch_size: usize) -> FeatureIngestionEngine {
        FeatureIngestionEngine::new(
            self.store.clone(),
            self.store.clone(),
            provider,
            IngestSettings { batch_size },
        )
    }

    /// Insert an artist with one album and the given (track id, track number) pairs, in order.
    pub fn insert_artist_with_album(&self, artist_name: &str, album_name: &str, tracks: &[(&str, i32)]) {
        let artist_id = artist_name.to_lowercase().replace(' ', "-");
        let album_id = format!("{}-album", artist_id);
        self.store
            .upsert_artist(&Artist {
                id: artist_id.clone(),
                name: artist_name.to_string(),
                genres: vec![],
                popularity: 0,
                followers_total: 0,
                uri: None,
                image_urls: vec![],
            })
            .unwrap();
        self.store
            .upsert_album(
                &Album {
                    id: album_id.clone(),
                    name: album_name.to_string(),
                    album_type: "ALBUM".to_string(),
                    total_tracks: tracks.len() as i32,
                    release_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                    release_date_precision: ReleaseDatePrecision::Day,
                    uri: None,
                },
                &[ArtistRef {
                    id: artist_id,
                    name: artist_name.to_string(),
                }],
            )
            .unwrap();
        for (track_id, track_number) in tracks {
            self.store
                .upsert_track(&Track {
                    id: track_id.to_string(),
                    name: format!("Track {}", track_number),
                    album_id: album_id.clone(),
                    track_number: *track_number,
                    disc_number: 1,
                    duration_ms: 200_000,
                    explicit: false,
                    uri: None,
                })
                .unwrap();
        }
    }
}

/// `FixtureProvider` with injectable failures and a record of calls.
#[derive(Default)]
pub struct ScriptedProvider {
    inner: FixtureProvider,
    /// Seeds whose genre search fails.
    pub failing_seeds: HashSet<String>,
    /// Artists whose album listing fails.
    pub failing_album_artists: HashSet<String>,
    /// Zero-based indices of `batch_features` calls that fail.
    pub failing_feature_batches: HashSet<usize>,
    /// Tracks the provider leaves out of feature responses.
    pub omitted_feature_ids: HashSet<String>,
    /// Albums that get an extra track reusing track number 1.
    pub duplicate_number_albums: HashSet<String>,
    feature_calls: Mutex<Vec<Vec<String>>>,
    album_calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feature_calls(&self) -> Vec<Vec<String>> {
        self.feature_calls.lock().unwrap().clone()
    }

    pub fn album_calls(&self) -> Vec<String> {
        self.album_calls.lock().unwrap().clone()
    }
}

fn transient(what: &str) -> ProviderError {
    ProviderError::Unavailable(format!("scripted failure: {}", what))
}

impl MusicProvider for ScriptedProvider {
    fn search_by_genre(&self, seed: &str, limit: usize) -> Result<Vec<ArtistPayload>, ProviderError> {
        if self.failing_seeds.contains(seed) {
            return Err(transient(seed));
        }
        self.inner.search_by_genre(seed, limit)
    }

    fn list_albums(&self, artist_id: &str) -> Result<Vec<AlbumPayload>, ProviderError> {
        self.album_calls.lock().unwrap().push(artist_id.to_string());
        if self.failing_album_artists.contains(artist_id) {
            return Err(transient(artist_id));
        }
        self.inner.list_albums(artist_id)
    }

    fn list_tracks(&self, album_id: &str) -> Result<Vec<TrackPayload>, ProviderError> {
        let mut tracks = self.inner.list_tracks(album_id)?;
        if self.duplicate_number_albums.contains(album_id) {
            let mut duplicate = tracks[0].clone();
            duplicate.id = format!("{}-track-dup", album_id);
            duplicate.name = "Duplicate Track".to_string();
            tracks.insert(1, duplicate);
        }
        Ok(tracks)
    }

    fn batch_features(&self, track_ids: &[String]) -> Result<Vec<Option<FeaturePayload>>, ProviderError> {
        let call_index = {
            let mut calls = self.feature_calls.lock().unwrap();
            calls.push(track_ids.to_vec());
            calls.len() - 1
        };
        if self.failing_feature_batches.contains(&call_index) {
            return Err(transient("audio features"));
        }
        let payloads = self.inner.batch_features(track_ids)?;
        Ok(payloads
            .into_iter()
            .map(|p| p.filter(|p| !self.omitted_feature_ids.contains(&p.id)))
            .collect())
    }

    fn get_artist(&self, id: &str) -> Result<ArtistPayload, ProviderError> {
        self.inner.get_artist(id)
    }

    fn get_album(&self, id: &str) -> Result<AlbumPayload, ProviderError> {
        self.inner.get_album(id)
    }

    fn get_track(&self, id: &str) -> Result<TrackPayload, ProviderError> {
        self.inner.get_track(id)
    }

    fn genre_seeds(&self) -> Result<Vec<String>, ProviderError> {
        self.inner.genre_seeds()
    }
}

//! Deterministic, offline provider.
//!
//! Every response is derived from the requested ids, so repeated runs see the
//! same catalog: 10 artists per genre search, 2 albums per artist and 3
//! tracks per album.

use super::models::*;
use super::{MusicProvider, ProviderError, MAX_FEATURE_BATCH};
use crate::enrichment_store::Mode;
use sha2::{Digest, Sha256};

pub const TOOL_ARTIST_ID: &str = "2yEwvVSSSUkcLeSTNyHKh8";
pub const LATERALUS_ALBUM_ID: &str = "5l5m1hnH4punS1GQXgEi3T";
pub const DISPOSITION_TRACK_ID: &str = "1FRlNrHd4OGNIEVgFuX9Fu";

pub const FIXTURE_GENRE_SEEDS: [&str; 10] = [
    "progressive metal",
    "post-rock",
    "experimental jazz",
    "dark ambient",
    "math rock",
    "trip hop",
    "psychedelic rock",
    "noise pop",
    "symphonic metal",
    "electro house",
];

const SEARCH_RESULTS: usize = 10;
const ALBUMS_PER_ARTIST: usize = 2;
const TRACKS_PER_ALBUM: usize = 3;

#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureProvider;

impl FixtureProvider {
    pub fn new() -> Self {
        Self
    }
}

/// Last four characters of an id, used to build readable stub names.
fn suffix(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    chars[chars.len().saturating_sub(4)..].iter().collect()
}

fn build_artist(idx: usize, id: Option<&str>, name: Option<String>) -> ArtistPayload {
    let id = id
        .map(str::to_string)
        .unwrap_or_else(|| format!("stub-artist-{}", idx));
    ArtistPayload {
        uri: Some(format!("spotify:artist:{}", id)),
        name: name.unwrap_or_else(|| format!("Stub Artist {}", idx)),
        id,
        genres: vec!["progressive metal".to_string()],
        popularity: Some(42 + idx as i32),
        followers: Some(FollowersPayload {
            total: Some(1000 + idx as i64),
        }),
        kind: Some("artist".to_string()),
        images: vec![],
    }
}

fn build_album(
    id: &str,
    name: String,
    release_date: &str,
    total_tracks: i32,
    artists: Vec<ArtistRefPayload>,
) -> AlbumPayload {
    AlbumPayload {
        id: id.to_string(),
        name,
        album_type: Some("album".to_string()),
        total_tracks: Some(total_tracks),
        release_date: Some(release_date.to_string()),
        release_date_precision: Some("day".to_string()),
        artists,
        uri: Some(format!("spotify:album:{}", id)),
    }
}

fn default_artist_ref() -> ArtistRefPayload {
    ArtistRefPayload {
        id: "stub-artist-0".to_string(),
        name: "Stub Artist 0".to_string(),
    }
}

fn build_track(
    id: &str,
    name: String,
    album: AlbumPayload,
    track_number: i32,
    duration_ms: i64,
) -> TrackPayload {
    TrackPayload {
        id: id.to_string(),
        name,
        track_number,
        disc_number: Some(1),
        duration_ms,
        explicit: Some(false),
        artists: album.artists.clone(),
        album: Some(album),
        uri: Some(format!("spotify:track:{}", id)),
    }
}

fn tool() -> ArtistPayload {
    build_artist(0, Some(TOOL_ARTIST_ID), Some("TOOL".to_string()))
}

fn lateralus() -> AlbumPayload {
    build_album(
        LATERALUS_ALBUM_ID,
        "Lateralus".to_string(),
        "2001-05-15",
        13,
        vec![tool().to_ref()],
    )
}

/// Stable value in `[lo, hi)` derived from a track id and a per-field seed.
fn deterministic_float(id: &str, seed: u32, lo: f64, hi: f64) -> f64 {
    let digest = Sha256::digest(format!("{}:{}", id, seed).as_bytes());
    let raw = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as f64
        / u32::MAX as f64;
    ((lo + raw * (hi - lo)) * 10_000.0).round() / 10_000.0
}

fn unit(id: &str, seed: u32) -> f64 {
    deterministic_float(id, seed, 0.0, 1.0)
}

fn fixture_features(track_id: &str) -> FeaturePayload {
    FeaturePayload {
        id: track_id.to_string(),
        energy: unit(track_id, 0),
        valence: unit(track_id, 1),
        tempo: deterministic_float(track_id, 2, 60.0, 200.0),
        key: deterministic_float(track_id, 3, 0.0, 12.0) as i32,
        mode: if unit(track_id, 4) < 0.5 {
            Mode::Minor
        } else {
            Mode::Major
        },
        danceability: unit(track_id, 5),
        acousticness: unit(track_id, 6),
        instrumentalness: unit(track_id, 7),
        liveness: unit(track_id, 8),
        speechiness: unit(track_id, 9),
        loudness: deterministic_float(track_id, 10, -60.0, 0.0),
        time_signature: deterministic_float(track_id, 11, 2.0, 7.0) as i32,
    }
}

impl MusicProvider for FixtureProvider {
    fn search_by_genre(&self, _seed: &str, limit: usize) -> Result<Vec<ArtistPayload>, ProviderError> {
        Ok((0..SEARCH_RESULTS.min(limit))
            .map(|idx| build_artist(idx, None, None))
            .collect())
    }

    fn list_albums(&self, artist_id: &str) -> Result<Vec<AlbumPayload>, ProviderError> {
        let tail = suffix(artist_id);
        let artist = ArtistRefPayload {
            id: artist_id.to_string(),
            name: format!("Stub Artist {}", tail),
        };
        Ok((0..ALBUMS_PER_ARTIST)
            .map(|i| {
                build_album(
                    &format!("{}-album-{}", artist_id, i),
                    format!("Stub Album {}-{}", tail, i),
                    &format!("200{}-06-15", i),
                    TRACKS_PER_ALBUM as i32,
                    vec![artist.clone()],
                )
            })
            .collect())
    }

    fn list_tracks(&self, album_id: &str) -> Result<Vec<TrackPayload>, ProviderError> {
        let tail = suffix(album_id);
        let album = build_album(
            album_id,
            format!("Stub Album {}", tail),
            "2000-01-01",
            TRACKS_PER_ALBUM as i32,
            vec![default_artist_ref()],
        );
        Ok((0..TRACKS_PER_ALBUM)
            .map(|i| {
                build_track(
                    &format!("{}-track-{}", album_id, i),
                    format!("Stub Track {}-{}", tail, i),
                    album.clone(),
                    i as i32 + 1,
                    180_000 + 10_000 * i as i64,
                )
            })
            .collect())
    }

    fn batch_features(&self, track_ids: &[String]) -> Result<Vec<Option<FeaturePayload>>, ProviderError> {
        if track_ids.len() > MAX_FEATURE_BATCH {
            return Err(ProviderError::InvalidRequest(format!(
                "at most {} track ids per audio features call, got {}",
                MAX_FEATURE_BATCH,
                track_ids.len()
            )));
        }
        Ok(track_ids
            .iter()
            .map(|id| Some(fixture_features(id)))
            .collect())
    }

    fn get_artist(&self, id: &str) -> Result<ArtistPayload, ProviderError> {
        if id == TOOL_ARTIST_ID {
            return Ok(tool());
        }
        Ok(build_artist(0, Some(id), Some(format!("Stub Artist {}", suffix(id)))))
    }

    fn get_album(&self, id: &str) -> Result<AlbumPayload, ProviderError> {
        if id == LATERALUS_ALBUM_ID {
            return Ok(lateralus());
        }
        Ok(build_album(
            id,
            format!("Stub Album {}", suffix(id)),
            "2000-01-01",
            10,
            vec![default_artist_ref()],
        ))
    }

    fn get_track(&self, id: &str) -> Result<TrackPayload, ProviderError> {
        if id == DISPOSITION_TRACK_ID {
            return Ok(build_track(
                DISPOSITION_TRACK_ID,
                "Disposition".to_string(),
                lateralus(),
                10,
                286_266,
            ));
        }
        let album = build_album(
            "stub-album-0",
            "Stub Album 0".to_string(),
            "2000-01-01",
            10,
            vec![default_artist_ref()],
        );
        Ok(build_track(id, format!("Stub Track {}", suffix(id)), album, 1, 200_000))
    }

    fn genre_seeds(&self) -> Result<Vec<String>, ProviderError> {
        Ok(FIXTURE_GENRE_SEEDS.iter().map(|s| s.to_string()).collect())
    }
}

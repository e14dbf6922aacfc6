//! Conversions from provider payloads to catalog rows, and the save helpers
//! shared by the crawl and the on-demand fetch path.

use crate::catalog_store::{
    normalize_release_date, Album, Artist, ArtistRef, CatalogError, CatalogStore, Track,
};
use crate::provider::{AlbumPayload, ArtistPayload, ArtistRefPayload, TrackPayload};
use anyhow::Result;

pub(crate) fn artist_from_payload(payload: &ArtistPayload) -> Artist {
    Artist {
        id: payload.id.clone(),
        name: payload.name.clone(),
        genres: payload.genres.clone(),
        popularity: payload.popularity.unwrap_or(0),
        followers_total: payload
            .followers
            .as_ref()
            .and_then(|f| f.total)
            .unwrap_or(0),
        uri: payload.uri.clone(),
        image_urls: payload.images.iter().map(|i| i.url.clone()).collect(),
    }
}

pub(crate) fn album_from_payload(payload: &AlbumPayload) -> Result<Album> {
    let (release_date, release_date_precision) = normalize_release_date(
        payload.release_date.as_deref(),
        payload.release_date_precision.as_deref(),
    )
    .map_err(|e| anyhow::Error::new(e).context(format!("album {}", payload.id)))?;

    Ok(Album {
        id: payload.id.clone(),
        name: payload.name.clone(),
        album_type: payload
            .album_type
            .as_deref()
            .unwrap_or("album")
            .to_uppercase(),
        total_tracks: payload.total_tracks.unwrap_or(0),
        release_date,
        release_date_precision,
        uri: payload.uri.clone(),
    })
}

pub(crate) fn track_from_payload(payload: &TrackPayload, album_id: &str) -> Track {
    Track {
        id: payload.id.clone(),
        name: payload.name.clone(),
        album_id: album_id.to_string(),
        track_number: payload.track_number,
        disc_number: payload.disc_number.unwrap_or(1),
        duration_ms: payload.duration_ms,
        explicit: payload.explicit.unwrap_or(false),
        uri: payload.uri.clone(),
    }
}

fn artist_refs(artists: &[ArtistRefPayload]) -> Vec<ArtistRef> {
    artists
        .iter()
        .map(|a| ArtistRef {
            id: a.id.clone(),
            name: a.name.clone(),
        })
        .collect()
}

/// Returns `true` when the artist was created.
pub(crate) fn save_artist(store: &dyn CatalogStore, payload: &ArtistPayload) -> Result<bool> {
    payload.validate()?;
    store.upsert_artist(&artist_from_payload(payload))
}

/// Returns `true` when the album was created.
pub(crate) fn save_album(store: &dyn CatalogStore, payload: &AlbumPayload) -> Result<bool> {
    payload.validate()?;
    let album = album_from_payload(payload)?;
    store.upsert_album(&album, &artist_refs(&payload.artists))
}

/// Returns `true` when the track was created. The album must already be stored.
pub(crate) fn save_track(store: &dyn CatalogStore, payload: &TrackPayload, album_id: &str) -> Result<bool> {
    payload.validate()?;
    store.upsert_track(&track_from_payload(payload, album_id))
}

/// Whether `err` is the `(album, track_number)` uniqueness violation.
pub(crate) fn is_duplicate_track_number(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<CatalogError>(),
        Some(CatalogError::DuplicateTrackNumber { .. })
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::ReleaseDatePrecision;
    use chrono::NaiveDate;

    fn album_payload(release_date: Option<&str>, precision: Option<&str>) -> AlbumPayload {
        AlbumPayload {
            id: "al1".to_string(),
            name: "Album".to_string(),
            album_type: Some("single".to_string()),
            total_tracks: Some(2),
            release_date: release_date.map(str::to_string),
            release_date_precision: precision.map(str::to_string),
            artists: vec![],
            uri: None,
        }
    }

    #[test]
    fn album_type_is_uppercased_and_date_padded() {
        let album = album_from_payload(&album_payload(Some("1997-08"), Some("month"))).unwrap();
        assert_eq!(album.album_type, "SINGLE");
        assert_eq!(album.release_date, NaiveDate::from_ymd_opt(1997, 8, 1).unwrap());
        assert_eq!(album.release_date_precision, ReleaseDatePrecision::Month);
    }

    #[test]
    fn album_without_release_date_is_invalid() {
        let err = album_from_payload(&album_payload(None, None)).unwrap_err();
        assert!(err.to_string().contains("al1"));
        assert!(err.downcast_ref::<CatalogError>().is_some());
    }

    #[test]
    fn track_defaults() {
        let payload = TrackPayload {
            id: "t1".to_string(),
            name: "Song".to_string(),
            track_number: 4,
            disc_number: None,
            duration_ms: 1000,
            explicit: None,
            album: None,
            artists: vec![],
            uri: None,
        };
        let track = track_from_payload(&payload, "al1");
        assert_eq!(track.disc_number, 1);
        assert!(!track.explicit);
        assert_eq!(track.album_id, "al1");
    }
}

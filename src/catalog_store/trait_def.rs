//! CatalogStore trait definition.
//!
//! The crawl, ingestion and genre sync engines only talk to the catalog
//! through this trait, so tests can run them against a temporary database.

use super::models::{Album, Artist, ArtistRef, Genre, GenreSyncCounts, GenreUpsert, Track};
use anyhow::Result;
use std::collections::HashSet;

/// Trait for catalog storage backends.
pub trait CatalogStore: Send + Sync {
    // =========================================================================
    // Artists
    // =========================================================================

    /// Snapshot of every stored artist id.
    fn list_artist_ids(&self) -> Result<HashSet<String>>;

    /// Insert or update an artist and its genre links.
    ///
    /// Returns `true` when the artist row was created.
    fn upsert_artist(&self, artist: &Artist) -> Result<bool>;

    fn get_artist(&self, id: &str) -> Result<Option<Artist>>;

    /// All artists ordered by `(name, id)`.
    fn list_artists_ordered(&self) -> Result<Vec<Artist>>;

    // =========================================================================
    // Albums
    // =========================================================================

    /// Insert or update an album and link it to `artists`.
    ///
    /// Artists that are not stored yet are created from their reference.
    /// Fails with [`super::CatalogError::NoArtists`] when `artists` is empty.
    /// Returns `true` when the album row was created.
    fn upsert_album(&self, album: &Album, artists: &[ArtistRef]) -> Result<bool>;

    fn get_album(&self, id: &str) -> Result<Option<Album>>;

    /// Number of stored tracks of an album, `None` when the album is unknown.
    fn get_album_track_count(&self, album_id: &str) -> Result<Option<usize>>;

    /// Albums linked to an artist, ordered by name.
    fn list_artist_albums(&self, artist_id: &str) -> Result<Vec<Album>>;

    /// Names of the artists linked to an album, ordered by name.
    fn get_album_artist_names(&self, album_id: &str) -> Result<Vec<String>>;

    /// Delete an album. Fails while the album still has tracks.
    fn delete_album(&self, id: &str) -> Result<bool>;

    // =========================================================================
    // Tracks
    // =========================================================================

    fn track_exists(&self, id: &str) -> Result<bool>;

    /// Insert or update a track.
    ///
    /// Fails with [`super::CatalogError::MissingAlbum`] when the album is not
    /// stored and with [`super::CatalogError::DuplicateTrackNumber`] when
    /// another track of the album already has the same number.
    fn upsert_track(&self, track: &Track) -> Result<bool>;

    fn get_track(&self, id: &str) -> Result<Option<Track>>;

    /// Tracks of an album, ordered by track number.
    fn list_album_tracks(&self, album_id: &str) -> Result<Vec<Track>>;

    fn delete_track(&self, id: &str) -> Result<bool>;

    // =========================================================================
    // Genres
    // =========================================================================

    /// Write a batch of genres in a single transaction.
    ///
    /// Existing rows are matched by id first, then by case-insensitive name.
    fn sync_genres(
        &self,
        genres: &[GenreUpsert],
        synced_at: &str,
        source: &str,
    ) -> Result<GenreSyncCounts>;

    /// All genres ordered by name.
    fn list_genres(&self) -> Result<Vec<Genre>>;

    // =========================================================================
    // Counts (for metrics)
    // =========================================================================

    fn get_artists_count(&self) -> usize;

    fn get_albums_count(&self) -> usize;

    fn get_tracks_count(&self) -> usize;
}

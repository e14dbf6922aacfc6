//! SQLite-backed catalog store.
//!
//! A single connection guarded by a mutex serves reads and writes. Multi-row
//! writes run inside `BEGIN IMMEDIATE` transactions.

use super::error::CatalogError;
use super::models::*;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::CatalogStore;
use crate::sqlite_persistence::migrate_if_needed;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const RELEASE_DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed catalog store.
///
/// Audio features and embeddings live in the same database; see
/// [`crate::enrichment_store`].
#[derive(Clone)]
pub struct SqliteCatalogStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    /// Open (or create) the catalog database at `db_path`, migrating it to the
    /// latest schema version.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let mut conn = Connection::open_with_flags(
            db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open catalog database at {:?}", db_path))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrate_if_needed(&mut conn, CATALOG_VERSIONED_SCHEMAS, "catalog")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        let store = SqliteCatalogStore {
            conn: Arc::new(Mutex::new(conn)),
        };
        info!(
            "Opened catalog: {} artists, {} albums, {} tracks",
            store.get_artists_count(),
            store.get_albums_count(),
            store.get_tracks_count()
        );
        Ok(store)
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction, rolling back on error.
    pub(crate) fn in_transaction<T>(
        conn: &Connection,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        conn.execute("BEGIN IMMEDIATE", [])?;
        match f(conn) {
            Ok(value) => {
                conn.execute("COMMIT", [])?;
                Ok(value)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    // =========================================================================
    // Internal Helper Methods
    // =========================================================================

    pub(crate) fn get_artist_rowid(conn: &Connection, id: &str) -> Result<Option<i64>> {
        match conn.query_row(
            "SELECT rowid FROM artists WHERE id = ?1",
            params![id],
            |r| r.get(0),
        ) {
            Ok(rowid) => Ok(Some(rowid)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn get_album_rowid(conn: &Connection, id: &str) -> Result<Option<i64>> {
        match conn.query_row(
            "SELECT rowid FROM albums WHERE id = ?1",
            params![id],
            |r| r.get(0),
        ) {
            Ok(rowid) => Ok(Some(rowid)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn get_track_rowid(conn: &Connection, id: &str) -> Result<Option<i64>> {
        match conn.query_row(
            "SELECT rowid FROM tracks WHERE id = ?1",
            params![id],
            |r| r.get(0),
        ) {
            Ok(rowid) => Ok(Some(rowid)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn count(&self, table: &str) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
            r.get::<_, i64>(0)
        })
        .map(|n| n as usize)
        .unwrap_or(0)
    }

    fn load_artist_genres(conn: &Connection, artist_rowid: i64) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT g.name FROM artist_genres ag
             JOIN genres g ON g.rowid = ag.genre_rowid
             WHERE ag.artist_rowid = ?1
             ORDER BY g.name",
        )?;
        let genres = stmt
            .query_map(params![artist_rowid], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(genres)
    }

    fn artist_from_row(conn: &Connection, row: ArtistRow) -> Result<Artist> {
        let genres = Self::load_artist_genres(conn, row.rowid)?;
        let image_urls: Vec<String> = serde_json::from_str(&row.image_urls).unwrap_or_default();
        Ok(Artist {
            id: row.id,
            name: row.name,
            genres,
            popularity: row.popularity,
            followers_total: row.followers_total,
            uri: row.uri,
            image_urls,
        })
    }

    fn parse_album_row(row: &rusqlite::Row) -> rusqlite::Result<Album> {
        let release_date: String = row.get(5)?;
        let release_date = NaiveDate::parse_from_str(&release_date, RELEASE_DATE_FORMAT)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
            })?;
        let precision: String = row.get(6)?;
        Ok(Album {
            id: row.get(0)?,
            name: row.get(1)?,
            album_type: row.get(2)?,
            total_tracks: row.get(3)?,
            uri: row.get(4)?,
            release_date,
            release_date_precision: ReleaseDatePrecision::from_db_str(&precision)
                .unwrap_or(ReleaseDatePrecision::Day),
        })
    }

    fn parse_track_row(row: &rusqlite::Row) -> rusqlite::Result<Track> {
        Ok(Track {
            id: row.get(0)?,
            name: row.get(1)?,
            album_id: row.get(2)?,
            track_number: row.get(3)?,
            disc_number: row.get(4)?,
            duration_ms: row.get(5)?,
            explicit: row.get::<_, i32>(6)? != 0,
            uri: row.get(7)?,
        })
    }

    /// Insert a genre by name unless it exists, returning its rowid.
    fn ensure_genre(conn: &Connection, name: &str) -> Result<i64> {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT rowid FROM genres WHERE lower(name) = lower(?1)",
                params![name],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(rowid) = existing {
            return Ok(rowid);
        }
        conn.execute(
            "INSERT INTO genres (id, name) VALUES (?1, ?2)",
            params![format!("genre-{}", name), name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Write an artist row inside an open transaction.
    fn write_artist(conn: &Connection, artist: &Artist) -> Result<(i64, bool)> {
        let image_urls = serde_json::to_string(&artist.image_urls)?;
        match Self::get_artist_rowid(conn, &artist.id)? {
            Some(rowid) => {
                conn.execute(
                    "UPDATE artists SET name = ?1, popularity = ?2, followers_total = ?3, uri = ?4,
                     image_urls = ?5, modified_at = cast(strftime('%s','now') as int)
                     WHERE rowid = ?6",
                    params![
                        &artist.name,
                        artist.popularity,
                        artist.followers_total,
                        &artist.uri,
                        image_urls,
                        rowid
                    ],
                )?;
                Ok((rowid, false))
            }
            None => {
                conn.execute(
                    "INSERT INTO artists (id, name, popularity, followers_total, uri, image_urls)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        &artist.id,
                        &artist.name,
                        artist.popularity,
                        artist.followers_total,
                        &artist.uri,
                        image_urls
                    ],
                )?;
                Ok((conn.last_insert_rowid(), true))
            }
        }
    }
}

struct ArtistRow {
    rowid: i64,
    id: String,
    name: String,
    popularity: i32,
    followers_total: i64,
    uri: Option<String>,
    image_urls: String,
}

const ARTIST_COLUMNS: &str = "rowid, id, name, popularity, followers_total, uri, image_urls";

fn parse_artist_row(row: &rusqlite::Row) -> rusqlite::Result<ArtistRow> {
    Ok(ArtistRow {
        rowid: row.get(0)?,
        id: row.get(1)?,
        name: row.get(2)?,
        popularity: row.get(3)?,
        followers_total: row.get(4)?,
        uri: row.get(5)?,
        image_urls: row.get(6)?,
    })
}

const ALBUM_COLUMNS: &str =
    "al.id, al.name, al.album_type, al.total_tracks, al.uri, al.release_date, al.release_date_precision";

const TRACK_COLUMNS: &str = "t.id, t.name, al.id, t.track_number, t.disc_number, t.duration_ms, t.explicit, t.uri";

/// Turn the `(album_rowid, track_number)` unique violation into a typed error.
fn map_track_write_error(err: rusqlite::Error, track: &Track) -> anyhow::Error {
    if let rusqlite::Error::SqliteFailure(ref failure, Some(ref msg)) = err {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation
            && msg.contains("tracks.track_number")
        {
            return CatalogError::DuplicateTrackNumber {
                album_id: track.album_id.clone(),
                track_number: track.track_number,
            }
            .into();
        }
    }
    err.into()
}

impl CatalogStore for SqliteCatalogStore {
    // =========================================================================
    // Artists
    // =========================================================================

    fn list_artist_ids(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM artists")?;
        let ids = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<HashSet<String>, _>>()?;
        Ok(ids)
    }

    fn upsert_artist(&self, artist: &Artist) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        Self::in_transaction(&conn, |conn| {
            let (artist_rowid, created) = Self::write_artist(conn, artist)?;

            conn.execute(
                "DELETE FROM artist_genres WHERE artist_rowid = ?1",
                params![artist_rowid],
            )?;
            for genre in &artist.genres {
                let genre = genre.trim();
                if genre.is_empty() {
                    continue;
                }
                let genre_rowid = Self::ensure_genre(conn, genre)?;
                conn.execute(
                    "INSERT OR IGNORE INTO artist_genres (artist_rowid, genre_rowid) VALUES (?1, ?2)",
                    params![artist_rowid, genre_rowid],
                )?;
            }
            debug!("Saved artist {} (created: {})", artist.id, created);
            Ok(created)
        })
    }

    fn get_artist(&self, id: &str) -> Result<Option<Artist>> {
        let conn = self.conn.lock().unwrap();
        let row = match conn.query_row(
            &format!("SELECT {} FROM artists WHERE id = ?1", ARTIST_COLUMNS),
            params![id],
            parse_artist_row,
        ) {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(Self::artist_from_row(&conn, row)?))
    }

    fn list_artists_ordered(&self) -> Result<Vec<Artist>> {
        let conn = self.conn.lock().unwrap();
        let rows = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM artists ORDER BY name, id",
                ARTIST_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], parse_artist_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        rows.into_iter()
            .map(|row| Self::artist_from_row(&conn, row))
            .collect()
    }

    // =========================================================================
    // Albums
    // =========================================================================

    fn upsert_album(&self, album: &Album, artists: &[ArtistRef]) -> Result<bool> {
        if artists.is_empty() {
            return Err(CatalogError::NoArtists(album.id.clone()).into());
        }

        let conn = self.conn.lock().unwrap();
        Self::in_transaction(&conn, |conn| {
            let release_date = album.release_date.format(RELEASE_DATE_FORMAT).to_string();
            let (album_rowid, created) = match Self::get_album_rowid(conn, &album.id)? {
                Some(rowid) => {
                    conn.execute(
                        "UPDATE albums SET name = ?1, total_tracks = ?2, release_date = ?3,
                         release_date_precision = ?4, modified_at = cast(strftime('%s','now') as int)
                         WHERE rowid = ?5",
                        params![
                            &album.name,
                            album.total_tracks,
                            release_date,
                            album.release_date_precision.to_db_str(),
                            rowid
                        ],
                    )?;
                    (rowid, false)
                }
                None => {
                    conn.execute(
                        "INSERT INTO albums (id, name, album_type, total_tracks, release_date, release_date_precision, uri)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            &album.id,
                            &album.name,
                            album.album_type.to_uppercase(),
                            album.total_tracks,
                            release_date,
                            album.release_date_precision.to_db_str(),
                            &album.uri
                        ],
                    )?;
                    (conn.last_insert_rowid(), true)
                }
            };

            for artist in artists {
                let artist_rowid = match Self::get_artist_rowid(conn, &artist.id)? {
                    Some(rowid) => rowid,
                    None => Self::write_artist(conn, &Artist::from_ref(artist))?.0,
                };
                conn.execute(
                    "INSERT OR IGNORE INTO artist_albums (artist_rowid, album_rowid) VALUES (?1, ?2)",
                    params![artist_rowid, album_rowid],
                )?;
            }
            Ok(created)
        })
    }

    fn get_album(&self, id: &str) -> Result<Option<Album>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            &format!("SELECT {} FROM albums al WHERE al.id = ?1", ALBUM_COLUMNS),
            params![id],
            Self::parse_album_row,
        ) {
            Ok(album) => Ok(Some(album)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_album_track_count(&self, album_id: &str) -> Result<Option<usize>> {
        let conn = self.conn.lock().unwrap();
        let Some(album_rowid) = Self::get_album_rowid(&conn, album_id)? else {
            return Ok(None);
        };
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tracks WHERE album_rowid = ?1",
            params![album_rowid],
            |r| r.get(0),
        )?;
        Ok(Some(count as usize))
    }

    fn list_artist_albums(&self, artist_id: &str) -> Result<Vec<Album>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM albums al
             JOIN artist_albums aa ON aa.album_rowid = al.rowid
             JOIN artists ar ON ar.rowid = aa.artist_rowid
             WHERE ar.id = ?1
             ORDER BY al.name, al.id",
            ALBUM_COLUMNS
        ))?;
        let albums = stmt
            .query_map(params![artist_id], Self::parse_album_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(albums)
    }

    fn get_album_artist_names(&self, album_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT ar.name FROM artists ar
             JOIN artist_albums aa ON aa.artist_rowid = ar.rowid
             JOIN albums al ON al.rowid = aa.album_rowid
             WHERE al.id = ?1
             ORDER BY ar.name",
        )?;
        let names = stmt
            .query_map(params![album_id], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn delete_album(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute("DELETE FROM albums WHERE id = ?1", params![id])
            .with_context(|| format!("Failed to delete album {}", id))?;
        Ok(deleted > 0)
    }

    // =========================================================================
    // Tracks
    // =========================================================================

    fn track_exists(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        Ok(Self::get_track_rowid(&conn, id)?.is_some())
    }

    fn upsert_track(&self, track: &Track) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        Self::in_transaction(&conn, |conn| {
            let album_rowid = Self::get_album_rowid(conn, &track.album_id)?
                .ok_or_else(|| CatalogError::MissingAlbum(track.album_id.clone()))?;

            match Self::get_track_rowid(conn, &track.id)? {
                Some(rowid) => {
                    conn.execute(
                        "UPDATE tracks SET name = ?1, album_rowid = ?2, track_number = ?3, disc_number = ?4,
                         duration_ms = ?5, explicit = ?6, uri = ?7,
                         modified_at = cast(strftime('%s','now') as int)
                         WHERE rowid = ?8",
                        params![
                            &track.name,
                            album_rowid,
                            track.track_number,
                            track.disc_number,
                            track.duration_ms,
                            track.explicit as i32,
                            &track.uri,
                            rowid
                        ],
                    )
                    .map_err(|e| map_track_write_error(e, track))?;
                    Ok(false)
                }
                None => {
                    conn.execute(
                        "INSERT INTO tracks (id, name, album_rowid, track_number, disc_number, duration_ms, explicit, uri)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        params![
                            &track.id,
                            &track.name,
                            album_rowid,
                            track.track_number,
                            track.disc_number,
                            track.duration_ms,
                            track.explicit as i32,
                            &track.uri
                        ],
                    )
                    .map_err(|e| map_track_write_error(e, track))?;
                    Ok(true)
                }
            }
        })
    }

    fn get_track(&self, id: &str) -> Result<Option<Track>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            &format!(
                "SELECT {} FROM tracks t JOIN albums al ON al.rowid = t.album_rowid WHERE t.id = ?1",
                TRACK_COLUMNS
            ),
            params![id],
            Self::parse_track_row,
        ) {
            Ok(track) => Ok(Some(track)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_album_tracks(&self, album_id: &str) -> Result<Vec<Track>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tracks t
             JOIN albums al ON al.rowid = t.album_rowid
             WHERE al.id = ?1
             ORDER BY t.track_number, t.id",
            TRACK_COLUMNS
        ))?;
        let tracks = stmt
            .query_map(params![album_id], Self::parse_track_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    fn delete_track(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM tracks WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    // =========================================================================
    // Genres
    // =========================================================================

    fn sync_genres(
        &self,
        genres: &[GenreUpsert],
        synced_at: &str,
        source: &str,
    ) -> Result<GenreSyncCounts> {
        let conn = self.conn.lock().unwrap();
        Self::in_transaction(&conn, |conn| {
            let mut counts = GenreSyncCounts::default();
            for genre in genres {
                let by_id: Option<i64> = conn
                    .query_row(
                        "SELECT rowid FROM genres WHERE id = ?1",
                        params![&genre.id],
                        |r| r.get(0),
                    )
                    .optional()?;
                let existing = match by_id {
                    Some(rowid) => Some(rowid),
                    None => conn
                        .query_row(
                            "SELECT rowid FROM genres WHERE lower(name) = lower(?1)",
                            params![&genre.name],
                            |r| r.get(0),
                        )
                        .optional()?,
                };

                match existing {
                    Some(rowid) => {
                        conn.execute(
                            "UPDATE genres SET id = ?1, name = ?2, source = ?3, synced_at = ?4,
                             modified_at = cast(strftime('%s','now') as int)
                             WHERE rowid = ?5",
                            params![&genre.id, &genre.name, source, synced_at, rowid],
                        )?;
                        counts.updated += 1;
                    }
                    None => {
                        conn.execute(
                            "INSERT INTO genres (id, name, source, synced_at) VALUES (?1, ?2, ?3, ?4)",
                            params![&genre.id, &genre.name, source, synced_at],
                        )?;
                        counts.created += 1;
                    }
                }
            }
            Ok(counts)
        })
    }

    fn list_genres(&self) -> Result<Vec<Genre>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, name, source, synced_at FROM genres ORDER BY name")?;
        let genres = stmt
            .query_map([], |r| {
                Ok(Genre {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    source: r.get(2)?,
                    synced_at: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(genres)
    }

    // =========================================================================
    // Counts (for metrics)
    // =========================================================================

    fn get_artists_count(&self) -> usize {
        self.count("artists")
    }

    fn get_albums_count(&self) -> usize {
        self.count("albums")
    }

    fn get_tracks_count(&self) -> usize {
        self.count("tracks")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteCatalogStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteCatalogStore::new(temp_dir.path().join("catalog.db")).unwrap();
        (store, temp_dir)
    }

    fn artist(id: &str, name: &str, genres: &[&str]) -> Artist {
        Artist {
            id: id.to_string(),
            name: name.to_string(),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            popularity: 50,
            followers_total: 1000,
            uri: Some(format!("spotify:artist:{}", id)),
            image_urls: vec!["https://img.example/1.jpg".to_string()],
        }
    }

    fn album(id: &str, name: &str) -> Album {
        Album {
            id: id.to_string(),
            name: name.to_string(),
            album_type: "ALBUM".to_string(),
            total_tracks: 3,
            release_date: NaiveDate::from_ymd_opt(2001, 5, 15).unwrap(),
            release_date_precision: ReleaseDatePrecision::Day,
            uri: None,
        }
    }

    fn track(id: &str, album_id: &str, number: i32) -> Track {
        Track {
            id: id.to_string(),
            name: format!("Track {}", number),
            album_id: album_id.to_string(),
            track_number: number,
            disc_number: 1,
            duration_ms: 180_000,
            explicit: false,
            uri: None,
        }
    }

    fn artist_ref(id: &str, name: &str) -> ArtistRef {
        ArtistRef {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_upsert_artist_reports_creation_and_links_genres() {
        let (store, _dir) = create_test_store();

        assert!(store.upsert_artist(&artist("a1", "Alpha", &["rock", "indie"])).unwrap());
        assert!(!store.upsert_artist(&artist("a1", "Alpha Renamed", &["rock"])).unwrap());

        let stored = store.get_artist("a1").unwrap().unwrap();
        assert_eq!(stored.name, "Alpha Renamed");
        assert_eq!(stored.genres, vec!["rock".to_string()]);
        assert_eq!(stored.image_urls.len(), 1);

        let genre_ids: Vec<String> = store.list_genres().unwrap().into_iter().map(|g| g.id).collect();
        assert_eq!(genre_ids, vec!["genre-indie".to_string(), "genre-rock".to_string()]);
    }

    #[test]
    fn test_list_artists_ordered_by_name_then_id() {
        let (store, _dir) = create_test_store();
        store.upsert_artist(&artist("b", "Same", &[])).unwrap();
        store.upsert_artist(&artist("a", "Same", &[])).unwrap();
        store.upsert_artist(&artist("c", "Alpha", &[])).unwrap();

        let ids: Vec<String> = store
            .list_artists_ordered()
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(store.list_artist_ids().unwrap().len(), 3);
    }

    #[test]
    fn test_upsert_album_creates_missing_artists() {
        let (store, _dir) = create_test_store();
        let created = store
            .upsert_album(&album("al1", "First"), &[artist_ref("x1", "Unknown Artist")])
            .unwrap();
        assert!(created);

        let bare = store.get_artist("x1").unwrap().unwrap();
        assert_eq!(bare.name, "Unknown Artist");
        assert_eq!(bare.popularity, 0);
        assert_eq!(
            store.get_album_artist_names("al1").unwrap(),
            vec!["Unknown Artist".to_string()]
        );
        assert_eq!(store.list_artist_albums("x1").unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_album_updates_existing() {
        let (store, _dir) = create_test_store();
        store.upsert_artist(&artist("a1", "Alpha", &[])).unwrap();
        store.upsert_album(&album("al1", "First"), &[artist_ref("a1", "Alpha")]).unwrap();

        let mut changed = album("al1", "First (Remastered)");
        changed.total_tracks = 12;
        let created = store.upsert_album(&changed, &[artist_ref("a1", "Alpha")]).unwrap();
        assert!(!created);

        let stored = store.get_album("al1").unwrap().unwrap();
        assert_eq!(stored.name, "First (Remastered)");
        assert_eq!(stored.total_tracks, 12);
        assert_eq!(stored.release_date, NaiveDate::from_ymd_opt(2001, 5, 15).unwrap());
        assert_eq!(store.list_artist_albums("a1").unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_album_without_artists_fails() {
        let (store, _dir) = create_test_store();
        let err = store.upsert_album(&album("al1", "First"), &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::NoArtists(_))
        ));
        assert!(store.get_album("al1").unwrap().is_none());
    }

    #[test]
    fn test_track_count_and_ordering() {
        let (store, _dir) = create_test_store();
        store.upsert_album(&album("al1", "First"), &[artist_ref("a1", "Alpha")]).unwrap();
        assert_eq!(store.get_album_track_count("al1").unwrap(), Some(0));
        assert_eq!(store.get_album_track_count("missing").unwrap(), None);

        store.upsert_track(&track("t3", "al1", 3)).unwrap();
        store.upsert_track(&track("t1", "al1", 1)).unwrap();
        store.upsert_track(&track("t2", "al1", 2)).unwrap();

        assert_eq!(store.get_album_track_count("al1").unwrap(), Some(3));
        let numbers: Vec<i32> = store
            .list_album_tracks("al1")
            .unwrap()
            .into_iter()
            .map(|t| t.track_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(store.track_exists("t2").unwrap());
        assert_eq!(store.get_track("t2").unwrap().unwrap().album_id, "al1");
    }

    #[test]
    fn test_duplicate_track_number_is_typed_error() {
        let (store, _dir) = create_test_store();
        store.upsert_album(&album("al1", "First"), &[artist_ref("a1", "Alpha")]).unwrap();
        store.upsert_track(&track("t1", "al1", 1)).unwrap();

        let err = store.upsert_track(&track("t2", "al1", 1)).unwrap_err();
        match err.downcast_ref::<CatalogError>() {
            Some(CatalogError::DuplicateTrackNumber { album_id, track_number }) => {
                assert_eq!(album_id, "al1");
                assert_eq!(*track_number, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!store.track_exists("t2").unwrap());
    }

    #[test]
    fn test_track_for_missing_album_fails() {
        let (store, _dir) = create_test_store();
        let err = store.upsert_track(&track("t1", "nope", 1)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::MissingAlbum(_))
        ));
    }

    #[test]
    fn test_album_delete_is_blocked_by_tracks() {
        let (store, _dir) = create_test_store();
        store.upsert_album(&album("al1", "First"), &[artist_ref("a1", "Alpha")]).unwrap();
        store.upsert_track(&track("t1", "al1", 1)).unwrap();

        assert!(store.delete_album("al1").is_err());
        assert!(store.delete_track("t1").unwrap());
        assert!(store.delete_album("al1").unwrap());
        assert!(store.get_album("al1").unwrap().is_none());
    }

    #[test]
    fn test_sync_genres_matches_by_id_then_name() {
        let (store, _dir) = create_test_store();
        store.upsert_artist(&artist("a1", "Alpha", &["Hip Hop"])).unwrap();

        let genres = vec![
            GenreUpsert { id: "genre:hip-hop".to_string(), name: "hip-hop".to_string() },
            GenreUpsert { id: "genre:hip-hop".to_string(), name: "hip-hop".to_string() },
            GenreUpsert { id: "genre:rock".to_string(), name: "rock".to_string() },
        ];
        let first = store.sync_genres(&genres[2..], "2024-01-01T00:00:00Z", "test").unwrap();
        assert_eq!(first, GenreSyncCounts { created: 1, updated: 0 });

        let hip_hop = vec![GenreUpsert { id: "genre:hip-hop".to_string(), name: "Hip Hop".to_string() }];
        let second = store.sync_genres(&hip_hop, "2024-01-02T00:00:00Z", "test").unwrap();
        assert_eq!(second, GenreSyncCounts { created: 0, updated: 1 });

        let third = store.sync_genres(&genres[..2], "2024-01-03T00:00:00Z", "test").unwrap();
        assert_eq!(third, GenreSyncCounts { created: 0, updated: 2 });

        let stored = store.list_genres().unwrap();
        assert_eq!(stored.len(), 2);
        let hip_hop = stored.iter().find(|g| g.id == "genre:hip-hop").unwrap();
        assert_eq!(hip_hop.name, "hip-hop");
        assert_eq!(hip_hop.source.as_deref(), Some("test"));
        assert_eq!(hip_hop.synced_at.as_deref(), Some("2024-01-03T00:00:00Z"));
    }

    #[test]
    fn test_reopen_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.db");
        {
            let store = SqliteCatalogStore::new(&path).unwrap();
            store.upsert_artist(&artist("a1", "Alpha", &[])).unwrap();
        }
        let store = SqliteCatalogStore::new(&path).unwrap();
        assert_eq!(store.get_artists_count(), 1);
    }
}

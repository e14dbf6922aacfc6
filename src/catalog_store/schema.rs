//! SQLite schema definitions for the catalog database.
//!
//! Primary keys are integer rowids; the provider's external IDs are unique
//! text columns used for lookups.

use crate::enrichment_store::schema::{
    ALBUM_EMBEDDINGS_TABLE, ARTIST_EMBEDDINGS_TABLE, AUDIO_FEATURES_TABLE,
    TRACK_EMBEDDINGS_TABLE,
};
use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};
use anyhow::Result;
use rusqlite::Connection;

// =============================================================================
// Core Tables
// =============================================================================

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("popularity", &SqlType::Integer, non_null = true),
        sqlite_column!("followers_total", &SqlType::Integer, non_null = true),
        sqlite_column!("uri", &SqlType::Text),
        sqlite_column!("image_urls", &SqlType::Text, non_null = true, default_value = Some("'[]'")),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
        sqlite_column!("modified_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
    ],
    indices: &[("idx_artists_name", "name")],
    unique_constraints: &[&["id"]],
};

const GENRES_TABLE: Table = Table {
    name: "genres",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("source", &SqlType::Text),
        sqlite_column!("synced_at", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
        sqlite_column!("modified_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
    ],
    indices: &[],
    unique_constraints: &[&["id"], &["name"]],
};

const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("album_type", &SqlType::Text, non_null = true, default_value = Some("'ALBUM'")),
        sqlite_column!("total_tracks", &SqlType::Integer, non_null = true),
        sqlite_column!("release_date", &SqlType::Text, non_null = true), // ISO date, padded to day
        sqlite_column!("release_date_precision", &SqlType::Text, non_null = true), // 'year' | 'month' | 'day'
        sqlite_column!("uri", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
        sqlite_column!("modified_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
    ],
    indices: &[("idx_albums_name", "name")],
    unique_constraints: &[&["id"]],
};

const ALBUM_FK_RESTRICT: ForeignKey = ForeignKey {
    foreign_table: "albums",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::Restrict,
};

const TRACKS_TABLE: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "album_rowid",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_FK_RESTRICT)
        ),
        sqlite_column!("track_number", &SqlType::Integer, non_null = true),
        sqlite_column!("disc_number", &SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("duration_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("explicit", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("uri", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
        sqlite_column!("modified_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
    ],
    indices: &[("idx_tracks_album", "album_rowid")],
    unique_constraints: &[&["id"], &["album_rowid", "track_number"]],
};

// =============================================================================
// Junction Tables
// =============================================================================

const ARTIST_FK_CASCADE: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ALBUM_FK_CASCADE: ForeignKey = ForeignKey {
    foreign_table: "albums",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::Cascade,
};

const GENRE_FK_CASCADE: ForeignKey = ForeignKey {
    foreign_table: "genres",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::Cascade,
};

/// Artist <-> Album relationship
const ARTIST_ALBUMS_TABLE: Table = Table {
    name: "artist_albums",
    columns: &[
        sqlite_column!("artist_rowid", &SqlType::Integer, non_null = true, foreign_key = Some(&ARTIST_FK_CASCADE)),
        sqlite_column!("album_rowid", &SqlType::Integer, non_null = true, foreign_key = Some(&ALBUM_FK_CASCADE)),
    ],
    indices: &[("idx_artist_albums_album", "album_rowid")],
    unique_constraints: &[&["artist_rowid", "album_rowid"]],
};

/// Artist <-> Genre relationship
const ARTIST_GENRES_TABLE: Table = Table {
    name: "artist_genres",
    columns: &[
        sqlite_column!("artist_rowid", &SqlType::Integer, non_null = true, foreign_key = Some(&ARTIST_FK_CASCADE)),
        sqlite_column!("genre_rowid", &SqlType::Integer, non_null = true, foreign_key = Some(&GENRE_FK_CASCADE)),
    ],
    indices: &[("idx_artist_genres_genre", "genre_rowid")],
    unique_constraints: &[&["artist_rowid", "genre_rowid"]],
};

// =============================================================================
// Versioned Schemas
// =============================================================================

/// Version 1 adds audio features and embeddings on top of the plain catalog.
fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    AUDIO_FEATURES_TABLE.create(conn)?;
    ARTIST_EMBEDDINGS_TABLE.create(conn)?;
    ALBUM_EMBEDDINGS_TABLE.create(conn)?;
    TRACK_EMBEDDINGS_TABLE.create(conn)?;
    Ok(())
}

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            ARTISTS_TABLE,
            GENRES_TABLE,
            ALBUMS_TABLE,
            TRACKS_TABLE,
            ARTIST_ALBUMS_TABLE,
            ARTIST_GENRES_TABLE,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            ARTISTS_TABLE,
            GENRES_TABLE,
            ALBUMS_TABLE,
            TRACKS_TABLE,
            ARTIST_ALBUMS_TABLE,
            ARTIST_GENRES_TABLE,
            AUDIO_FEATURES_TABLE,
            ARTIST_EMBEDDINGS_TABLE,
            ALBUM_EMBEDDINGS_TABLE,
            TRACK_EMBEDDINGS_TABLE,
        ],
        migration: Some(migrate_v0_to_v1),
    },
];

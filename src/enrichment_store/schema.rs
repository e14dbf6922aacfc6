//! Tables for audio features and embeddings.
//!
//! They live in the catalog database so that rows can reference tracks,
//! albums and artists by rowid; see `catalog_store::CATALOG_VERSIONED_SCHEMAS`.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, DEFAULT_TIMESTAMP,
};

const TRACK_FK: ForeignKey = ForeignKey {
    foreign_table: "tracks",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ALBUM_FK: ForeignKey = ForeignKey {
    foreign_table: "albums",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ARTIST_FK: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "rowid",
    on_delete: ForeignKeyOnChange::Cascade,
};

/// One row per ingested track; its presence is the ingestion resume marker.
pub(crate) const AUDIO_FEATURES_TABLE: Table = Table {
    name: "audio_features",
    columns: &[
        sqlite_column!(
            "track_rowid",
            &SqlType::Integer,
            is_primary_key = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!("energy", &SqlType::Real, non_null = true),
        sqlite_column!("valence", &SqlType::Real, non_null = true),
        sqlite_column!("tempo", &SqlType::Real, non_null = true),
        sqlite_column!("key", &SqlType::Integer, non_null = true),
        sqlite_column!("mode", &SqlType::Text, non_null = true), // 'major' | 'minor'
        sqlite_column!("danceability", &SqlType::Real, non_null = true),
        sqlite_column!("acousticness", &SqlType::Real, non_null = true),
        sqlite_column!("instrumentalness", &SqlType::Real, non_null = true),
        sqlite_column!("liveness", &SqlType::Real, non_null = true),
        sqlite_column!("speechiness", &SqlType::Real, non_null = true),
        sqlite_column!("loudness", &SqlType::Real, non_null = true),
        sqlite_column!("time_signature", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "modified_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

macro_rules! embedding_table {
    ($name:expr, $entity_column:expr, $fk:expr) => {
        Table {
            name: $name,
            columns: &[
                sqlite_column!(
                    $entity_column,
                    &SqlType::Integer,
                    is_primary_key = true,
                    foreign_key = Some($fk)
                ),
                sqlite_column!("vector", &SqlType::Text, non_null = true), // JSON array of floats
                sqlite_column!("model_version", &SqlType::Text, non_null = true),
                sqlite_column!("quality_score", &SqlType::Real),
                sqlite_column!(
                    "metadata",
                    &SqlType::Text,
                    non_null = true,
                    default_value = Some("'{}'")
                ),
                sqlite_column!(
                    "created_at",
                    &SqlType::Integer,
                    non_null = true,
                    default_value = Some(DEFAULT_TIMESTAMP)
                ),
                sqlite_column!(
                    "modified_at",
                    &SqlType::Integer,
                    non_null = true,
                    default_value = Some(DEFAULT_TIMESTAMP)
                ),
            ],
            indices: &[],
            unique_constraints: &[],
        }
    };
}

pub(crate) const ARTIST_EMBEDDINGS_TABLE: Table =
    embedding_table!("artist_embeddings", "artist_rowid", &ARTIST_FK);
pub(crate) const ALBUM_EMBEDDINGS_TABLE: Table =
    embedding_table!("album_embeddings", "album_rowid", &ALBUM_FK);
pub(crate) const TRACK_EMBEDDINGS_TABLE: Table =
    embedding_table!("track_embeddings", "track_rowid", &TRACK_FK);

//! Catalog entities as persisted in the SQLite database.
//!
//! Every entity carries the provider's stable external identifier in `id`;
//! integer rowids stay internal to the store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// =============================================================================
// Core Entities
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub genres: Vec<String>,
    pub popularity: i32,
    pub followers_total: i64,
    pub uri: Option<String>,
    pub image_urls: Vec<String>,
}

impl Artist {
    /// Bare artist row created when an album references an artist that was
    /// never fetched on its own.
    pub fn from_ref(artist: &ArtistRef) -> Self {
        Self {
            id: artist.id.clone(),
            name: artist.name.clone(),
            genres: vec![],
            popularity: 0,
            followers_total: 0,
            uri: None,
            image_urls: vec![],
        }
    }
}

/// Minimal `{id, name}` reference used to link albums to artists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseDatePrecision {
    Year,
    Month,
    Day,
}

impl ReleaseDatePrecision {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "year" => Some(Self::Year),
            "month" => Some(Self::Month),
            "day" => Some(Self::Day),
            _ => None,
        }
    }

    pub fn to_db_str(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    /// Uppercased provider album type: `ALBUM`, `SINGLE` or `COMPILATION`.
    pub album_type: String,
    pub total_tracks: i32,
    pub release_date: NaiveDate,
    pub release_date_precision: ReleaseDatePrecision,
    pub uri: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub album_id: String,
    pub track_number: i32,
    pub disc_number: i32,
    pub duration_ms: i64,
    pub explicit: bool,
    pub uri: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: String,
    pub name: String,
    pub source: Option<String>,
    pub synced_at: Option<String>,
}

/// A genre to be written by a genre sync run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenreUpsert {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenreSyncCounts {
    pub created: usize,
    pub updated: usize,
}

//! Shared constants for integration tests
//!
//! Counts describe the catalog served by `FixtureProvider`: every genre
//! search returns the same 10 artists, each with 2 albums of 3 tracks.

// ============================================================================
// Fixture Catalog Shape
// ============================================================================

pub const GENRE_SEED_COUNT: usize = 10;

pub const FIXTURE_ARTISTS: usize = 10;

pub const FIXTURE_ALBUMS: usize = 20;

pub const FIXTURE_TRACKS: usize = 60;

/// Artists returned again by the 9 seeds after the first.
pub const FIXTURE_DUPLICATE_ARTISTS: usize = 90;

// ============================================================================
// Fixture Catalog IDs
// ============================================================================

/// First artist in (name, id) order
pub const FIRST_ARTIST_ID: &str = "stub-artist-0";

pub const FIRST_ARTIST_NAME: &str = "Stub Artist 0";

/// First album visited by ingestion
pub const FIRST_ALBUM_ID: &str = "stub-artist-0-album-0";

pub const FIRST_TRACK_ID: &str = "stub-artist-0-album-0-track-0";

pub const FIRST_GENRE_SEED: &str = "progressive metal";

use thiserror::Error;

/// Catalog write failures that callers may want to tell apart from plain
/// database errors. They travel inside `anyhow::Error`; use
/// `err.downcast_ref::<CatalogError>()` to inspect them.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("album {album_id} already has a track with number {track_number}")]
    DuplicateTrackNumber { album_id: String, track_number: i32 },

    #[error("album {0} does not exist")]
    MissingAlbum(String),

    #[error("album {0} has no artists")]
    NoArtists(String),

    #[error("invalid release date: {0}")]
    InvalidReleaseDate(String),
}

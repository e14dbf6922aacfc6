use super::persist::{save_album, save_artist, save_track};
use crate::catalog_store::{Album, Artist, CatalogStore, Track};
use crate::provider::{MusicProvider, ProviderError};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Fetches single entities from the provider by id and stores them.
///
/// Fetching an album stores its artists but not its tracks, so it can leave
/// an album with zero tracks behind; the crawl revisits such albums.
pub struct CatalogFetcher {
    catalog_store: Arc<dyn CatalogStore>,
    provider: Arc<dyn MusicProvider>,
}

impl CatalogFetcher {
    pub fn new(catalog_store: Arc<dyn CatalogStore>, provider: Arc<dyn MusicProvider>) -> Self {
        Self {
            catalog_store,
            provider,
        }
    }

    pub fn fetch_artist(&self, id: &str) -> Result<Artist> {
        let payload = self.provider.get_artist(id)?;
        let created = save_artist(self.catalog_store.as_ref(), &payload)?;
        info!("Fetched artist {} (created: {})", payload.id, created);
        self.catalog_store
            .get_artist(&payload.id)?
            .with_context(|| format!("artist {} missing after save", payload.id))
    }

    pub fn fetch_album(&self, id: &str) -> Result<Album> {
        let payload = self.provider.get_album(id)?;
        let created = save_album(self.catalog_store.as_ref(), &payload)?;
        info!("Fetched album {} (created: {})", payload.id, created);
        self.catalog_store
            .get_album(&payload.id)?
            .with_context(|| format!("album {} missing after save", payload.id))
    }

    /// Stores the track's album (and its artists) first, then the track.
    pub fn fetch_track(&self, id: &str) -> Result<Track> {
        let payload = self.provider.get_track(id)?;
        let album = payload.album.as_ref().ok_or_else(|| {
            ProviderError::InvalidPayload(format!("track {} has no album", payload.id))
        })?;

        let store = self.catalog_store.as_ref();
        save_album(store, album)?;
        let created = save_track(store, &payload, &album.id)?;
        info!("Fetched track {} (created: {})", payload.id, created);
        store
            .get_track(&payload.id)?
            .with_context(|| format!("track {} missing after save", payload.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::SqliteCatalogStore;
    use crate::provider::{
        FixtureProvider, DISPOSITION_TRACK_ID, LATERALUS_ALBUM_ID, TOOL_ARTIST_ID,
    };
    use tempfile::TempDir;

    fn create_fetcher() -> (CatalogFetcher, Arc<SqliteCatalogStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteCatalogStore::new(temp_dir.path().join("catalog.db")).unwrap());
        let fetcher = CatalogFetcher::new(store.clone(), Arc::new(FixtureProvider::new()));
        (fetcher, store, temp_dir)
    }

    #[test]
    fn test_fetch_album_stores_artists_but_no_tracks() {
        let (fetcher, store, _dir) = create_fetcher();
        let album = fetcher.fetch_album(LATERALUS_ALBUM_ID).unwrap();
        assert_eq!(album.name, "Lateralus");
        assert_eq!(album.total_tracks, 13);
        assert_eq!(store.get_album_track_count(LATERALUS_ALBUM_ID).unwrap(), Some(0));
        assert_eq!(store.get_artist(TOOL_ARTIST_ID).unwrap().unwrap().name, "TOOL");
    }

    #[test]
    fn test_fetch_track_stores_album_first() {
        let (fetcher, store, _dir) = create_fetcher();
        let track = fetcher.fetch_track(DISPOSITION_TRACK_ID).unwrap();
        assert_eq!(track.track_number, 10);
        assert_eq!(track.duration_ms, 286_266);
        assert_eq!(track.album_id, LATERALUS_ALBUM_ID);
        assert_eq!(store.get_album_track_count(LATERALUS_ALBUM_ID).unwrap(), Some(1));
    }

    #[test]
    fn test_fetch_artist_is_idempotent() {
        let (fetcher, store, _dir) = create_fetcher();
        fetcher.fetch_artist(TOOL_ARTIST_ID).unwrap();
        let artist = fetcher.fetch_artist(TOOL_ARTIST_ID).unwrap();
        assert_eq!(artist.genres, vec!["progressive metal".to_string()]);
        assert_eq!(store.get_artists_count(), 1);
    }
}

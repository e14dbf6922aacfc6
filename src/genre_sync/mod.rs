//! Synchronizes the genre table with the provider's genre seed list.

use crate::catalog_store::{CatalogStore, GenreUpsert};
use crate::provider::MusicProvider;
use anyhow::{Context, Result};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

pub const GENRE_SOURCE: &str = "spotify.recommendation_genre_seeds";

const IDENTIFIER_MAX_LEN: usize = 24;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s-]").unwrap();
    static ref SEPARATORS: Regex = Regex::new(r"[-\s]+").unwrap();
}

/// ASCII slug: lowercase, punctuation dropped, runs of spaces and dashes
/// collapsed into a single dash.
pub fn slugify(name: &str) -> String {
    let ascii: String = name.chars().filter(char::is_ascii).collect();
    let lowered = ascii.to_lowercase();
    let cleaned = NON_WORD.replace_all(&lowered, "");
    SEPARATORS
        .replace_all(cleaned.trim(), "-")
        .trim_matches(|c| c == '-' || c == '_')
        .to_string()
}

/// Stable identifier of a genre, `genre:<slug>` truncated to 24 slug chars.
///
/// Names without any ASCII word character fall back to a digest of the name.
pub fn genre_identifier(name: &str) -> String {
    let slug: String = slugify(name).chars().take(IDENTIFIER_MAX_LEN).collect();
    if !slug.is_empty() {
        return format!("genre:{}", slug);
    }
    let digest = Sha1::digest(name.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("genre:{}", &hex[..IDENTIFIER_MAX_LEN])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreSyncResult {
    pub created: usize,
    pub updated: usize,
    pub total: usize,
    pub source: String,
    pub synced_at: String,
}

pub struct GenreSyncEngine {
    catalog_store: Arc<dyn CatalogStore>,
    provider: Arc<dyn MusicProvider>,
}

impl GenreSyncEngine {
    pub fn new(catalog_store: Arc<dyn CatalogStore>, provider: Arc<dyn MusicProvider>) -> Self {
        Self {
            catalog_store,
            provider,
        }
    }

    /// Load the provider's genre seeds and upsert them.
    pub fn run(&self) -> Result<GenreSyncResult> {
        let names = self
            .provider
            .genre_seeds()
            .context("Failed to load genre seeds from provider")?;
        self.sync_names(&names)
    }

    /// Upsert the given genre names in a single transaction.
    pub fn sync_names(&self, names: &[String]) -> Result<GenreSyncResult> {
        let names: BTreeSet<&str> = names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .collect();
        let synced_at = Utc::now().to_rfc3339();

        if names.is_empty() {
            warn!("Genre sync received no genres");
            return Ok(GenreSyncResult {
                created: 0,
                updated: 0,
                total: 0,
                source: GENRE_SOURCE.to_string(),
                synced_at,
            });
        }

        let upserts: Vec<GenreUpsert> = names
            .iter()
            .map(|name| GenreUpsert {
                id: genre_identifier(name),
                name: name.to_string(),
            })
            .collect();
        let counts = self
            .catalog_store
            .sync_genres(&upserts, &synced_at, GENRE_SOURCE)?;

        info!(
            "Synchronized {} genres (created={}, updated={})",
            upserts.len(),
            counts.created,
            counts.updated
        );
        Ok(GenreSyncResult {
            created: counts.created,
            updated: counts.updated,
            total: upserts.len(),
            source: GENRE_SOURCE.to_string(),
            synced_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_matches_url_slug_rules() {
        assert_eq!(slugify("Progressive Metal"), "progressive-metal");
        assert_eq!(slugify("  post--rock  "), "post-rock");
        assert_eq!(slugify("R&B / Soul"), "rb-soul");
        assert_eq!(slugify("drum_and_bass"), "drum_and_bass");
        assert_eq!(slugify("música"), "msica");
    }

    #[test]
    fn identifier_is_truncated_to_24_slug_chars() {
        assert_eq!(genre_identifier("trip hop"), "genre:trip-hop");
        let long = genre_identifier("a very long genre name that keeps going");
        assert_eq!(long, "genre:a-very-long-genre-name-t");
        assert_eq!(long.len(), "genre:".len() + 24);
    }

    #[test]
    fn identifier_falls_back_to_digest() {
        let id = genre_identifier("ジャズ");
        assert!(id.starts_with("genre:"));
        assert_eq!(id.len(), "genre:".len() + 24);
        assert!(id["genre:".len()..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, genre_identifier("ジャズ"));
    }
}

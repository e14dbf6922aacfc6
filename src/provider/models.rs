//! Typed payloads returned by a [`super::MusicProvider`].
//!
//! Field names follow the provider's JSON so the live client can deserialize
//! responses directly. `validate` is called at the provider boundary.

use super::ProviderError;
use crate::enrichment_store::{AudioFeatures, Mode};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowersPayload {
    pub total: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistPayload {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub popularity: Option<i32>,
    #[serde(default)]
    pub followers: Option<FollowersPayload>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub images: Vec<ImagePayload>,
}

/// Simplified artist object nested in albums and tracks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRefPayload {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumPayload {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub album_type: Option<String>,
    #[serde(default)]
    pub total_tracks: Option<i32>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub release_date_precision: Option<String>,
    #[serde(default)]
    pub artists: Vec<ArtistRefPayload>,
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackPayload {
    pub id: String,
    pub name: String,
    pub track_number: i32,
    #[serde(default)]
    pub disc_number: Option<i32>,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub explicit: Option<bool>,
    /// Absent on the album-tracks listing, where the album is implied.
    #[serde(default)]
    pub album: Option<AlbumPayload>,
    #[serde(default)]
    pub artists: Vec<ArtistRefPayload>,
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeaturePayload {
    pub id: String,
    pub energy: f64,
    pub valence: f64,
    pub tempo: f64,
    pub key: i32,
    #[serde(deserialize_with = "deserialize_mode")]
    pub mode: Mode,
    pub danceability: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub speechiness: f64,
    pub loudness: f64,
    pub time_signature: i32,
}

/// The provider reports mode as `1`/`0`, some mirrors as `"major"`/`"minor"`.
fn deserialize_mode<'de, D>(deserializer: D) -> Result<Mode, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ModeRepr {
        Int(i64),
        Str(String),
    }

    match ModeRepr::deserialize(deserializer)? {
        ModeRepr::Int(1) => Ok(Mode::Major),
        ModeRepr::Int(_) => Ok(Mode::Minor),
        ModeRepr::Str(s) => Mode::from_db_str(&s.to_lowercase())
            .ok_or_else(|| serde::de::Error::custom(format!("unknown mode '{}'", s))),
    }
}

fn require(field: &str, value: &str, entity: &str) -> Result<(), ProviderError> {
    if value.trim().is_empty() {
        return Err(ProviderError::InvalidPayload(format!(
            "{} payload is missing '{}'",
            entity, field
        )));
    }
    Ok(())
}

impl ArtistPayload {
    pub fn validate(&self) -> Result<(), ProviderError> {
        require("id", &self.id, "artist")?;
        require("name", &self.name, "artist")
    }

    pub fn to_ref(&self) -> ArtistRefPayload {
        ArtistRefPayload {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

impl ArtistRefPayload {
    pub fn validate(&self) -> Result<(), ProviderError> {
        require("id", &self.id, "artist")?;
        require("name", &self.name, "artist")
    }
}

impl AlbumPayload {
    pub fn validate(&self) -> Result<(), ProviderError> {
        require("id", &self.id, "album")?;
        require("name", &self.name, "album")?;
        for artist in &self.artists {
            artist.validate()?;
        }
        Ok(())
    }
}

impl TrackPayload {
    pub fn validate(&self) -> Result<(), ProviderError> {
        require("id", &self.id, "track")?;
        require("name", &self.name, "track")?;
        if let Some(album) = &self.album {
            album.validate()?;
        }
        Ok(())
    }
}

impl FeaturePayload {
    pub fn validate(&self) -> Result<(), ProviderError> {
        require("id", &self.id, "audio features")
    }

    pub fn into_audio_features(self) -> AudioFeatures {
        AudioFeatures {
            track_id: self.id,
            energy: self.energy,
            valence: self.valence,
            tempo: self.tempo,
            key: self.key,
            mode: self.mode,
            danceability: self.danceability,
            acousticness: self.acousticness,
            instrumentalness: self.instrumentalness,
            liveness: self.liveness,
            speechiness: self.speechiness,
            loudness: self.loudness,
            time_signature: self.time_signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature_json(mode: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "t1", "energy": 0.5, "valence": 0.5, "tempo": 120.0, "key": 3,
            "mode": mode, "danceability": 0.1, "acousticness": 0.2,
            "instrumentalness": 0.3, "liveness": 0.4, "speechiness": 0.05,
            "loudness": -8.0, "time_signature": 4,
            "type": "audio_features", "analysis_url": "ignored"
        })
    }

    #[test]
    fn mode_accepts_int_and_string() {
        let major: FeaturePayload = serde_json::from_value(feature_json(json!(1))).unwrap();
        assert_eq!(major.mode, Mode::Major);
        let minor: FeaturePayload = serde_json::from_value(feature_json(json!(0))).unwrap();
        assert_eq!(minor.mode, Mode::Minor);
        let named: FeaturePayload = serde_json::from_value(feature_json(json!("Minor"))).unwrap();
        assert_eq!(named.mode, Mode::Minor);
        assert!(serde_json::from_value::<FeaturePayload>(feature_json(json!("dorian"))).is_err());
    }

    #[test]
    fn album_listing_entry_deserializes_without_optional_fields() {
        let album: AlbumPayload = serde_json::from_value(json!({
            "id": "al1",
            "name": "Album",
            "artists": [{"id": "ar1", "name": "Artist", "uri": "spotify:artist:ar1"}]
        }))
        .unwrap();
        assert_eq!(album.release_date, None);
        assert_eq!(album.artists.len(), 1);
        album.validate().unwrap();
    }

    #[test]
    fn blank_required_fields_are_rejected() {
        let track = TrackPayload {
            id: "t1".to_string(),
            name: "  ".to_string(),
            track_number: 1,
            disc_number: None,
            duration_ms: 0,
            explicit: None,
            album: None,
            artists: vec![],
            uri: None,
        };
        assert!(matches!(
            track.validate(),
            Err(ProviderError::InvalidPayload(_))
        ));
    }
}

//! `EnrichmentStore` implementation on top of the catalog database.

use super::models::*;
use super::trait_def::EnrichmentStore;
use crate::catalog_store::SqliteCatalogStore;
use anyhow::{bail, Result};
use rusqlite::{params, Connection};
use serde_json::{Map, Value as JsonValue};
use tracing::warn;

fn rowid_of(conn: &Connection, kind: EntityKind, id: &str) -> Result<Option<i64>> {
    match kind {
        EntityKind::Artist => SqliteCatalogStore::get_artist_rowid(conn, id),
        EntityKind::Album => SqliteCatalogStore::get_album_rowid(conn, id),
        EntityKind::Track => SqliteCatalogStore::get_track_rowid(conn, id),
    }
}

fn album_artist_names(conn: &Connection, album_rowid: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT ar.name FROM artists ar
         JOIN artist_albums aa ON aa.artist_rowid = ar.rowid
         WHERE aa.album_rowid = ?1
         ORDER BY ar.name",
    )?;
    let names = stmt
        .query_map(params![album_rowid], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
    Ok(count as usize)
}

impl EnrichmentStore for SqliteCatalogStore {
    // =========================================================================
    // Audio Features
    // =========================================================================

    fn has_audio_features(&self, track_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM audio_features f
                JOIN tracks t ON t.rowid = f.track_rowid
                WHERE t.id = ?1
            )",
            params![track_id],
            |r| r.get(0),
        )?;
        Ok(exists)
    }

    fn upsert_audio_features(&self, features: &AudioFeatures) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let Some(track_rowid) = SqliteCatalogStore::get_track_rowid(&conn, &features.track_id)?
        else {
            bail!("Track {} not found", features.track_id);
        };
        conn.execute(
            "INSERT INTO audio_features (
                track_rowid, energy, valence, tempo, key, mode, danceability, acousticness,
                instrumentalness, liveness, speechiness, loudness, time_signature
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(track_rowid) DO UPDATE SET
                energy = excluded.energy,
                valence = excluded.valence,
                tempo = excluded.tempo,
                key = excluded.key,
                mode = excluded.mode,
                danceability = excluded.danceability,
                acousticness = excluded.acousticness,
                instrumentalness = excluded.instrumentalness,
                liveness = excluded.liveness,
                speechiness = excluded.speechiness,
                loudness = excluded.loudness,
                time_signature = excluded.time_signature,
                modified_at = cast(strftime('%s','now') as int)",
            params![
                track_rowid,
                features.energy,
                features.valence,
                features.tempo,
                features.key,
                features.mode.to_db_str(),
                features.danceability,
                features.acousticness,
                features.instrumentalness,
                features.liveness,
                features.speechiness,
                features.loudness,
                features.time_signature,
            ],
        )?;
        Ok(())
    }

    fn get_audio_features(&self, track_id: &str) -> Result<Option<AudioFeatures>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT f.energy, f.valence, f.tempo, f.key, f.mode, f.danceability, f.acousticness,
                    f.instrumentalness, f.liveness, f.speechiness, f.loudness, f.time_signature
             FROM audio_features f
             JOIN tracks t ON t.rowid = f.track_rowid
             WHERE t.id = ?1",
            params![track_id],
            |r| {
                let mode: String = r.get(4)?;
                Ok(AudioFeatures {
                    track_id: track_id.to_string(),
                    energy: r.get(0)?,
                    valence: r.get(1)?,
                    tempo: r.get(2)?,
                    key: r.get(3)?,
                    mode: Mode::from_db_str(&mode).unwrap_or(Mode::Major),
                    danceability: r.get(5)?,
                    acousticness: r.get(6)?,
                    instrumentalness: r.get(7)?,
                    liveness: r.get(8)?,
                    speechiness: r.get(9)?,
                    loudness: r.get(10)?,
                    time_signature: r.get(11)?,
                })
            },
        );
        match result {
            Ok(features) => Ok(Some(features)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Embeddings
    // =========================================================================

    fn upsert_embedding(&self, kind: EntityKind, embedding: &Embedding) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let Some(entity_rowid) = rowid_of(&conn, kind, &embedding.entity_id)? else {
            bail!("{} {} not found", kind, embedding.entity_id);
        };
        let vector = serde_json::to_string(&embedding.vector)?;
        let metadata = serde_json::to_string(&embedding.metadata)?;
        conn.execute(
            &format!(
                "INSERT INTO {table} ({column}, vector, model_version, quality_score, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT({column}) DO UPDATE SET
                    vector = excluded.vector,
                    model_version = excluded.model_version,
                    quality_score = excluded.quality_score,
                    metadata = excluded.metadata,
                    modified_at = cast(strftime('%s','now') as int)",
                table = kind.embedding_table(),
                column = kind.entity_column(),
            ),
            params![
                entity_rowid,
                vector,
                &embedding.model_version,
                embedding.quality_score,
                metadata
            ],
        )?;
        Ok(())
    }

    fn list_embedding_candidates(&self, kind: EntityKind) -> Result<Vec<EmbeddingCandidate>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT e.name, e.id, emb.vector, emb.model_version, emb.quality_score, emb.metadata
             FROM {embeddings} emb
             JOIN {entities} e ON e.rowid = emb.{column}
             WHERE json_valid(emb.vector)
               AND json_type(emb.vector) = 'array'
               AND json_array_length(emb.vector) > 0
             ORDER BY e.name, e.id",
            embeddings = kind.embedding_table(),
            entities = kind.entity_table(),
            column = kind.entity_column(),
        ))?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, Option<f64>>(4)?,
                    r.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut candidates = Vec::with_capacity(rows.len());
        for (name, external_id, vector, model_version, quality_score, metadata) in rows {
            let vector: Vec<f64> = match serde_json::from_str(&vector) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Skipping {} {} embedding with non-numeric vector: {}", kind, external_id, e);
                    continue;
                }
            };
            let metadata: Map<String, JsonValue> = metadata
                .and_then(|m| serde_json::from_str(&m).ok())
                .unwrap_or_default();
            candidates.push(EmbeddingCandidate {
                name,
                external_id,
                vector,
                model_version: model_version.filter(|v| !v.is_empty()),
                quality_score,
                metadata,
            });
        }
        Ok(candidates)
    }

    fn list_subjects_missing_embedding(&self, kind: EntityKind) -> Result<Vec<EmbeddingSubject>> {
        let conn = self.conn.lock().unwrap();
        let sql = match kind {
            EntityKind::Artist => {
                "SELECT e.id, e.name, NULL, NULL FROM artists e
                 LEFT JOIN artist_embeddings emb ON emb.artist_rowid = e.rowid
                 WHERE emb.artist_rowid IS NULL
                 ORDER BY e.name, e.id"
            }
            EntityKind::Album => {
                "SELECT e.id, e.name, NULL, e.rowid FROM albums e
                 LEFT JOIN album_embeddings emb ON emb.album_rowid = e.rowid
                 WHERE emb.album_rowid IS NULL
                 ORDER BY e.name, e.id"
            }
            EntityKind::Track => {
                "SELECT e.id, e.name, al.name, al.rowid FROM tracks e
                 JOIN albums al ON al.rowid = e.album_rowid
                 LEFT JOIN track_embeddings emb ON emb.track_rowid = e.rowid
                 WHERE emb.track_rowid IS NULL
                 ORDER BY al.name, e.track_number, e.id"
            }
        };
        let rows = {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map([], |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, Option<String>>(2)?,
                        r.get::<_, Option<i64>>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut subjects = Vec::with_capacity(rows.len());
        for (id, name, album_name, album_rowid) in rows {
            let artist_names = match album_rowid {
                Some(rowid) => album_artist_names(&conn, rowid)?,
                None => vec![],
            };
            subjects.push(EmbeddingSubject {
                kind,
                id,
                name,
                album_name,
                artist_names,
            });
        }
        Ok(subjects)
    }

    fn get_enrichment_stats(&self) -> Result<EnrichmentStats> {
        let conn = self.conn.lock().unwrap();
        Ok(EnrichmentStats {
            tracks_with_features: count_rows(&conn, "audio_features")?,
            artist_embeddings: count_rows(&conn, EntityKind::Artist.embedding_table())?,
            album_embeddings: count_rows(&conn, EntityKind::Album.embedding_table())?,
            track_embeddings: count_rows(&conn, EntityKind::Track.embedding_table())?,
        })
    }
}

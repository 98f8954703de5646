//! Durable tier: compressed corpus payloads in SQLite
//!
//! Rows live in the `corpus_cache` table (created by [`crate::db::init_tables`]).
//! Payloads are zstd-compressed JSON tagged with [`DURABLE_SCHEMA_VERSION`];
//! rows written under another version are deleted on read and treated as a miss.

use super::{CacheError, CacheKey, CacheResult};
use crate::models::Corpus;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Bump when the serialized `Corpus` shape changes
pub const DURABLE_SCHEMA_VERSION: i64 = 1;

const ZSTD_LEVEL: i32 = 3;

/// Decoded durable row
#[derive(Debug, Clone)]
pub struct DurableEntry {
    pub corpus: Corpus,
    pub loaded_at: DateTime<Utc>,
}

/// Storage that survives process restarts
#[async_trait]
pub trait DurableTier: Send + Sync {
    /// Stored entry for `key` regardless of age; freshness is the caller's call
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<DurableEntry>>;

    /// Insert or replace
    async fn put(&self, key: &CacheKey, corpus: Arc<Corpus>, loaded_at: DateTime<Utc>) -> CacheResult<()>;

    /// Returns true if a row was deleted
    async fn remove(&self, key: &CacheKey) -> CacheResult<bool>;

    /// Delete every row, returning the count
    async fn clear(&self) -> CacheResult<u64>;

    /// Delete rows loaded before `cutoff`, returning the count
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> CacheResult<u64>;
}

fn durable_err(context: &str, e: impl std::fmt::Display) -> CacheError {
    CacheError::Durable(format!("{}: {}", context, e))
}

/// Serialize and compress a corpus
pub fn encode_payload(corpus: &Corpus) -> CacheResult<Vec<u8>> {
    let json = serde_json::to_vec(corpus).map_err(|e| durable_err("serialize corpus", e))?;
    zstd::encode_all(json.as_slice(), ZSTD_LEVEL).map_err(|e| durable_err("compress payload", e))
}

/// Decompress and deserialize a payload, rejecting inconsistent totals
pub fn decode_payload(payload: &[u8]) -> CacheResult<Corpus> {
    let json = zstd::decode_all(payload).map_err(|e| durable_err("decompress payload", e))?;
    let corpus: Corpus =
        serde_json::from_slice(&json).map_err(|e| durable_err("deserialize corpus", e))?;
    if !corpus.is_consistent() {
        return Err(CacheError::Durable(
            "stored corpus totals do not match its documents".to_string(),
        ));
    }
    Ok(corpus)
}

fn millis_to_datetime(ms: i64) -> CacheResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| CacheError::Durable(format!("invalid loaded_at_ms: {}", ms)))
}

/// SQLite-backed durable tier
#[derive(Clone)]
pub struct SqliteDurableTier {
    pool: SqlitePool,
}

impl SqliteDurableTier {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn delete_key(&self, key: &CacheKey) -> CacheResult<bool> {
        let result = sqlx::query("DELETE FROM corpus_cache WHERE cache_key = ?")
            .bind(key.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| durable_err("delete entry", e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl DurableTier for SqliteDurableTier {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<DurableEntry>> {
        let row = sqlx::query(
            "SELECT schema_version, payload, loaded_at_ms FROM corpus_cache WHERE cache_key = ?",
        )
        .bind(key.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| durable_err("read entry", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let version: i64 = row.get("schema_version");
        if version != DURABLE_SCHEMA_VERSION {
            tracing::warn!(
                key = %key,
                stored_version = version,
                expected_version = DURABLE_SCHEMA_VERSION,
                "Durable entry has stale schema version, discarding"
            );
            self.delete_key(key).await?;
            return Ok(None);
        }

        let payload: Vec<u8> = row.get("payload");
        let loaded_at = millis_to_datetime(row.get("loaded_at_ms"))?;

        let corpus = tokio::task::spawn_blocking(move || decode_payload(&payload))
            .await
            .map_err(|e| CacheError::Internal(format!("decode task failed: {}", e)))?;

        match corpus {
            Ok(corpus) => Ok(Some(DurableEntry { corpus, loaded_at })),
            Err(e) => {
                // Corrupt rows would fail every read; drop them
                self.delete_key(key).await?;
                Err(e)
            }
        }
    }

    async fn put(&self, key: &CacheKey, corpus: Arc<Corpus>, loaded_at: DateTime<Utc>) -> CacheResult<()> {
        let payload = tokio::task::spawn_blocking(move || encode_payload(&corpus))
            .await
            .map_err(|e| CacheError::Internal(format!("encode task failed: {}", e)))??;
        let payload_bytes = payload.len() as i64;

        sqlx::query(
            r#"
            INSERT INTO corpus_cache (cache_key, schema_version, payload, loaded_at_ms, payload_bytes)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                schema_version = excluded.schema_version,
                payload = excluded.payload,
                loaded_at_ms = excluded.loaded_at_ms,
                payload_bytes = excluded.payload_bytes
            "#,
        )
        .bind(key.to_string())
        .bind(DURABLE_SCHEMA_VERSION)
        .bind(payload)
        .bind(loaded_at.timestamp_millis())
        .bind(payload_bytes)
        .execute(&self.pool)
        .await
        .map_err(|e| durable_err("write entry", e))?;

        tracing::debug!(key = %key, payload_bytes, "Durable entry written");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> CacheResult<bool> {
        self.delete_key(key).await
    }

    async fn clear(&self) -> CacheResult<u64> {
        let result = sqlx::query("DELETE FROM corpus_cache")
            .execute(&self.pool)
            .await
            .map_err(|e| durable_err("clear entries", e))?;
        Ok(result.rows_affected())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> CacheResult<u64> {
        let result = sqlx::query("DELETE FROM corpus_cache WHERE loaded_at_ms <= ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| durable_err("purge entries", e))?;
        Ok(result.rows_affected())
    }
}

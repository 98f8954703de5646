//! In-process memory tier
//!
//! Expiry is lazy: an expired entry is removed by the read that finds it.

use super::{is_fresh, CacheKey};
use crate::models::Corpus;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Memory-resident entry
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub corpus: Arc<Corpus>,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: RwLock<HashMap<CacheKey, MemoryEntry>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh entry for `key`, dropping it if it has expired
    pub async fn get(&self, key: &CacheKey, now: DateTime<Utc>, ttl: Duration) -> Option<MemoryEntry> {
        let loaded_at = {
            let entries = self.entries.read().await;
            let entry = entries.get(key)?;
            if is_fresh(entry.loaded_at, now, ttl) {
                return Some(entry.clone());
            }
            entry.loaded_at
        };

        let mut entries = self.entries.write().await;
        // A concurrent put may have replaced the stale entry
        if entries.get(key).is_some_and(|e| e.loaded_at == loaded_at) {
            entries.remove(key);
            tracing::debug!(key = %key, "Expired memory entry dropped");
        }
        None
    }

    pub async fn put(&self, key: CacheKey, corpus: Arc<Corpus>, loaded_at: DateTime<Utc>) {
        self.entries
            .write()
            .await
            .insert(key, MemoryEntry { corpus, loaded_at });
    }

    /// Returns true if an entry was present
    pub async fn remove(&self, key: &CacheKey) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Drop everything, returning the number of entries removed
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        count
    }

    /// Sweep expired entries, returning the number removed
    pub async fn purge_expired(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| is_fresh(entry.loaded_at, now, ttl));
        before - entries.len()
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

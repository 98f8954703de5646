//! Tiered corpus cache
//!
//! Read path: memory → durable (SQLite, compressed) → network fetch + parse.
//! Each miss falls through; each hit fills the faster tiers above it.
//! Durable and network loads for one key are single-flight through the
//! [`LoadCoordinator`]; invalidations fan out to sibling cache instances over
//! an [`InvalidationBus`].

pub mod coordinator;
pub mod durable;
pub mod invalidation;
pub mod key;
pub mod loader;
pub mod memory;
pub mod stats;
pub mod tiered;

pub use coordinator::{LoadCoordinator, LoadRole};
pub use durable::{DurableEntry, DurableTier, SqliteDurableTier, DURABLE_SCHEMA_VERSION};
pub use invalidation::{
    BroadcastInvalidationBus, InvalidationBus, InvalidationEvent, InvalidationHandler, Subscription,
};
pub use key::{CacheKey, CorpusQuery, KeyKind};
pub use loader::{parse_corpus, CorpusSource, HttpCorpusSource, NetworkLoader};
pub use memory::MemoryTier;
pub use stats::CacheStats;
pub use tiered::{TieredCache, TieredCacheConfig};

use crate::models::Corpus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Cache errors
///
/// `Clone` so one single-flight result can be handed to every joined caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// No source is registered for the corpus type; nothing was loaded
    #[error("Unsupported corpus type: {0}")]
    UnsupportedCorpus(String),

    /// Fetching the raw corpus failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Raw corpus could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Durable tier read/write failure (never surfaced by `get`)
    #[error("Durable tier error: {0}")]
    Durable(String),

    /// Cache key string does not have the `{type}:{kind}:{digest}` shape
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Tier a returned entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    Memory,
    Durable,
    Network,
}

impl CacheSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheSource::Memory => "memory",
            CacheSource::Durable => "durable",
            CacheSource::Network => "network",
        }
    }
}

impl std::fmt::Display for CacheSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Corpus returned by the cache
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub corpus: Arc<Corpus>,
    pub source: CacheSource,
    /// When the corpus was fetched from the network (kept across promotions)
    pub loaded_at: DateTime<Utc>,
}

/// An entry is valid only while `now - loaded_at < ttl`
pub fn is_fresh(loaded_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    match (now - loaded_at).to_std() {
        Ok(age) => age < ttl,
        // loaded_at in the future (clock skew between writers) counts as fresh
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_freshness_boundary() {
        let t0 = Utc::now();
        let ttl = Duration::from_secs(30 * 60);

        assert!(is_fresh(t0, t0, ttl));
        assert!(is_fresh(t0, t0 + ChronoDuration::minutes(29), ttl));
        assert!(!is_fresh(t0, t0 + ChronoDuration::minutes(30), ttl));
        assert!(!is_fresh(t0, t0 + ChronoDuration::minutes(31), ttl));
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let now = Utc::now();
        assert!(is_fresh(now + ChronoDuration::seconds(5), now, Duration::from_secs(1)));
    }

    #[test]
    fn test_source_serializes_lowercase() {
        assert_eq!(serde_json::to_value(CacheSource::Durable).unwrap(), "durable");
        assert_eq!(CacheSource::Network.to_string(), "network");
    }
}

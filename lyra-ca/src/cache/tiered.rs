//! Tiered cache facade
//!
//! `get` serves from memory when fresh, otherwise runs one coordinated load
//! per key that tries the durable tier and then the network. Network results
//! land in memory before `get` returns; the durable write happens in the
//! background and is awaited by `invalidate`, `clear` and `shutdown` so a
//! late write can never resurrect a removed entry.
//!
//! Every removal bumps a generation for the affected keys. A load that was
//! already running when its key was removed still answers its callers, but
//! its result is not stored in either tier.

use super::invalidation::{InvalidationBus, InvalidationEvent, InvalidationHandler, Subscription};
use super::stats::CacheCounters;
use super::{
    is_fresh, CacheEntry, CacheError, CacheKey, CacheResult, CacheSource, CacheStats, CorpusQuery,
    DurableTier, LoadCoordinator, LoadRole, MemoryTier, NetworkLoader,
};
use crate::models::Corpus;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::FutureExt;
use lyra_common::config::CacheConfig;
use lyra_common::Clock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Cache tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieredCacheConfig {
    /// Entries older than this are misses in every tier
    pub ttl: Duration,
    /// When false the durable tier is skipped even if one is supplied
    pub durable_enabled: bool,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            durable_enabled: true,
        }
    }
}

impl From<&CacheConfig> for TieredCacheConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl(),
            durable_enabled: config.durable_enabled,
        }
    }
}

struct CacheInner {
    origin: Uuid,
    ttl: Duration,
    memory: MemoryTier,
    durable: Option<Arc<dyn DurableTier>>,
    loader: NetworkLoader,
    coordinator: LoadCoordinator,
    bus: Arc<dyn InvalidationBus>,
    clock: Arc<dyn Clock>,
    counters: Arc<CacheCounters>,
    /// Held across the join by flushers so none returns while a write is outstanding
    pending_writes: AsyncMutex<JoinSet<()>>,
    generations: Mutex<Generations>,
}

/// Removal counters used to detect loads that raced an invalidation
#[derive(Debug, Default)]
struct Generations {
    /// Bumped by `clear`
    epoch: u64,
    keys: HashMap<CacheKey, u64>,
}

/// Snapshot of the removal state of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Generation {
    epoch: u64,
    key: u64,
}

impl Generations {
    fn of(&self, key: &CacheKey) -> Generation {
        Generation {
            epoch: self.epoch,
            key: self.keys.get(key).copied().unwrap_or(0),
        }
    }

    fn bump(&mut self, key: &CacheKey) {
        *self.keys.entry(key.clone()).or_insert(0) += 1;
    }

    fn bump_all(&mut self) {
        // A new epoch supersedes every per-key counter
        self.epoch += 1;
        self.keys.clear();
    }
}

fn drain_finished(writes: &mut JoinSet<()>) {
    while let Some(finished) = writes.try_join_next() {
        if let Err(e) = finished {
            tracing::warn!(error = %e, "Durable write task failed");
        }
    }
}

impl CacheInner {
    fn lock_generations(&self) -> MutexGuard<'_, Generations> {
        self.generations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn generation(&self, key: &CacheKey) -> Generation {
        self.lock_generations().of(key)
    }

    async fn memory_lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.memory.get(key, self.clock.now(), self.ttl).await?;
        CacheCounters::incr(&self.counters.memory_hits);
        tracing::debug!(key = %key, "Corpus served from memory");
        Some(CacheEntry {
            key: key.clone(),
            corpus: entry.corpus,
            source: CacheSource::Memory,
            loaded_at: entry.loaded_at,
        })
    }

    async fn durable_lookup(&self, key: &CacheKey, seen: Generation) -> Option<CacheEntry> {
        let durable = self.durable.as_ref()?;

        let entry = match durable.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Durable read failed, falling through to network");
                return None;
            }
        };

        if !is_fresh(entry.loaded_at, self.clock.now(), self.ttl) {
            // The network load below overwrites the stale row
            tracing::debug!(key = %key, loaded_at = %entry.loaded_at, "Durable entry expired");
            return None;
        }

        let corpus = Arc::new(entry.corpus);
        // Promotion keeps the original load time so TTL is not extended
        if self.store(key, &corpus, entry.loaded_at, seen, false).await {
            tracing::debug!(key = %key, "Corpus promoted from durable tier");
        }
        CacheCounters::incr(&self.counters.durable_hits);

        Some(CacheEntry {
            key: key.clone(),
            corpus,
            source: CacheSource::Durable,
            loaded_at: entry.loaded_at,
        })
    }

    /// Body of a coordinated load
    async fn load_through(self: Arc<Self>, key: CacheKey, query: CorpusQuery) -> CacheResult<CacheEntry> {
        let seen = self.generation(&key);
        // A load that settled just before this ticket was created may have filled memory
        if let Some(entry) = self.memory_lookup(&key).await {
            return Ok(entry);
        }
        if let Some(entry) = self.durable_lookup(&key, seen).await {
            return Ok(entry);
        }

        let corpus = match self.loader.load(&key, &query).await {
            Ok(corpus) => Arc::new(corpus),
            Err(e) => {
                CacheCounters::incr(&self.counters.load_failures);
                tracing::warn!(key = %key, error = %e, "Corpus load failed");
                return Err(e);
            }
        };

        let loaded_at = self.clock.now();
        CacheCounters::incr(&self.counters.network_loads);
        if !self.store(&key, &corpus, loaded_at, seen, true).await {
            tracing::info!(key = %key, "Key invalidated during load, result not cached");
        }

        tracing::info!(
            key = %key,
            documents = corpus.total_documents,
            words = corpus.total_words,
            "Corpus loaded from network"
        );

        Ok(CacheEntry {
            key,
            corpus,
            source: CacheSource::Network,
            loaded_at,
        })
    }

    /// Fill memory (and optionally durable storage) unless `key` was removed since `seen`
    ///
    /// The check and the fill happen under the write lock. Removals bump the
    /// generation before taking that lock, so either the fill lands before
    /// the removal flushes or the fill is skipped.
    async fn store(
        &self,
        key: &CacheKey,
        corpus: &Arc<Corpus>,
        loaded_at: DateTime<Utc>,
        seen: Generation,
        write_durable: bool,
    ) -> bool {
        let mut writes = self.pending_writes.lock().await;
        if self.generation(key) != seen {
            return false;
        }

        self.memory
            .put(key.clone(), Arc::clone(corpus), loaded_at)
            .await;

        let Some(durable) = self.durable.clone().filter(|_| write_durable) else {
            return true;
        };
        let counters = Arc::clone(&self.counters);
        let key = key.clone();
        let corpus = Arc::clone(corpus);

        drain_finished(&mut writes);
        writes.spawn(async move {
            if let Err(e) = durable.put(&key, corpus, loaded_at).await {
                CacheCounters::incr(&counters.durable_write_failures);
                tracing::warn!(key = %key, error = %e, "Durable write failed");
            }
        });
        true
    }

    /// Wait for every background durable write, including ones another flusher is joining
    async fn flush_writes(&self) {
        let mut writes = self.pending_writes.lock().await;
        while let Some(finished) = writes.join_next().await {
            if let Err(e) = finished {
                tracing::warn!(error = %e, "Durable write task failed");
            }
        }
    }

    async fn remove_key(&self, key: &CacheKey) {
        self.lock_generations().bump(key);
        self.flush_writes().await;
        self.memory.remove(key).await;
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.remove(key).await {
                tracing::warn!(key = %key, error = %e, "Durable delete failed");
            }
        }
    }

    async fn remove_all(&self) {
        self.lock_generations().bump_all();
        self.flush_writes().await;
        let dropped = self.memory.clear().await;
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.clear().await {
                tracing::warn!(error = %e, "Durable clear failed");
            }
        }
        tracing::debug!(memory_entries = dropped, "Local cache tiers cleared");
    }

    /// Apply an invalidation published by another instance; never re-publishes
    async fn apply_remote(&self, event: InvalidationEvent) {
        if event.origin() == self.origin {
            return;
        }
        CacheCounters::incr(&self.counters.remote_invalidations);

        match event {
            InvalidationEvent::Invalidate { key, origin } => {
                tracing::debug!(key = %key, origin = %origin, "Applying remote invalidation");
                self.remove_key(&key).await;
            }
            InvalidationEvent::Clear { origin } => {
                tracing::info!(origin = %origin, "Applying remote cache clear");
                self.remove_all().await;
            }
        }
    }
}

/// Memory → durable → network corpus cache
pub struct TieredCache {
    inner: Arc<CacheInner>,
    subscription: Mutex<Option<Subscription>>,
}

impl TieredCache {
    /// Build a cache and subscribe it to `bus`
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        config: TieredCacheConfig,
        loader: NetworkLoader,
        durable: Option<Arc<dyn DurableTier>>,
        bus: Arc<dyn InvalidationBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let durable = durable.filter(|_| config.durable_enabled);

        let inner = Arc::new(CacheInner {
            origin: Uuid::new_v4(),
            ttl: config.ttl,
            memory: MemoryTier::new(),
            durable,
            loader,
            coordinator: LoadCoordinator::new(),
            bus,
            clock,
            counters: Arc::new(CacheCounters::default()),
            pending_writes: AsyncMutex::new(JoinSet::new()),
            generations: Mutex::new(Generations::default()),
        });

        let weak = Arc::downgrade(&inner);
        let handler: InvalidationHandler = Arc::new(move |event| {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.apply_remote(event).await;
                }
            }
            .boxed()
        });
        let subscription = inner.bus.subscribe(handler);

        tracing::info!(
            origin = %inner.origin,
            ttl_secs = config.ttl.as_secs(),
            durable = inner.durable.is_some(),
            "Corpus cache initialized"
        );

        Self {
            inner,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    /// Identifier stamped on invalidations this instance publishes
    pub fn origin(&self) -> Uuid {
        self.inner.origin
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Corpus for `query`, loading through the tiers on a miss
    ///
    /// Unsupported corpus types fail before any tier is consulted. Load
    /// failures leave every tier unchanged.
    pub async fn get(&self, query: &CorpusQuery) -> CacheResult<CacheEntry> {
        if !self.inner.loader.supports(&query.corpus_type) {
            return Err(CacheError::UnsupportedCorpus(query.corpus_type.clone()));
        }

        let key = query.key();
        if let Some(entry) = self.inner.memory_lookup(&key).await {
            return Ok(entry);
        }

        let load = Arc::clone(&self.inner).load_through(key.clone(), query.clone());
        let (result, role) = self.inner.coordinator.run(key, load).await;

        if role == LoadRole::Joined {
            CacheCounters::incr(&self.inner.counters.joined_loads);
        }
        result
    }

    /// Drop `key` from every local tier and tell other instances
    ///
    /// Returns after any pending durable write has landed and been deleted.
    /// A load of `key` already in flight still answers its callers but does
    /// not repopulate either tier.
    pub async fn invalidate(&self, key: &CacheKey) {
        self.inner.remove_key(key).await;
        CacheCounters::incr(&self.inner.counters.invalidations);
        self.inner.bus.publish(InvalidationEvent::Invalidate {
            key: key.clone(),
            origin: self.inner.origin,
        });
        tracing::info!(key = %key, "Corpus cache key invalidated");
    }

    /// Drop everything from every local tier and tell other instances
    ///
    /// Loads in flight when the clear starts are not cached.
    pub async fn clear(&self) {
        self.inner.remove_all().await;
        CacheCounters::incr(&self.inner.counters.invalidations);
        self.inner.bus.publish(InvalidationEvent::Clear {
            origin: self.inner.origin,
        });
        tracing::info!("Corpus cache cleared");
    }

    /// Remove expired entries from memory and durable storage
    ///
    /// Returns the number of durable rows deleted.
    pub async fn purge_expired(&self) -> CacheResult<u64> {
        let now = self.inner.clock.now();
        let swept = self.inner.memory.purge_expired(now, self.inner.ttl).await;

        let Some(durable) = &self.inner.durable else {
            return Ok(0);
        };
        let ttl = ChronoDuration::from_std(self.inner.ttl).unwrap_or_else(|_| ChronoDuration::days(36_500));
        let purged = durable.purge_older_than(now - ttl).await?;

        if swept > 0 || purged > 0 {
            tracing::info!(memory = swept, durable = purged, "Purged expired corpus entries");
        }
        Ok(purged)
    }

    /// Wait for background durable writes to land
    pub async fn flush_pending_writes(&self) {
        self.inner.flush_writes().await;
    }

    /// Whether memory currently holds `key` (ignores TTL)
    pub async fn memory_contains(&self, key: &CacheKey) -> bool {
        self.inner.memory.contains(key).await
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner
            .counters
            .snapshot(self.inner.memory.len().await, self.inner.coordinator.in_flight())
    }

    /// Stop listening for invalidations and wait for pending durable writes
    pub async fn shutdown(&self) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        self.inner.flush_writes().await;
        tracing::info!(origin = %self.inner.origin, "Corpus cache shut down");
    }
}

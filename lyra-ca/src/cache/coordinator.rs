//! Single-flight load coordination
//!
//! One ticket per key while a load is outstanding. Callers arriving while a
//! ticket exists await the same shared result instead of starting a second
//! load. The load runs on its own task, so a caller that gives up does not
//! cancel it for the others; the task retires its ticket when it settles.

use super::{CacheEntry, CacheError, CacheKey, CacheResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type SharedLoad = Shared<BoxFuture<'static, CacheResult<CacheEntry>>>;

struct LoadTicket {
    id: u64,
    pending: SharedLoad,
}

type TicketMap = HashMap<CacheKey, LoadTicket>;

/// How a caller took part in a coordinated load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadRole {
    /// Started the load
    Leader,
    /// Awaited a load another caller started
    Joined,
}

#[derive(Default)]
pub struct LoadCoordinator {
    in_flight: Arc<Mutex<TicketMap>>,
    next_id: AtomicU64,
}

fn lock(map: &Mutex<TicketMap>) -> MutexGuard<'_, TicketMap> {
    // Ticket bookkeeping cannot be left half-updated; recover from poison
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Remove the ticket only if it is still the one this load registered
fn retire(map: &Mutex<TicketMap>, key: &CacheKey, id: u64) {
    let mut in_flight = lock(map);
    if in_flight.get(key).is_some_and(|ticket| ticket.id == id) {
        in_flight.remove(key);
    }
}

impl LoadCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `load` for `key` unless a load for it is already outstanding
    ///
    /// `load` is only polled when this caller becomes the leader; a joined
    /// caller drops it unstarted.
    pub async fn run<F>(&self, key: CacheKey, load: F) -> (CacheResult<CacheEntry>, LoadRole)
    where
        F: Future<Output = CacheResult<CacheEntry>> + Send + 'static,
    {
        let (pending, role) = {
            let mut in_flight = lock(&self.in_flight);

            if let Some(ticket) = in_flight.get(&key) {
                drop(load);
                (ticket.pending.clone(), LoadRole::Joined)
            } else {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);

                let registry = Arc::clone(&self.in_flight);
                let task_key = key.clone();
                let handle = tokio::spawn(async move {
                    let result = load.await;
                    retire(&registry, &task_key, id);
                    result
                });

                let registry = Arc::clone(&self.in_flight);
                let panic_key = key.clone();
                let pending = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(e) => {
                            // The task never reached its own retire call
                            retire(&registry, &panic_key, id);
                            Err(CacheError::Internal(format!("corpus load task failed: {}", e)))
                        }
                    }
                }
                .boxed()
                .shared();

                in_flight.insert(
                    key.clone(),
                    LoadTicket {
                        id,
                        pending: pending.clone(),
                    },
                );
                (pending, LoadRole::Leader)
            }
        };

        if role == LoadRole::Joined {
            tracing::debug!(key = %key, "Joined in-flight corpus load");
        }

        (pending.await, role)
    }

    /// Number of keys with an outstanding load
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    pub fn is_loading(&self, key: &CacheKey) -> bool {
        lock(&self.in_flight).contains_key(key)
    }
}

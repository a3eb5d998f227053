//! Process-wide cache of tenant-bound models.
//!
//! Keyed by `(entity, tenant)`. Each key owns a `OnceCell`, so concurrent
//! first uses of the same key compile once and share the result. The cache
//! is bounded: when it grows past capacity the least recently used entries
//! are evicted, skipping any binding still held by a caller and any key
//! whose compilation is in flight.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

use super::{ModelError, TenantModel};
use crate::tenant::TenantId;

pub type CacheKey = (String, Option<TenantId>);

struct Slot {
    model: OnceCell<Arc<TenantModel>>,
    last_used: AtomicU64,
}

impl Slot {
    fn new(tick: u64) -> Self {
        Self { model: OnceCell::new(), last_used: AtomicU64::new(tick) }
    }

    /// Only the cache map holds the slot and nobody outside holds the model
    fn is_idle(slot: &Arc<Slot>) -> bool {
        Arc::strong_count(slot) == 1
            && slot.model.get().map_or(true, |model| Arc::strong_count(model) == 1)
    }
}

pub struct ModelCache {
    slots: RwLock<HashMap<CacheKey, Arc<Slot>>>,
    capacity: usize,
    clock: AtomicU64,
    compilations: AtomicU64,
    evictions: AtomicU64,
}

impl ModelCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            clock: AtomicU64::new(0),
            compilations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return the cached binding for `key`, compiling it on first use.
    ///
    /// A failed compilation leaves the key empty; the next caller retries.
    pub async fn get_or_compile<F, Fut>(&self, key: CacheKey, compile: F) -> Result<Arc<TenantModel>, ModelError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TenantModel, ModelError>>,
    {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;

        // Fast path: try read lock
        let existing = {
            let slots = self.slots.read().await;
            slots.get(&key).cloned()
        };

        let slot = match existing {
            Some(slot) => {
                debug!("Model cache hit: {} / {:?}", key.0, key.1.as_ref().map(TenantId::as_str));
                slot
            }
            None => {
                let mut slots = self.slots.write().await;
                let slot = slots.entry(key.clone()).or_insert_with(|| Arc::new(Slot::new(tick))).clone();
                self.evict_over_capacity(&mut slots, &key);
                slot
            }
        };
        slot.last_used.store(tick, Ordering::Relaxed);

        let model = slot
            .model
            .get_or_try_init(|| async {
                self.compilations.fetch_add(1, Ordering::Relaxed);
                compile().await.map(Arc::new)
            })
            .await?;
        Ok(model.clone())
    }

    fn evict_over_capacity(&self, slots: &mut HashMap<CacheKey, Arc<Slot>>, keep: &CacheKey) {
        while slots.len() > self.capacity {
            let victim = slots
                .iter()
                .filter(|(key, slot)| *key != keep && Slot::is_idle(slot))
                .min_by_key(|(_, slot)| slot.last_used.load(Ordering::Relaxed))
                .map(|(key, _)| key.clone());

            match victim {
                Some(key) => {
                    slots.remove(&key);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!("Evicted model binding {} / {:?}", key.0, key.1.as_ref().map(TenantId::as_str));
                }
                None => {
                    debug!("Model cache over capacity ({}), every entry in use", slots.len());
                    break;
                }
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Number of compilations started, including failed ones
    pub fn compilations(&self) -> u64 {
        self.compilations.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

//! Bounded cache of computed display values
//!
//! Entries are tagged with the spawner epoch they were computed at. A lookup
//! with a newer epoch discards the entry. When full, the least recently used
//! entry is evicted.

use parking_lot::Mutex;
use spawner_core::id::SpawnerId;
use std::collections::HashMap;

use crate::display::{DisplayValues, ViewKind};

type CacheKey = (SpawnerId, ViewKind);

struct CacheEntry {
    epoch: u64,
    values: DisplayValues,
    last_used: u64,
}

struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    clock: u64,
    hits: u64,
    misses: u64,
    stale: u64,
    evictions: u64,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub len: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries discarded for an epoch mismatch
    pub stale: u64,
    pub evictions: u64,
}

/// Process-scoped LRU of per-spawner display values
pub struct DisplayCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl DisplayCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                clock: 0,
                hits: 0,
                misses: 0,
                stale: 0,
                evictions: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached values if they were computed at `epoch`
    pub fn get(&self, spawner: &SpawnerId, kind: ViewKind, epoch: u64) -> Option<DisplayValues> {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let tick = inner.clock;
        let key = (spawner.clone(), kind);

        let cached_epoch = match inner.entries.get(&key) {
            Some(entry) => entry.epoch,
            None => {
                inner.misses += 1;
                return None;
            }
        };

        if cached_epoch != epoch {
            inner.entries.remove(&key);
            inner.stale += 1;
            inner.misses += 1;
            return None;
        }

        inner.hits += 1;
        let entry = inner.entries.get_mut(&key)?;
        entry.last_used = tick;
        Some(entry.values.clone())
    }

    /// Store values computed at `epoch`
    pub fn insert(&self, spawner: &SpawnerId, kind: ViewKind, epoch: u64, values: DisplayValues) {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let tick = inner.clock;
        let key = (spawner.clone(), kind);

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            Self::evict_oldest(&mut inner);
        }
        inner.entries.insert(
            key,
            CacheEntry {
                epoch,
                values,
                last_used: tick,
            },
        );
    }

    fn evict_oldest(inner: &mut CacheInner) {
        let oldest = inner
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone());

        if let Some(key) = oldest {
            inner.entries.remove(&key);
            inner.evictions += 1;
            log::debug!("Evicted display cache entry for spawner {}", key.0);
        }
    }

    /// Drop every entry of one spawner
    pub fn evict_spawner(&self, spawner: &SpawnerId) {
        self.inner.lock().entries.retain(|(id, _), _| id != spawner);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            len: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            stale: inner.stale,
            evictions: inner.evictions,
        }
    }
}

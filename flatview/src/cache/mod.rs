use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    /// `None` when the window runs past what `Instant` can represent.
    expires_at: Option<Instant>,
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Bumped by every invalidation. A value computed under an older
    /// generation is handed back to its caller but never stored.
    generation: u64,
}

/// Memoizes values per key for a bounded time window.
///
/// Not single-flight: callers racing past an expired entry may each run the
/// producer. The producer runs without the lock held.
pub struct TtlCache<V> {
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        TtlCache {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                generation: 0,
            }),
        }
    }

    /// Return the cached value for `key` if it is still fresh, otherwise run
    /// `producer`, cache its value for `ttl` and return it. Producer errors
    /// are returned and nothing is cached.
    pub fn get_or_compute<F>(&self, key: &str, ttl: Duration, producer: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        let generation = {
            let inner = self.lock();
            if let Some(entry) = inner.entries.get(key) {
                if entry.expires_at.map_or(true, |at| Instant::now() < at) {
                    log::debug!("Cache hit: {key}");
                    return Ok(entry.value.clone());
                }
            }
            inner.generation
        };

        log::debug!("Cache miss: {key}");
        let value = producer()?;

        let mut inner = self.lock();
        if inner.generation == generation {
            inner.entries.insert(
                key.to_string(),
                CacheEntry {
                    value: value.clone(),
                    expires_at: Instant::now().checked_add(ttl),
                },
            );
        } else {
            log::debug!("Cache invalidated while computing {key}; not storing");
        }
        Ok(value)
    }

    /// Drop one entry, or every entry when `key` is `None`.
    pub fn invalidate(&self, key: Option<&str>) {
        let mut inner = self.lock();
        inner.generation += 1;
        match key {
            Some(k) => {
                inner.entries.remove(k);
            }
            None => inner.entries.clear(),
        }
    }

    /// Number of entries currently held, fresh or not.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::constants::{CACHE_MAX_ENTRIES, CACHE_STALE_SECS};

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub data: V,
    pub stored_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() < ttl
    }
}

/// Keyed TTL cache with single-flight fetches.
///
/// Entries are served while `now - stored_at < ttl`. Expired entries stay
/// readable through `get_stale` until they pass the stale horizon and the
/// map outgrows `max_entries`.
pub struct TtlCache<K, V> {
    ttl: Duration,
    stale_after: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    fetch_locks: RwLock<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_limits(
            ttl,
            ttl.max(Duration::from_secs(CACHE_STALE_SECS)),
            CACHE_MAX_ENTRIES,
        )
    }

    pub fn with_limits(ttl: Duration, stale_after: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            stale_after,
            max_entries: max_entries.max(1),
            entries: RwLock::new(HashMap::new()),
            fetch_locks: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.data.clone())
    }

    /// Returns the entry regardless of age.
    pub async fn get_stale(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries.get(key).map(|entry| entry.data.clone())
    }

    pub async fn insert(&self, key: K, data: V) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                data,
                stored_at: Instant::now(),
            },
        );
        if entries.len() > self.max_entries {
            self.prune(&mut entries);
        }
    }

    // Internal helper that drops stale entries, then the oldest ones if the
    // map is still over its cap.
    fn prune(&self, entries: &mut HashMap<K, CacheEntry<V>>) {
        let stale_after = self.stale_after;
        entries.retain(|_, entry| entry.stored_at.elapsed() <= stale_after);

        let excess = entries.len().saturating_sub(self.max_entries);
        if excess > 0 {
            let mut by_age: Vec<(Instant, K)> = entries
                .iter()
                .map(|(key, entry)| (entry.stored_at, key.clone()))
                .collect();
            by_age.sort_by_key(|(stored_at, _)| *stored_at);
            for (_, key) in by_age.into_iter().take(excess) {
                entries.remove(&key);
            }
        }
    }

    pub async fn invalidate(&self, key: &K) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }

    // Internal helper that supports `fetch_lock_for` operations.
    async fn fetch_lock_for(&self, key: &K) -> Arc<Mutex<()>> {
        {
            let guard = self.fetch_locks.read().await;
            if let Some(lock) = guard.get(key) {
                return lock.clone();
            }
        }

        let mut guard = self.fetch_locks.write().await;
        guard
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // Internal helper that drops the per-key lock once no caller holds it.
    async fn release_fetch_lock(&self, key: &K, lock: Arc<Mutex<()>>) {
        let mut guard = self.fetch_locks.write().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) <= 2 {
            guard.remove(key);
        }
    }

    /// Returns the fresh entry for `key`, or runs `fetch` and stores its
    /// success. Concurrent callers for the same key wait for the first fetch
    /// instead of issuing their own. Errors are returned and not cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(&key).await {
            return Ok(hit);
        }

        let lock = self.fetch_lock_for(&key).await;
        let result = {
            let _fetch_guard = lock.lock().await;
            match self.get(&key).await {
                Some(hit) => Ok(hit),
                None => match fetch().await {
                    Ok(data) => {
                        self.insert(key.clone(), data.clone()).await;
                        Ok(data)
                    }
                    Err(err) => Err(err),
                },
            }
        };
        self.release_fetch_lock(&key, lock).await;
        result
    }
}

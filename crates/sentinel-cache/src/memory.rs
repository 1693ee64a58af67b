//! In-process map cache backend with a periodic janitor sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::{Cache, CacheError, CacheResult, GetOutcome, DEFAULT_COUNTER_TTL};

/// Default interval between janitor sweeps of expired entries.
pub const DEFAULT_JANITOR_INTERVAL: Duration = Duration::from_secs(300);

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// An in-process, multi-writer-safe cache. A background task periodically
/// sweeps expired entries so memory doesn't grow unbounded between reads.
pub struct MemoryCache {
    store: Arc<DashMap<String, Entry>>,
    _janitor: tokio::task::JoinHandle<()>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_janitor_interval(DEFAULT_JANITOR_INTERVAL)
    }

    pub fn with_janitor_interval(interval: Duration) -> Self {
        let store: Arc<DashMap<String, Entry>> = Arc::new(DashMap::new());
        let janitor_store = store.clone();
        let janitor = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let before = janitor_store.len();
                janitor_store.retain(|_, entry| !entry.is_expired());
                let swept = before - janitor_store.len();
                if swept > 0 {
                    debug!(swept, "cache janitor swept expired entries");
                }
            }
        });
        Self {
            store,
            _janitor: janitor,
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        self._janitor.abort();
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.store.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<GetOutcome> {
        match self.store.get(key) {
            Some(entry) if !entry.is_expired() => Ok(GetOutcome::Hit(entry.value.clone())),
            Some(_) => {
                self.store.remove(key);
                Ok(GetOutcome::Miss)
            }
            None => Ok(GetOutcome::Miss),
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.store.remove(key);
        Ok(())
    }

    async fn delete_pattern(&self, prefix: &str) -> CacheResult<()> {
        self.store.retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(matches!(self.get(key).await?, GetOutcome::Hit(_)))
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<bool> {
        // dashmap's entry API gives us the atomicity SetNX requires: the
        // shard lock is held for the whole check-then-insert.
        match self.store.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(Entry {
                        value,
                        expires_at: Instant::now() + ttl,
                    });
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value,
                    expires_at: Instant::now() + ttl,
                });
                Ok(true)
            }
        }
    }

    async fn increment(&self, key: &str) -> CacheResult<i64> {
        self.increment_with_expiry_inner(key, None).await
    }

    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        self.increment_with_expiry_inner(key, Some(ttl)).await
    }
}

impl MemoryCache {
    async fn increment_with_expiry_inner(
        &self,
        key: &str,
        reset_ttl: Option<Duration>,
    ) -> CacheResult<i64> {
        let mut entry = self.store.entry(key.to_string()).or_insert_with(|| Entry {
            value: 0i64.to_le_bytes().to_vec(),
            expires_at: Instant::now() + DEFAULT_COUNTER_TTL,
        });

        if entry.is_expired() {
            entry.value = 0i64.to_le_bytes().to_vec();
        }

        let current = i64::from_le_bytes(
            entry
                .value
                .clone()
                .try_into()
                .map_err(|_| CacheError::Decode("counter value was not 8 bytes".into()))?,
        );
        let next = current + 1;
        entry.value = next.to_le_bytes().to_vec();
        if let Some(ttl) = reset_ttl {
            entry.expires_at = Instant::now() + ttl;
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = MemoryCache::new();
        cache
            .set("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), GetOutcome::Hit(b"v".to_vec()));
    }

    #[tokio::test]
    async fn get_after_ttl_is_a_miss() {
        let cache = MemoryCache::new();
        cache
            .set("k", b"v".to_vec(), Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap(), GetOutcome::Miss);
    }

    #[tokio::test]
    async fn set_nx_succeeds_once_before_expiry() {
        let cache = MemoryCache::new();
        assert!(cache.set_nx("k", b"1".to_vec(), Duration::from_secs(60)).await.unwrap());
        assert!(!cache.set_nx("k", b"2".to_vec(), Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn set_nx_succeeds_again_after_expiry() {
        let cache = MemoryCache::new();
        assert!(cache.set_nx("k", b"1".to_vec(), Duration::from_millis(1)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.set_nx("k", b"2".to_vec(), Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn increment_creates_counter_at_one() {
        let cache = MemoryCache::new();
        assert_eq!(cache.increment("counter").await.unwrap(), 1);
        assert_eq!(cache.increment("counter").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_pattern_removes_prefix_only() {
        let cache = MemoryCache::new();
        cache.set("endpoints:1", vec![], Duration::from_secs(60)).await.unwrap();
        cache.set("endpoints:2", vec![], Duration::from_secs(60)).await.unwrap();
        cache.set("incident:1", vec![], Duration::from_secs(60)).await.unwrap();
        cache.delete_pattern("endpoints:").await.unwrap();
        assert!(!cache.exists("endpoints:1").await.unwrap());
        assert!(cache.exists("incident:1").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_set_nx_succeeds_exactly_once() {
        let cache = Arc::new(MemoryCache::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .set_nx("shared", i.to_string().into_bytes(), Duration::from_secs(60))
                    .await
                    .unwrap()
            }));
        }
        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }
}

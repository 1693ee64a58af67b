//! No-op cache backend: always misses, writes always succeed. Useful when
//! the deployment has decided caching isn't worth the operational cost but
//! every call site still needs a `Cache` to hold.

use std::time::Duration;

use async_trait::async_trait;

use crate::{Cache, CacheResult, GetOutcome};

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl Cache for NoopCache {
    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> CacheResult<()> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> CacheResult<GetOutcome> {
        Ok(GetOutcome::Miss)
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Ok(())
    }

    async fn delete_pattern(&self, _prefix: &str) -> CacheResult<()> {
        Ok(())
    }

    async fn exists(&self, _key: &str) -> CacheResult<bool> {
        Ok(false)
    }

    async fn set_nx(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> CacheResult<bool> {
        // Every caller sees an empty cache, so SetNX always succeeds.
        Ok(true)
    }

    async fn increment(&self, _key: &str) -> CacheResult<i64> {
        Ok(1)
    }

    async fn increment_with_expiry(&self, _key: &str, _ttl: Duration) -> CacheResult<i64> {
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_misses() {
        let cache = NoopCache;
        cache.set("k", b"v".to_vec(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), GetOutcome::Miss);
    }
}

//! Remote key/value service backend. Backed by a Redis-compatible store
//! reached over `redis`'s async connection manager, which reconnects
//! transparently so callers don't each hand-roll retry logic.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::{Cache, CacheError, CacheResult, GetOutcome};

pub struct RemoteCache {
    conn: ConnectionManager,
}

impl RemoteCache {
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Backend(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RemoteCache {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn get(&self, key: &str) -> CacheResult<GetOutcome> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(match value {
            Some(bytes) => GetOutcome::Hit(bytes),
            None => GetOutcome::Miss,
        })
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn delete_pattern(&self, prefix: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let keys: Vec<String> = conn
            .keys(pattern)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        if !keys.is_empty() {
            conn.del::<_, ()>(keys)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        conn.exists(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let opts = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::EX(ttl.as_secs().max(1) as usize));
        let result: Option<String> = conn
            .set_options(key, value, opts)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(result.is_some())
    }

    async fn increment(&self, key: &str) -> CacheResult<i64> {
        self.increment_with_expiry(key, crate::DEFAULT_COUNTER_TTL).await
    }

    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        let mut conn = self.conn.clone();
        let next: i64 = conn
            .incr(key, 1)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        conn.expire::<_, ()>(key, ttl.as_secs().max(1) as i64)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(next)
    }
}

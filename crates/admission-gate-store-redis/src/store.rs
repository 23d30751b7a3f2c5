// crates/admission-gate-store-redis/src/store.rs
// ============================================================================
// Module: Redis Idempotency Store
// Description: IdempotencyStore implementation over a Redis connection manager.
// Purpose: Persist idempotency records and leases with server-side expiry.
// Dependencies: admission-gate-core, async-trait, redis
// ============================================================================

//! ## Overview
//! Each operation clones the [`ConnectionManager`] handle, which multiplexes
//! one connection and reconnects after failures. Every Redis error maps to
//! [`StoreError::Unavailable`] so the cache flow can degrade instead of
//! failing the request. `rediss://` URLs connect over rustls.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use admission_gate_core::IdempotencyStore;
use admission_gate_core::StoreError;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Redis-backed idempotency store.
#[derive(Clone)]
pub struct RedisIdempotencyStore {
    /// Reconnecting connection handle.
    manager: ConnectionManager,
}

impl RedisIdempotencyStore {
    /// Connects to Redis at `url` and verifies the connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the URL is invalid or the
    /// server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|err| StoreError::Unavailable(format!("redis client: {err}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| StoreError::Unavailable(format!("redis connect: {err}")))?;
        let store = Self {
            manager,
        };
        store.ping().await?;
        info!("connected to redis idempotency store");
        Ok(store)
    }

    /// Sends `PING` to the server.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the server does not answer.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|err| unavailable("ping", &err))
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.manager.clone();
        conn.get::<_, Option<Vec<u8>>>(key).await.map_err(|err| unavailable("get", &err))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(expiry_secs(ttl))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|err| unavailable("set", &err))
    }

    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        let reply = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(expiry_secs(ttl))
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(|err| unavailable("set nx", &err))?;
        Ok(reply.is_some())
    }

    async fn release(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await.map_err(|err| unavailable("del", &err))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts a TTL to whole seconds, never below one.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Maps a Redis error to an unavailable store error.
fn unavailable(operation: &str, err: &redis::RedisError) -> StoreError {
    StoreError::Unavailable(format!("redis {operation}: {err}"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use admission_gate_core::StoreError;

    use super::RedisIdempotencyStore;
    use super::expiry_secs;

    #[test]
    fn expiry_rounds_down_but_never_to_zero() {
        assert_eq!(expiry_secs(Duration::from_secs(86_400)), 86_400);
        assert_eq!(expiry_secs(Duration::from_millis(1_500)), 1);
        assert_eq!(expiry_secs(Duration::from_millis(10)), 1);
    }

    #[tokio::test]
    async fn invalid_url_is_unavailable() {
        let result = RedisIdempotencyStore::connect("not-a-url").await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn tls_url_is_understood_by_client() {
        assert!(redis::Client::open("rediss://127.0.0.1:6380/0").is_ok());
    }
}

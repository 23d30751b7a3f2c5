// crates/admission-gate-core/src/idempotency/store.rs
// ============================================================================
// Module: Idempotency Store
// Description: Key-value store seam with TTL and an in-memory implementation.
// Purpose: Decouple the cache flow from a concrete backend such as Redis.
// Dependencies: async-trait
// ============================================================================

//! ## Overview
//! [`IdempotencyStore`] is the minimal key-value contract the cache flow
//! needs: read, write with TTL, and an optional conditional claim used for
//! in-flight leases. Keys arrive fully namespaced.
//!
//! [`InMemoryIdempotencyStore`] keeps an expiry index next to its entries and
//! drops every expired entry on each write, so memory tracks live keys rather
//! than every key ever written.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// SECTION: Store Seam
// ============================================================================

/// Key-value store holding idempotency records and leases.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend cannot be reached.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend rejects the write.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Writes a marker under `key` only if absent; returns true when claimed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend cannot be reached.
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Removes `key` if present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend cannot be reached.
    async fn release(&self, key: &str) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Idempotency store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend unreachable or failed.
    #[error("idempotency store unavailable: {0}")]
    Unavailable(String),
    /// Stored value is not a valid record.
    #[error("corrupted idempotency record: {0}")]
    Corrupt(String),
    /// Record could not be serialized.
    #[error("idempotency record encoding failed: {0}")]
    Encode(String),
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Stored value with its expiry.
#[derive(Debug, Clone)]
struct Entry {
    /// Stored bytes.
    value: Vec<u8>,
    /// Instant after which the entry is treated as absent.
    expires_at: Instant,
}

/// Entry map plus an expiry index ordered by deadline.
#[derive(Debug, Default)]
struct Entries {
    /// Stored values by key.
    values: BTreeMap<String, Entry>,
    /// Deadlines by key; pairs for overwritten or released keys are skipped on purge.
    expiries: BTreeSet<(Instant, String)>,
}

impl Entries {
    /// Returns the live value under `key`.
    fn live(&self, key: &str, now: Instant) -> Option<&Entry> {
        self.values.get(key).filter(|entry| entry.expires_at > now)
    }

    /// Purges expired entries and stores `value` under `key`.
    fn insert(&mut self, key: &str, value: Vec<u8>, expires_at: Instant, now: Instant) {
        self.purge_expired(now);
        self.expiries.insert((expires_at, key.to_string()));
        self.values.insert(key.to_string(), Entry {
            value,
            expires_at,
        });
    }

    /// Removes every entry whose deadline has passed.
    fn purge_expired(&mut self, now: Instant) {
        while self.expiries.first().is_some_and(|(deadline, _)| *deadline <= now) {
            let Some((deadline, key)) = self.expiries.pop_first() else {
                break;
            };
            if self.values.get(&key).is_some_and(|entry| entry.expires_at == deadline) {
                self.values.remove(&key);
            }
        }
    }
}

/// In-memory store for development and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIdempotencyStore {
    /// Entries protected by a mutex.
    entries: Arc<Mutex<Entries>>,
}

impl InMemoryIdempotencyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the store lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let guard = self.lock()?;
        Ok(guard.values.values().filter(|entry| entry.expires_at > now).count())
    }

    /// Returns true when no live entries remain.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the store lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Writes raw bytes under `key`, bypassing record encoding.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the store lock is poisoned.
    pub fn insert_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        self.lock()?.insert(key, value, now + ttl, now);
        Ok(())
    }

    /// Locks the entry map.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Entries>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("idempotency store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        let guard = self.lock()?;
        Ok(guard.live(key, now).map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        self.insert_raw(key, value, ttl)
    }

    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut guard = self.lock()?;
        if guard.live(key, now).is_some() {
            return Ok(false);
        }
        guard.insert(key, b"1".to_vec(), now + ttl, now);
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.values.remove(key);
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

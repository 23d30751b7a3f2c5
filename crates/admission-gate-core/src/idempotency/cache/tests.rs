// crates/admission-gate-core/src/idempotency/cache/tests.rs
// ============================================================================
// Module: Idempotency Cache Flow Tests
// Description: Replay, degraded mode, corruption, and lease behavior.
// Purpose: Pin the store-outage and caching rules of the cache flow.
// Dependencies: tokio
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap for clarity."
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::CacheLookup;
use super::IdempotencyCache;
use super::IdempotencySettings;
use crate::error::AdmissionError;
use crate::idempotency::IdempotencyKey;
use crate::idempotency::record::IdempotencyRecord;
use crate::idempotency::store::IdempotencyStore;
use crate::idempotency::store::InMemoryIdempotencyStore;
use crate::idempotency::store::StoreError;
use crate::identity::TenantIdentity;

/// Store whose every operation fails.
struct UnreachableStore;

#[async_trait]
impl IdempotencyStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn claim(&self, _key: &str, _ttl: Duration) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn release(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

/// Store that never answers within the operation timeout.
struct StalledStore;

#[async_trait]
impl IdempotencyStore for StalledStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(None)
    }

    async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }

    async fn claim(&self, _key: &str, _ttl: Duration) -> Result<bool, StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(true)
    }

    async fn release(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

fn key(tenant: &str, client_key: &str) -> IdempotencyKey {
    IdempotencyKey::new(&TenantIdentity::fixture(tenant), Some(client_key)).unwrap()
}

fn created() -> IdempotencyRecord {
    IdempotencyRecord::new(
        201,
        BTreeMap::from([("Content-Type".to_string(), "application/json".to_string())]),
        br#"{"id":"p1"}"#.to_vec(),
    )
}

#[tokio::test]
async fn recorded_response_is_replayed() {
    let store = InMemoryIdempotencyStore::new();
    let cache = IdempotencyCache::new(Arc::new(store.clone()), IdempotencySettings::default());
    let key = key("abc", "k1");

    assert_eq!(cache.lookup(&key).await.unwrap(), CacheLookup::Miss {
        lease_held: false
    });
    cache.record(&key, &created(), false).await;
    assert_eq!(cache.lookup(&key).await.unwrap(), CacheLookup::Replay(created()));
    assert_eq!(store.len().unwrap(), 1);
}

#[tokio::test]
async fn records_are_isolated_per_tenant() {
    let cache = IdempotencyCache::new(
        Arc::new(InMemoryIdempotencyStore::new()),
        IdempotencySettings::default(),
    );
    cache.record(&key("abc", "k1"), &created(), false).await;
    assert!(matches!(cache.lookup(&key("xyz", "k1")).await.unwrap(), CacheLookup::Miss { .. }));
}

#[tokio::test]
async fn server_errors_are_not_recorded() {
    let store = InMemoryIdempotencyStore::new();
    let cache = IdempotencyCache::new(Arc::new(store.clone()), IdempotencySettings::default());
    let key = key("abc", "k1");
    let failure = IdempotencyRecord::new(500, BTreeMap::new(), b"boom".to_vec());

    cache.record(&key, &failure, false).await;
    assert!(store.is_empty().unwrap());
    assert!(matches!(cache.lookup(&key).await.unwrap(), CacheLookup::Miss { .. }));
}

#[tokio::test]
async fn unreachable_store_degrades_lookup_and_swallows_writes() {
    let cache = IdempotencyCache::new(Arc::new(UnreachableStore), IdempotencySettings::default());
    let key = key("abc", "k1");
    assert_eq!(cache.lookup(&key).await.unwrap(), CacheLookup::Degraded);
    cache.record(&key, &created(), false).await;
}

#[tokio::test]
async fn stalled_store_is_bounded_by_timeout() {
    let settings = IdempotencySettings {
        operation_timeout: Duration::from_millis(20),
        ..IdempotencySettings::default()
    };
    let cache = IdempotencyCache::new(Arc::new(StalledStore), settings);
    let started = std::time::Instant::now();
    assert_eq!(cache.lookup(&key("abc", "k1")).await.unwrap(), CacheLookup::Degraded);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn corrupted_record_is_internal_error() {
    let store = InMemoryIdempotencyStore::new();
    let key = key("abc", "k1");
    store.insert_raw(&key.storage_key(), b"{not json".to_vec(), Duration::from_secs(60)).unwrap();
    let cache = IdempotencyCache::new(Arc::new(store), IdempotencySettings::default());
    assert!(matches!(cache.lookup(&key).await, Err(AdmissionError::Internal(_))));
}

#[tokio::test]
async fn oversized_record_is_not_stored() {
    let store = InMemoryIdempotencyStore::new();
    let settings = IdempotencySettings {
        max_record_bytes: 16,
        ..IdempotencySettings::default()
    };
    let cache = IdempotencyCache::new(Arc::new(store.clone()), settings);
    cache.record(&key("abc", "k1"), &created(), false).await;
    assert!(store.is_empty().unwrap());
}

#[tokio::test]
async fn lease_rejects_concurrent_duplicate_until_released() {
    let store = InMemoryIdempotencyStore::new();
    let settings = IdempotencySettings {
        in_flight_lease: Some(Duration::from_secs(30)),
        ..IdempotencySettings::default()
    };
    let cache = IdempotencyCache::new(Arc::new(store.clone()), settings);
    let key = key("abc", "k1");

    assert_eq!(cache.lookup(&key).await.unwrap(), CacheLookup::Miss {
        lease_held: true
    });
    assert!(matches!(cache.lookup(&key).await, Err(AdmissionError::Conflict(_))));

    cache.record(&key, &created(), true).await;
    assert_eq!(cache.lookup(&key).await.unwrap(), CacheLookup::Replay(created()));
    assert_eq!(store.len().unwrap(), 1);
}

#[tokio::test]
async fn lease_is_released_when_response_is_not_cacheable() {
    let settings = IdempotencySettings {
        in_flight_lease: Some(Duration::from_secs(30)),
        ..IdempotencySettings::default()
    };
    let cache = IdempotencyCache::new(Arc::new(InMemoryIdempotencyStore::new()), settings);
    let key = key("abc", "k1");

    assert!(matches!(cache.lookup(&key).await.unwrap(), CacheLookup::Miss { lease_held: true }));
    let failure = IdempotencyRecord::new(503, BTreeMap::new(), Vec::new());
    cache.record(&key, &failure, true).await;
    assert!(matches!(cache.lookup(&key).await.unwrap(), CacheLookup::Miss { lease_held: true }));
}

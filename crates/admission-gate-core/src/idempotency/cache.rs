// crates/admission-gate-core/src/idempotency/cache.rs
// ============================================================================
// Module: Idempotency Cache Flow
// Description: Lookup, lease, and record steps around a handler invocation.
// Purpose: Replay known responses and record new ones without blocking on outages.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! [`IdempotencyCache`] wraps an [`IdempotencyStore`] with the admission
//! semantics: every store call is bounded by a timeout, lookup failures
//! degrade to a pass-through, corrupted records are surfaced as internal
//! errors, and only responses below 500 are recorded.
//!
//! Without a lease two concurrent first requests with the same key can both
//! miss and both run the handler; the later write wins. Enabling
//! [`IdempotencySettings::in_flight_lease`] claims a short-lived marker before
//! the handler runs and rejects concurrent duplicates with
//! [`AdmissionError::Conflict`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::DEFAULT_RECORD_TTL;
use super::IdempotencyKey;
use super::record::IdempotencyRecord;
use super::store::IdempotencyStore;
use super::store::StoreError;
use crate::error::AdmissionError;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Default bound on a single store operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(500);
/// Default maximum encoded record size.
pub const DEFAULT_MAX_RECORD_BYTES: usize = 1024 * 1024;

/// Tunables for the cache flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdempotencySettings {
    /// Record lifetime.
    pub ttl: Duration,
    /// Bound on each store operation.
    pub operation_timeout: Duration,
    /// Lease lifetime; `None` disables in-flight leases.
    pub in_flight_lease: Option<Duration>,
    /// Records larger than this are not stored.
    pub max_record_bytes: usize,
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_RECORD_TTL,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            in_flight_lease: None,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }
}

// ============================================================================
// SECTION: Lookup Outcome
// ============================================================================

/// Result of looking up an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// A stored response exists and must be replayed.
    Replay(IdempotencyRecord),
    /// No stored response; run the handler and record the result.
    Miss {
        /// Whether this request holds the in-flight lease.
        lease_held: bool,
    },
    /// Store unavailable; run the handler without recording.
    Degraded,
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Idempotency flow over a store.
#[derive(Clone)]
pub struct IdempotencyCache {
    /// Backing store.
    store: Arc<dyn IdempotencyStore>,
    /// Flow tunables.
    settings: IdempotencySettings,
}

impl IdempotencyCache {
    /// Creates a cache flow over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn IdempotencyStore>, settings: IdempotencySettings) -> Self {
        Self {
            store,
            settings,
        }
    }

    /// Returns the configured settings.
    #[must_use]
    pub const fn settings(&self) -> &IdempotencySettings {
        &self.settings
    }

    /// Looks up `key`, claiming the in-flight lease on a miss when enabled.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Internal`] for corrupted records and
    /// [`AdmissionError::Conflict`] when another request holds the lease.
    pub async fn lookup(&self, key: &IdempotencyKey) -> Result<CacheLookup, AdmissionError> {
        let storage_key = key.storage_key();
        let stored = match self.bounded(self.store.get(&storage_key)).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(
                    tenant_id = %key.tenant_id(),
                    error = %err,
                    "idempotency lookup failed; continuing in degraded mode"
                );
                return Ok(CacheLookup::Degraded);
            }
        };
        if let Some(bytes) = stored {
            return IdempotencyRecord::decode(&bytes).map(CacheLookup::Replay).map_err(|err| {
                error!(tenant_id = %key.tenant_id(), error = %err, "idempotency record unreadable");
                AdmissionError::Internal("corrupted idempotency record".to_string())
            });
        }
        let Some(lease_ttl) = self.settings.in_flight_lease else {
            return Ok(CacheLookup::Miss {
                lease_held: false,
            });
        };
        match self.bounded(self.store.claim(&key.lease_key(), lease_ttl)).await {
            Ok(true) => Ok(CacheLookup::Miss {
                lease_held: true,
            }),
            Ok(false) => Err(AdmissionError::Conflict(
                "a request with this idempotency key is already in progress".to_string(),
            )),
            Err(err) => {
                warn!(
                    tenant_id = %key.tenant_id(),
                    error = %err,
                    "idempotency lease claim failed; continuing without lease"
                );
                Ok(CacheLookup::Miss {
                    lease_held: false,
                })
            }
        }
    }

    /// Records the handler response for `key` when it is cacheable.
    ///
    /// Failures are logged and never surface to the caller.
    pub async fn record(&self, key: &IdempotencyKey, record: &IdempotencyRecord, lease_held: bool) {
        if record.is_cacheable() {
            self.store_record(key, record).await;
        } else {
            debug!(
                tenant_id = %key.tenant_id(),
                status = record.status_code,
                "response not cacheable; skipping idempotency record"
            );
        }
        if lease_held {
            self.release(key).await;
        }
    }

    /// Releases the in-flight lease for `key` without recording.
    pub async fn release(&self, key: &IdempotencyKey) {
        if let Err(err) = self.bounded(self.store.release(&key.lease_key())).await {
            warn!(tenant_id = %key.tenant_id(), error = %err, "idempotency lease release failed");
        }
    }

    /// Encodes and writes a cacheable record.
    async fn store_record(&self, key: &IdempotencyKey, record: &IdempotencyRecord) {
        let encoded = match record.encode() {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(tenant_id = %key.tenant_id(), error = %err, "idempotency record not stored");
                return;
            }
        };
        if encoded.len() > self.settings.max_record_bytes {
            warn!(
                tenant_id = %key.tenant_id(),
                size = encoded.len(),
                limit = self.settings.max_record_bytes,
                "idempotency record exceeds size limit; not stored"
            );
            return;
        }
        let storage_key = key.storage_key();
        if let Err(err) =
            self.bounded(self.store.put(&storage_key, encoded, self.settings.ttl)).await
        {
            warn!(tenant_id = %key.tenant_id(), error = %err, "idempotency record not stored");
        }
    }

    /// Applies the operation timeout to a store call.
    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        timeout(self.settings.operation_timeout, operation).await.map_err(|_| {
            StoreError::Unavailable(format!(
                "operation exceeded {}ms",
                self.settings.operation_timeout.as_millis()
            ))
        })?
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;

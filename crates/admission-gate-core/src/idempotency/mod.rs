// crates/admission-gate-core/src/idempotency/mod.rs
// ============================================================================
// Module: Idempotency
// Description: Tenant-scoped idempotency keys, records, stores, and cache flow.
// Purpose: Map a client-supplied key to exactly one executed side effect.
// Dependencies: async-trait, base64, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! State-changing requests (`POST`, `PUT`, `PATCH`) must carry an
//! `Idempotency-Key` header. The key is namespaced by the verified tenant and
//! looked up in an [`IdempotencyStore`]; a stored response is replayed
//! verbatim, otherwise the handler runs and a response with a status below 500
//! is recorded for [`DEFAULT_RECORD_TTL`]. Store outages never block requests:
//! lookups fall back to a degraded pass-through and write failures are only
//! logged.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache;
pub mod record;
pub mod store;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

pub use self::cache::CacheLookup;
pub use self::cache::IdempotencyCache;
pub use self::cache::IdempotencySettings;
pub use self::record::IdempotencyRecord;
pub use self::store::IdempotencyStore;
pub use self::store::InMemoryIdempotencyStore;
pub use self::store::StoreError;
use crate::error::AdmissionError;
use crate::identity::TenantIdentity;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the client-supplied idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
/// Namespace prefix for stored records.
pub const RECORD_KEY_PREFIX: &str = "idempotency";
/// Namespace prefix for in-flight leases.
pub const LEASE_KEY_PREFIX: &str = "idempotency-lease";
/// Default record lifetime.
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Maximum accepted client key length in bytes.
pub const MAX_CLIENT_KEY_BYTES: usize = 255;

/// Returns true when requests with `method` are subject to idempotency handling.
#[must_use]
pub fn applies_to(method: &str) -> bool {
    ["POST", "PUT", "PATCH"].iter().any(|candidate| candidate.eq_ignore_ascii_case(method))
}

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Tenant-namespaced idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyKey {
    /// Owning tenant.
    tenant_id: String,
    /// Client-supplied key.
    client_key: String,
}

impl IdempotencyKey {
    /// Builds the key for a verified tenant from the raw header value.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::BadRequest`] when the header is missing,
    /// empty, too long, or contains characters outside printable ASCII.
    pub fn new(identity: &TenantIdentity, header: Option<&str>) -> Result<Self, AdmissionError> {
        let client_key = header.map(str::trim).unwrap_or_default();
        if client_key.is_empty() {
            return Err(AdmissionError::BadRequest(format!(
                "{IDEMPOTENCY_KEY_HEADER} header is required"
            )));
        }
        if client_key.len() > MAX_CLIENT_KEY_BYTES {
            return Err(AdmissionError::BadRequest(format!(
                "{IDEMPOTENCY_KEY_HEADER} exceeds {MAX_CLIENT_KEY_BYTES} bytes"
            )));
        }
        if !client_key.bytes().all(|byte| byte.is_ascii_graphic()) {
            return Err(AdmissionError::BadRequest(format!(
                "{IDEMPOTENCY_KEY_HEADER} must be printable ASCII without spaces"
            )));
        }
        Ok(Self {
            tenant_id: identity.tenant_id().to_string(),
            client_key: client_key.to_string(),
        })
    }

    /// Returns the owning tenant id.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Returns the client-supplied key.
    #[must_use]
    pub fn client_key(&self) -> &str {
        &self.client_key
    }

    /// Returns the record key: `idempotency:<tenant_id>:<client_key>`.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{RECORD_KEY_PREFIX}:{}:{}", self.tenant_id, self.client_key)
    }

    /// Returns the in-flight lease key.
    #[must_use]
    pub fn lease_key(&self) -> String {
        format!("{LEASE_KEY_PREFIX}:{}:{}", self.tenant_id, self.client_key)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions use unwrap for clarity.")]

    use super::IdempotencyKey;
    use super::applies_to;
    use crate::error::AdmissionError;
    use crate::identity::TenantIdentity;

    #[test]
    fn only_state_changing_methods_apply() {
        assert!(applies_to("POST"));
        assert!(applies_to("put"));
        assert!(applies_to("PATCH"));
        assert!(!applies_to("GET"));
        assert!(!applies_to("DELETE"));
        assert!(!applies_to("HEAD"));
    }

    #[test]
    fn keys_are_namespaced_by_tenant() {
        let first = IdempotencyKey::new(&TenantIdentity::fixture("abc"), Some("k1")).unwrap();
        let second = IdempotencyKey::new(&TenantIdentity::fixture("xyz"), Some("k1")).unwrap();
        assert_eq!(first.storage_key(), "idempotency:abc:k1");
        assert_eq!(first.lease_key(), "idempotency-lease:abc:k1");
        assert_ne!(first.storage_key(), second.storage_key());
    }

    #[test]
    fn missing_or_malformed_keys_are_bad_requests() {
        let identity = TenantIdentity::fixture("abc");
        let oversized = "k".repeat(256);
        for header in [None, Some(""), Some("   "), Some("has space"), Some(oversized.as_str())] {
            assert!(matches!(
                IdempotencyKey::new(&identity, header),
                Err(AdmissionError::BadRequest(_))
            ));
        }
    }
}

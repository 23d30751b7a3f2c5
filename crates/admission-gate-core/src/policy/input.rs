// crates/admission-gate-core/src/policy/input.rs
// ============================================================================
// Module: Policy Input
// Description: Evaluation input and decision types for the policy authorizer.
// Purpose: Expose only an allow-listed request view to policy evaluation.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`PolicyInput`] is the complete view of a request that a policy may
//! inspect. It can only be built from a verified [`TenantIdentity`], and the
//! request headers it carries are filtered through
//! [`POLICY_HEADER_ALLOWLIST`] so credentials or cookies never reach policy
//! code.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::error::AdmissionError;
use crate::identity::TenantIdentity;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Request headers exposed to policy evaluation, in canonical form.
pub const POLICY_HEADER_ALLOWLIST: [&str; 6] = [
    "Content-Type",
    "Accept",
    "Idempotency-Key",
    "X-Request-ID",
    "X-Forwarded-For",
    "X-Real-IP",
];

/// Returns the canonical allow-listed spelling of `name`, if it is allowed.
#[must_use]
pub fn canonical_policy_header(name: &str) -> Option<&'static str> {
    POLICY_HEADER_ALLOWLIST.iter().copied().find(|allowed| allowed.eq_ignore_ascii_case(name))
}

// ============================================================================
// SECTION: Tenant Attributes
// ============================================================================

/// Attribute bag describing what a tenant is entitled to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantAttributes {
    /// Granted permissions, e.g. `create_payments`.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Commercial tier label.
    #[serde(default = "default_tier")]
    pub tier: String,
    /// Whether the tenant is in good compliance standing.
    #[serde(default)]
    pub compliant: bool,
}

impl Default for TenantAttributes {
    fn default() -> Self {
        Self {
            permissions: vec![
                "create_payments".to_string(),
                "update_payments".to_string(),
                "read_payments".to_string(),
            ],
            tier: default_tier(),
            compliant: true,
        }
    }
}

impl TenantAttributes {
    /// Returns true when the tenant holds `permission`.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|granted| granted == permission)
    }
}

/// Default tier label.
fn default_tier() -> String {
    "enterprise".to_string()
}

// ============================================================================
// SECTION: Request Attributes
// ============================================================================

/// Transport-level request attributes collected before evaluation.
#[derive(Debug, Clone, Default)]
pub struct RequestAttributes {
    /// HTTP method.
    pub method: String,
    /// Request path without query string.
    pub path: String,
    /// Raw request headers; filtered when the input is built.
    pub headers: Vec<(String, String)>,
    /// User agent string.
    pub user_agent: String,
    /// Client address as seen by the gateway.
    pub client_ip: String,
}

// ============================================================================
// SECTION: Policy Input
// ============================================================================

/// Complete evaluation input for a single request.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyInput {
    /// Tenant id from the verified identity.
    pub tenant_id: String,
    /// HTTP method, uppercase.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Allow-listed headers keyed by canonical name; first value wins.
    pub headers: BTreeMap<String, String>,
    /// User agent string.
    pub user_agent: String,
    /// Client address.
    pub client_ip: String,
    /// Tenant attribute bag.
    pub attributes: TenantAttributes,
}

impl PolicyInput {
    /// Builds the input for a verified tenant.
    #[must_use]
    pub fn new(
        identity: &TenantIdentity,
        request: RequestAttributes,
        attributes: TenantAttributes,
    ) -> Self {
        let mut headers = BTreeMap::new();
        for (name, value) in request.headers {
            if let Some(canonical) = canonical_policy_header(&name) {
                headers.entry(canonical.to_string()).or_insert(value);
            }
        }
        Self {
            tenant_id: identity.tenant_id().to_string(),
            method: request.method.to_ascii_uppercase(),
            path: request.path,
            headers,
            user_agent: request.user_agent,
            client_ip: request.client_ip,
            attributes,
        }
    }

    /// Returns the allow-listed header value for `name`, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        let canonical = canonical_policy_header(name)?;
        self.headers.get(canonical).map(String::as_str)
    }
}

// ============================================================================
// SECTION: Decision
// ============================================================================

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Human-readable reason, always present on deny.
    pub reason: Option<String>,
    /// `@id` of the deciding policy, if any applied.
    pub rule: Option<String>,
}

impl PolicyDecision {
    /// Builds an allow decision.
    #[must_use]
    pub const fn allow(rule: Option<String>) -> Self {
        Self {
            allowed: true,
            reason: None,
            rule,
        }
    }

    /// Builds a deny decision with a reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>, rule: Option<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            rule,
        }
    }

    /// Converts a deny into [`AdmissionError::Forbidden`] carrying the reason.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Forbidden`] when the decision denies.
    pub fn require_allowed(self) -> Result<Self, AdmissionError> {
        if self.allowed {
            return Ok(self);
        }
        let reason = self.reason.unwrap_or_else(|| "access denied by policy".to_string());
        Err(AdmissionError::Forbidden(reason))
    }
}

// crates/admission-gate-core/src/audit.rs
// ============================================================================
// Module: Admission Audit
// Description: Audit events for identity, policy, and idempotency outcomes.
// Purpose: Record every admission decision through a pluggable sink.
// Dependencies: serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! Each pipeline stage emits an [`AdmissionAuditEvent`] through an
//! [`AuditSink`]. The default [`TracingAuditSink`] serializes events as JSON
//! on the `admission_gate::audit` tracing target so operators can route audit
//! output separately from operational logs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use tracing::info;

use crate::error::AdmissionError;
use crate::identity::TenantIdentity;
use crate::policy::PolicyDecision;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Tracing target used for audit output.
pub const AUDIT_TARGET: &str = "admission_gate::audit";

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Request attributes shared by every audit event of a request.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Client address.
    pub client_ip: Option<String>,
    /// `X-Request-ID` value, if supplied.
    pub request_id: Option<String>,
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionAuditEvent {
    /// Event identifier.
    event: &'static str,
    /// Outcome label.
    decision: &'static str,
    /// HTTP method.
    method: String,
    /// Request path.
    path: String,
    /// Client address.
    client_ip: Option<String>,
    /// Tenant id, once resolved.
    tenant_id: Option<String>,
    /// Credential serial, once resolved.
    credential_serial: Option<String>,
    /// Deny or failure reason.
    reason: Option<String>,
    /// Deciding policy rule.
    rule: Option<String>,
    /// Active policy fingerprint.
    policy_fingerprint: Option<String>,
    /// Request identifier.
    request_id: Option<String>,
}

impl AdmissionAuditEvent {
    /// Builds a base event for a request.
    fn base(event: &'static str, decision: &'static str, ctx: &AuditContext) -> Self {
        Self {
            event,
            decision,
            method: ctx.method.clone(),
            path: ctx.path.clone(),
            client_ip: ctx.client_ip.clone(),
            tenant_id: None,
            credential_serial: None,
            reason: None,
            rule: None,
            policy_fingerprint: None,
            request_id: ctx.request_id.clone(),
        }
    }

    /// Builds a base event carrying the tenant identity.
    fn for_tenant(
        event: &'static str,
        decision: &'static str,
        ctx: &AuditContext,
        identity: &TenantIdentity,
    ) -> Self {
        let mut audit = Self::base(event, decision, ctx);
        audit.tenant_id = Some(identity.tenant_id().to_string());
        audit.credential_serial = Some(identity.credential_serial().to_string());
        audit
    }

    /// Builds an event for a successfully resolved identity.
    #[must_use]
    pub fn identity_verified(ctx: &AuditContext, identity: &TenantIdentity) -> Self {
        Self::for_tenant("admission_identity", "allow", ctx, identity)
    }

    /// Builds an event for a rejected credential.
    #[must_use]
    pub fn identity_rejected(ctx: &AuditContext, error: &AdmissionError) -> Self {
        let mut audit = Self::base("admission_identity", "deny", ctx);
        audit.reason = Some(error.message().to_string());
        audit
    }

    /// Builds an event for a policy decision.
    #[must_use]
    pub fn policy_decided(
        ctx: &AuditContext,
        identity: &TenantIdentity,
        decision: &PolicyDecision,
        policy_fingerprint: String,
    ) -> Self {
        let label = if decision.allowed { "allow" } else { "deny" };
        let mut audit = Self::for_tenant("admission_policy", label, ctx, identity);
        audit.reason.clone_from(&decision.reason);
        audit.rule.clone_from(&decision.rule);
        audit.policy_fingerprint = Some(policy_fingerprint);
        audit
    }

    /// Builds an event for a failed policy evaluation.
    #[must_use]
    pub fn policy_failed(
        ctx: &AuditContext,
        identity: &TenantIdentity,
        error: &AdmissionError,
        policy_fingerprint: String,
    ) -> Self {
        let mut audit = Self::for_tenant("admission_policy", "error", ctx, identity);
        audit.reason = Some(error.message().to_string());
        audit.policy_fingerprint = Some(policy_fingerprint);
        audit
    }

    /// Builds an event for a replayed idempotent response.
    #[must_use]
    pub fn idempotency_replayed(ctx: &AuditContext, identity: &TenantIdentity) -> Self {
        Self::for_tenant("admission_idempotency", "replay", ctx, identity)
    }

    /// Returns the event identifier.
    #[must_use]
    pub const fn event(&self) -> &'static str {
        self.event
    }

    /// Returns the outcome label.
    #[must_use]
    pub const fn decision(&self) -> &'static str {
        self.decision
    }

    /// Returns the tenant id, if resolved.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Returns the reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for admission events.
pub trait AuditSink: Send + Sync {
    /// Records an audit event.
    fn record(&self, event: &AdmissionAuditEvent);
}

/// Audit sink emitting JSON payloads on the audit tracing target.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AdmissionAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            info!(target: AUDIT_TARGET, "{payload}");
        }
    }
}

/// No-op audit sink for tests.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AdmissionAuditEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions use unwrap for clarity.")]

    use super::AdmissionAuditEvent;
    use super::AuditContext;
    use crate::error::AdmissionError;
    use crate::identity::TenantIdentity;
    use crate::policy::PolicyDecision;

    fn ctx() -> AuditContext {
        AuditContext {
            method: "POST".to_string(),
            path: "/api/v1/payments".to_string(),
            client_ip: Some("10.0.0.1".to_string()),
            request_id: Some("req-1".to_string()),
        }
    }

    #[test]
    fn policy_event_carries_decision_details() {
        let identity = TenantIdentity::fixture("abc");
        let decision = PolicyDecision::deny("tier not eligible", Some("block".to_string()));
        let event = AdmissionAuditEvent::policy_decided(
            &ctx(),
            &identity,
            &decision,
            "sha256:00".to_string(),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["decision"], "deny");
        assert_eq!(value["tenant_id"], "abc");
        assert_eq!(value["credential_serial"], "01");
        assert_eq!(value["reason"], "tier not eligible");
        assert_eq!(value["rule"], "block");
        assert_eq!(value["request_id"], "req-1");
    }

    #[test]
    fn identity_rejection_has_no_tenant() {
        let error = AdmissionError::Unauthenticated("client certificate required".to_string());
        let event = AdmissionAuditEvent::identity_rejected(&ctx(), &error);
        assert_eq!(event.tenant_id(), None);
        assert_eq!(event.reason(), Some("client certificate required"));
    }
}

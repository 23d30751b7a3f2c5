// crates/admission-gate-core/src/lib.rs
// ============================================================================
// Module: Admission Gate Core
// Description: Transport-agnostic admission pipeline components.
// Purpose: Resolve tenant identity, authorize by policy, and enforce idempotency.
// Dependencies: arc-swap, async-trait, cedar-policy, serde, tokio, tracing, x509-parser
// ============================================================================

//! ## Overview
//! Admission Gate decides, for every inbound request to the payments API, who
//! is calling, whether they may proceed and whether the request was already
//! handled. The three stages run in a fixed order and fail closed:
//!
//! 1. [`identity::IdentityResolver`] turns a verified client certificate into a
//!    [`identity::TenantIdentity`].
//! 2. [`policy::PolicyAuthorizer`] evaluates the active compiled policy.
//! 3. [`idempotency::IdempotencyCache`] replays or records responses for
//!    state-changing requests.
//!
//! This crate has no HTTP dependency; the server crate wires these stages into
//! an axum middleware.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod error;
pub mod idempotency;
pub mod identity;
pub mod policy;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AdmissionAuditEvent;
pub use audit::AuditContext;
pub use audit::AuditSink;
pub use audit::NoopAuditSink;
pub use audit::TracingAuditSink;
pub use error::AdmissionError;
pub use idempotency::CacheLookup;
pub use idempotency::IdempotencyCache;
pub use idempotency::IdempotencyKey;
pub use idempotency::IdempotencyRecord;
pub use idempotency::IdempotencySettings;
pub use idempotency::IdempotencyStore;
pub use idempotency::InMemoryIdempotencyStore;
pub use idempotency::StoreError;
pub use identity::IdentityResolver;
pub use identity::PeerCertificates;
pub use identity::TenantIdentity;
pub use policy::CedarEngine;
pub use policy::CedarPolicy;
pub use policy::PolicyAuthorizer;
pub use policy::PolicyDecision;
pub use policy::PolicyEngine;
pub use policy::PolicyError;
pub use policy::PolicyInput;
pub use policy::PolicyProgram;
pub use policy::RequestAttributes;
pub use policy::RequestAuthorizer;
pub use policy::TenantAttributes;
pub use policy::TenantDirectory;

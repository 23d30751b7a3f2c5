// crates/admission-gate-server/src/pipeline.rs
// ============================================================================
// Module: Admission Pipeline
// Description: Axum middleware running identity, policy, and idempotency stages.
// Purpose: Admit or reject every request before business handlers execute.
// Dependencies: admission-gate-core, axum, http-body-util, tokio, tracing
// ============================================================================

//! ## Overview
//! [`admission_middleware`] runs the stages in a fixed order inside one
//! request task: identity resolution, policy authorization, then the
//! idempotency cache for state-changing methods. Every stage can end the
//! request with an [`AdmissionError`]. The stages up to and including the
//! handler are bounded by the configured request timeout, and dropping them
//! stores nothing. Once the handler has answered, its idempotency record is
//! written outside that bound under the store's own operation timeout, so a
//! completed side effect is never reported as a timeout.
//!
//! Admitted requests carry an [`AdmittedRequest`] extension for handlers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use admission_gate_core::AdmissionAuditEvent;
use admission_gate_core::AdmissionError;
use admission_gate_core::AuditContext;
use admission_gate_core::AuditSink;
use admission_gate_core::CacheLookup;
use admission_gate_core::IdempotencyCache;
use admission_gate_core::IdempotencyKey;
use admission_gate_core::IdempotencyRecord;
use admission_gate_core::IdentityResolver;
use admission_gate_core::PeerCertificates;
use admission_gate_core::PolicyDecision;
use admission_gate_core::PolicyInput;
use admission_gate_core::RequestAttributes;
use admission_gate_core::RequestAuthorizer;
use admission_gate_core::TenantDirectory;
use admission_gate_core::TenantIdentity;
use admission_gate_core::idempotency;
use admission_gate_core::idempotency::IDEMPOTENCY_KEY_HEADER;
use axum::body::Body;
use axum::body::to_bytes;
use axum::extract::ConnectInfo;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use http_body_util::LengthLimitError;
use tracing::info;
use tracing::warn;

use crate::capture::capture_response;
use crate::capture::replay_response;
use crate::error::GatewayRejection;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Request identifier header copied into audit events.
const REQUEST_ID_HEADER: &str = "x-request-id";
/// Proxy-supplied client address list.
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
/// Proxy-supplied client address.
const REAL_IP_HEADER: &str = "x-real-ip";

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared components used by the admission middleware.
pub struct AdmissionState {
    /// Certificate to tenant resolver.
    pub resolver: IdentityResolver,
    /// Active policy authorizer.
    pub authorizer: Arc<dyn RequestAuthorizer>,
    /// Tenant attribute source for policy input.
    pub tenants: TenantDirectory,
    /// Idempotency cache flow.
    pub cache: IdempotencyCache,
    /// Audit sink for admission events.
    pub audit: Arc<dyn AuditSink>,
    /// Maximum buffered request body size.
    pub max_body_bytes: usize,
    /// Bound on the admission stages and the handler.
    pub request_timeout: Duration,
    /// Whether proxy headers may supply the client address.
    pub trust_forwarded_headers: bool,
}

/// Request extension describing an admitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedRequest {
    /// Tenant the request was admitted for.
    pub tenant_id: String,
    /// Policy decision that allowed it.
    pub decision: PolicyDecision,
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Outcome of the bounded admission stages.
enum Admitted {
    /// Final response with nothing left to store.
    Done(Response),
    /// Handler response whose idempotency record still has to be written.
    Record {
        /// Response returned to the client.
        response: Response,
        /// Tenant-scoped key the record belongs to.
        key: IdempotencyKey,
        /// Captured response.
        record: IdempotencyRecord,
        /// Whether this request claimed the in-flight lease.
        lease_held: bool,
    },
}

/// Runs the admission pipeline for one request.
pub async fn admission_middleware(
    State(state): State<Arc<AdmissionState>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    match tokio::time::timeout(state.request_timeout, admit(&state, request, next)).await {
        Ok(Ok(Admitted::Done(response))) => response,
        Ok(Ok(Admitted::Record {
            response,
            key,
            record,
            lease_held,
        })) => {
            state.cache.record(&key, &record, lease_held).await;
            response
        }
        Ok(Err(error)) => GatewayRejection(error).into_response(),
        Err(_) => {
            warn!(%method, %path, "request timed out in admission pipeline");
            GatewayRejection(AdmissionError::Timeout).into_response()
        }
    }
}

/// Admission stages in order through the handler; errors short-circuit.
async fn admit(
    state: &AdmissionState,
    mut request: Request,
    next: Next,
) -> Result<Admitted, AdmissionError> {
    let ctx = audit_context(state, &request);
    let identity = resolve_identity(state, &ctx, &request)?;
    let decision = authorize(state, &ctx, &identity, &request)?;
    let admitted = AdmittedRequest {
        tenant_id: identity.tenant_id().to_string(),
        decision,
    };

    if !idempotency::applies_to(request.method().as_str()) {
        request.extensions_mut().insert(admitted);
        return Ok(Admitted::Done(next.run(request).await));
    }

    let header = match request.headers().get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => Some(value.to_str().map_err(|_| {
            AdmissionError::BadRequest(format!("{IDEMPOTENCY_KEY_HEADER} must be visible ASCII"))
        })?),
        None => None,
    };
    let key = IdempotencyKey::new(&identity, header)?;

    let lease_held = match state.cache.lookup(&key).await? {
        CacheLookup::Replay(record) => {
            state.audit.record(&AdmissionAuditEvent::idempotency_replayed(&ctx, &identity));
            info!(
                tenant_id = %key.tenant_id(),
                status = record.status_code,
                "idempotent response served from cache"
            );
            return replay_response(&record).map(Admitted::Done);
        }
        CacheLookup::Miss {
            lease_held,
        } => lease_held,
        CacheLookup::Degraded => false,
    };

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            if lease_held {
                state.cache.release(&key).await;
            }
            return Err(body_error(&err, state.max_body_bytes));
        }
    };
    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(admitted);

    let response = next.run(request).await;
    let (response, record) = match capture_response(response).await {
        Ok(captured) => captured,
        Err(err) => {
            if lease_held {
                state.cache.release(&key).await;
            }
            return Err(err);
        }
    };
    Ok(Admitted::Record {
        response,
        key,
        record,
        lease_held,
    })
}

// ============================================================================
// SECTION: Stages
// ============================================================================

/// Resolves and audits the caller identity.
fn resolve_identity(
    state: &AdmissionState,
    ctx: &AuditContext,
    request: &Request,
) -> Result<TenantIdentity, AdmissionError> {
    match state.resolver.resolve(request.extensions().get::<PeerCertificates>()) {
        Ok(identity) => {
            state.audit.record(&AdmissionAuditEvent::identity_verified(ctx, &identity));
            Ok(identity)
        }
        Err(err) => {
            state.audit.record(&AdmissionAuditEvent::identity_rejected(ctx, &err));
            Err(err)
        }
    }
}

/// Evaluates and audits the policy decision; a deny becomes an error.
fn authorize(
    state: &AdmissionState,
    ctx: &AuditContext,
    identity: &TenantIdentity,
    request: &Request,
) -> Result<PolicyDecision, AdmissionError> {
    let attributes = RequestAttributes {
        method: request.method().as_str().to_string(),
        path: request.uri().path().to_string(),
        headers: header_pairs(request.headers()),
        user_agent: header_value(request.headers(), USER_AGENT.as_str()).unwrap_or_default(),
        client_ip: ctx.client_ip.clone().unwrap_or_default(),
    };
    let input =
        PolicyInput::new(identity, attributes, state.tenants.attributes_for(identity.tenant_id()));
    let fingerprint = state.authorizer.active_fingerprint();
    match state.authorizer.authorize(&input) {
        Ok(decision) => {
            state.audit.record(&AdmissionAuditEvent::policy_decided(
                ctx,
                identity,
                &decision,
                fingerprint,
            ));
            decision.require_allowed()
        }
        Err(err) => {
            state.audit.record(&AdmissionAuditEvent::policy_failed(
                ctx,
                identity,
                &err,
                fingerprint,
            ));
            Err(err)
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the audit context for a request.
fn audit_context(state: &AdmissionState, request: &Request) -> AuditContext {
    AuditContext {
        method: request.method().as_str().to_string(),
        path: request.uri().path().to_string(),
        client_ip: client_ip(state, request),
        request_id: header_value(request.headers(), REQUEST_ID_HEADER),
    }
}

/// Determines the client address, honoring proxy headers only when trusted.
fn client_ip(state: &AdmissionState, request: &Request) -> Option<String> {
    if state.trust_forwarded_headers {
        let forwarded = header_value(request.headers(), FORWARDED_FOR_HEADER)
            .and_then(|value| value.split(',').next().map(|first| first.trim().to_string()))
            .filter(|value| !value.is_empty());
        if let Some(address) = forwarded.or_else(|| header_value(request.headers(), REAL_IP_HEADER))
        {
            return Some(address);
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(peer)| peer.ip().to_string())
}

/// Returns a header as a string when it is visible ASCII.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}

/// Collects all string-valued headers in arrival order.
fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

/// Maps a request body read failure to an admission error.
fn body_error(err: &axum::Error, limit: usize) -> AdmissionError {
    let over_limit = std::iter::successors(Some(err as &dyn StdError), |&inner| inner.source())
        .any(|inner| inner.is::<LengthLimitError>());
    if over_limit {
        AdmissionError::PayloadTooLarge(format!("request body exceeds {limit} bytes"))
    } else {
        AdmissionError::BadRequest(format!("request body unreadable: {err}"))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

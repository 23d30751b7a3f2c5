// crates/admission-gate-server/tests/common/mod.rs
// =============================================================================
// Module: Gateway Test Helpers
// Description: In-process gateway harness, certificates, and request helpers.
// Purpose: Drive the admission router without sockets or real TLS.
// =============================================================================

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::panic,
    reason = "Test helpers are selectively used across suites."
)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use admission_gate_core::AdmissionAuditEvent;
use admission_gate_core::AdmissionError;
use admission_gate_core::AuditSink;
use admission_gate_core::CedarEngine;
use admission_gate_core::IdempotencyCache;
use admission_gate_core::IdempotencySettings;
use admission_gate_core::IdempotencyStore;
use admission_gate_core::IdentityResolver;
use admission_gate_core::InMemoryIdempotencyStore;
use admission_gate_core::PeerCertificates;
use admission_gate_core::PolicyAuthorizer;
use admission_gate_core::PolicyDecision;
use admission_gate_core::PolicyInput;
use admission_gate_core::RequestAuthorizer;
use admission_gate_core::TenantAttributes;
use admission_gate_core::TenantDirectory;
use admission_gate_core::policy::DEFAULT_POLICY_SOURCE;
use admission_gate_server::AdmissionState;
use admission_gate_server::PaymentLedger;
use admission_gate_server::build_router;
use admission_gate_server::payments;
use axum::Router;
use axum::body::Body;
use axum::body::Bytes;
use axum::body::to_bytes;
use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use rcgen::BasicConstraints;
use rcgen::CertificateParams;
use rcgen::DistinguishedName;
use rcgen::DnType;
use rcgen::IsCa;
use rcgen::Issuer;
use rcgen::KeyPair;
use rustls_pki_types::CertificateDer;
use tower::ServiceExt;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

// ============================================================================
// SECTION: Certificates
// ============================================================================

/// Issues a client certificate chain (leaf, CA) for `common_name`.
pub fn client_chain(common_name: &str) -> Vec<CertificateDer<'static>> {
    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::default();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let mut ca_name = DistinguishedName::new();
    ca_name.push(DnType::CommonName, "Payments Test CA");
    ca_params.distinguished_name = ca_name;
    let ca = ca_params.self_signed(&ca_key).unwrap();
    let issuer = Issuer::new(ca_params, ca_key);

    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::default();
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, common_name);
    params.distinguished_name = name;
    let leaf = params.signed_by(&key, &issuer).unwrap();
    vec![leaf.der().clone(), ca.der().clone()]
}

/// Verified peer credentials for `tenant-<tenant_id>.yourorg.com`.
pub fn tenant(tenant_id: &str) -> Option<PeerCertificates> {
    Some(PeerCertificates::verified(client_chain(&format!("tenant-{tenant_id}.yourorg.com"))))
}

// ============================================================================
// SECTION: Authorizer And Audit Doubles
// ============================================================================

/// Authorizer that counts evaluations before delegating.
pub struct CountingAuthorizer {
    /// Wrapped policy holder.
    pub policy: PolicyAuthorizer,
    /// Number of evaluations.
    calls: AtomicUsize,
}

impl CountingAuthorizer {
    pub fn new(source: &str) -> Self {
        Self {
            policy: PolicyAuthorizer::new(CedarEngine, source).unwrap(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RequestAuthorizer for CountingAuthorizer {
    fn authorize(&self, input: &PolicyInput) -> Result<PolicyDecision, AdmissionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.policy.authorize(input)
    }

    fn active_fingerprint(&self) -> String {
        self.policy.active_fingerprint()
    }
}

/// Audit sink keeping events in memory.
#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<serde_json::Value>>,
}

impl RecordingAuditSink {
    pub fn events(&self) -> Vec<serde_json::Value> {
        self.events.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: &AdmissionAuditEvent) {
        self.events.lock().unwrap().push(serde_json::to_value(event).unwrap());
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Knobs for an in-process gateway.
pub struct GatewayOptions {
    pub policy: String,
    pub store: Arc<dyn IdempotencyStore>,
    pub settings: IdempotencySettings,
    pub overrides: BTreeMap<String, TenantAttributes>,
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    pub trust_forwarded_headers: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            policy: DEFAULT_POLICY_SOURCE.to_string(),
            store: Arc::new(InMemoryIdempotencyStore::new()),
            settings: IdempotencySettings::default(),
            overrides: BTreeMap::new(),
            max_body_bytes: 64 * 1024,
            request_timeout: Duration::from_secs(5),
            trust_forwarded_headers: false,
        }
    }
}

/// Gateway router plus the collaborators tests inspect.
pub struct Gateway {
    pub router: Router,
    pub ledger: Arc<PaymentLedger>,
    pub authorizer: Arc<CountingAuthorizer>,
    pub audit: Arc<RecordingAuditSink>,
}

/// Builds a gateway serving the payment routes plus `extra`.
pub fn gateway(options: GatewayOptions, extra: Router) -> Gateway {
    let ledger = Arc::new(PaymentLedger::new());
    let authorizer = Arc::new(CountingAuthorizer::new(&options.policy));
    let audit = Arc::new(RecordingAuditSink::default());
    let state = Arc::new(AdmissionState {
        resolver: IdentityResolver::default(),
        authorizer: authorizer.clone(),
        tenants: TenantDirectory::new(TenantAttributes::default(), options.overrides),
        cache: IdempotencyCache::new(options.store, options.settings),
        audit: audit.clone(),
        max_body_bytes: options.max_body_bytes,
        request_timeout: options.request_timeout,
        trust_forwarded_headers: options.trust_forwarded_headers,
    });
    let handlers = payments::routes(ledger.clone()).merge(extra);
    Gateway {
        router: build_router(state, handlers),
        ledger,
        authorizer,
        audit,
    }
}

/// Builds a gateway with default options and only the payment routes.
pub fn default_gateway() -> Gateway {
    gateway(GatewayOptions::default(), Router::new())
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Response parts captured by [`send`].
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Builds a request as the TLS listener would hand it to the router.
pub fn request(
    method: &str,
    path: &str,
    peer: Option<PeerCertificates>,
    idempotency_key: Option<&str>,
    body: &str,
) -> Request<Body> {
    let mut builder =
        Request::builder().method(method).uri(path).header(CONTENT_TYPE, "application/json");
    if let Some(key) = idempotency_key {
        builder = builder.header("Idempotency-Key", key);
    }
    let mut request = builder.body(Body::from(body.to_string())).unwrap();
    request.extensions_mut().insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 50_000))));
    if let Some(peer) = peer {
        request.extensions_mut().insert(peer);
    }
    request
}

/// Sends `request` through `router` and buffers the reply.
pub async fn send(router: &Router, request: Request<Body>) -> Reply {
    let response = router.clone().oneshot(request).await.unwrap();
    let (parts, body) = response.into_parts();
    Reply {
        status: parts.status,
        headers: parts.headers,
        body: to_bytes(body, usize::MAX).await.unwrap(),
    }
}

/// Payment creation body.
pub const CREATE_BODY: &str =
    r#"{"amount":1250,"currency":"USD","description":"invoice 42","reference":"inv-42"}"#;

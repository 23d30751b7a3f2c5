// crates/admission-gate-server/src/server.rs
// ============================================================================
// Module: Gateway Server
// Description: Component wiring, router assembly, and the mTLS listener loop.
// Purpose: Build the admission gateway from configuration and serve it.
// Dependencies: admission-gate-config, admission-gate-core, axum, axum-server, tokio
// ============================================================================

//! ## Overview
//! [`GatewayServer::from_config`] validates configuration, compiles the
//! policy, and connects the idempotency store before anything listens. The
//! router places `/health` outside the admission middleware; every other route
//! runs through it. On Unix a `SIGHUP` re-reads `policy.path` and swaps the
//! policy in through the validated update path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use admission_gate_config::AdmissionGateConfig;
use admission_gate_config::CacheBackend;
use admission_gate_config::IdempotencyConfig;
use admission_gate_config::read_policy_file;
use admission_gate_core::CedarEngine;
use admission_gate_core::IdempotencyCache;
use admission_gate_core::IdempotencyStore;
use admission_gate_core::IdentityResolver;
use admission_gate_core::InMemoryIdempotencyStore;
use admission_gate_core::PolicyAuthorizer;
use admission_gate_core::TracingAuditSink;
use admission_gate_store_redis::RedisIdempotencyStore;
use axum::Json;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use serde_json::json;
use tracing::info;
use tracing::warn;

use crate::error::ServerError;
use crate::payments;
use crate::payments::PaymentLedger;
use crate::pipeline::AdmissionState;
use crate::pipeline::admission_middleware;
use crate::tls::ClientCertAcceptor;
use crate::tls::load_server_tls;

// ============================================================================
// SECTION: Gateway Server
// ============================================================================

/// Admission gateway instance.
pub struct GatewayServer {
    /// Validated configuration.
    config: AdmissionGateConfig,
    /// Shared pipeline components.
    state: Arc<AdmissionState>,
    /// Hot-swappable policy holder.
    authorizer: Arc<PolicyAuthorizer>,
    /// Payment ledger behind the pipeline.
    ledger: Arc<PaymentLedger>,
}

impl GatewayServer {
    /// Builds a gateway from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for invalid configuration or policy
    /// files and [`ServerError::Init`] when the policy does not compile or the
    /// idempotency store is unreachable.
    pub async fn from_config(config: AdmissionGateConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let source =
            config.policy.load_source().map_err(|err| ServerError::Config(err.to_string()))?;
        let authorizer = Arc::new(
            PolicyAuthorizer::new(CedarEngine, &source)
                .map_err(|err| ServerError::Init(err.to_string()))?,
        );
        let store = build_idempotency_store(&config.idempotency).await?;
        let cache = IdempotencyCache::new(store, config.idempotency.settings());
        let state = Arc::new(AdmissionState {
            resolver: IdentityResolver::new(&config.identity.tenant_domain),
            authorizer: authorizer.clone(),
            tenants: config.tenants.directory(),
            cache,
            audit: Arc::new(TracingAuditSink),
            max_body_bytes: config.server.max_body_bytes,
            request_timeout: config.server.request_timeout(),
            trust_forwarded_headers: config.server.trust_forwarded_headers,
        });
        Ok(Self {
            config,
            state,
            authorizer,
            ledger: Arc::new(PaymentLedger::new()),
        })
    }

    /// Returns the policy holder used by this gateway.
    #[must_use]
    pub const fn authorizer(&self) -> &Arc<PolicyAuthorizer> {
        &self.authorizer
    }

    /// Returns the payment ledger behind the pipeline.
    #[must_use]
    pub const fn ledger(&self) -> &Arc<PaymentLedger> {
        &self.ledger
    }

    /// Builds the complete router.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), payments::routes(self.ledger.clone()))
    }

    /// Serves HTTPS with mutual TLS until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when TLS material cannot be loaded or the
    /// listener fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr =
            self.config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let tls = self
            .config
            .server
            .tls
            .as_ref()
            .ok_or_else(|| ServerError::Config("server.tls is required".to_string()))?;
        let tls = load_server_tls(tls)?;
        spawn_policy_reloader(
            self.authorizer.clone(),
            self.config.policy.path.as_ref().map(PathBuf::from),
        )?;

        let app = self.router();
        info!(
            %addr,
            tenant_domain = %self.state.resolver.tenant_domain(),
            "admission gateway listening"
        );
        axum_server::bind(addr)
            .acceptor(ClientCertAcceptor::new(tls))
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|err| ServerError::Transport(format!("https server failed: {err}")))
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Wraps business `handlers` in the admission middleware and adds `/health`.
pub fn build_router(state: Arc<AdmissionState>, handlers: Router) -> Router {
    let max_body_bytes = state.max_body_bytes;
    handlers
        .layer(middleware::from_fn_with_state(state, admission_middleware))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .route("/health", get(health))
}

/// Liveness probe.
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

// ============================================================================
// SECTION: Idempotency Store
// ============================================================================

/// Builds the configured idempotency store.
async fn build_idempotency_store(
    config: &IdempotencyConfig,
) -> Result<Arc<dyn IdempotencyStore>, ServerError> {
    match config.backend {
        CacheBackend::Memory => {
            warn!("using in-memory idempotency store; records are not shared across instances");
            Ok(Arc::new(InMemoryIdempotencyStore::new()))
        }
        CacheBackend::Redis => {
            let store = RedisIdempotencyStore::connect(&config.redis_url)
                .await
                .map_err(|err| ServerError::Init(err.to_string()))?;
            Ok(Arc::new(store))
        }
    }
}

// ============================================================================
// SECTION: Policy Reload
// ============================================================================

/// Re-reads the policy file at `path` and swaps it in.
///
/// Returns the fingerprint of the active policy.
///
/// # Errors
///
/// Returns [`ServerError::Config`] when the file cannot be read or does not
/// compile; the previously active policy stays in place.
pub fn reload_policy(authorizer: &PolicyAuthorizer, path: &Path) -> Result<String, ServerError> {
    let source = read_policy_file(path).map_err(|err| ServerError::Config(err.to_string()))?;
    authorizer.replace_policy(&source).map_err(|err| ServerError::Config(err.to_string()))
}

/// Reloads the policy on every `SIGHUP`.
#[cfg(unix)]
fn spawn_policy_reloader(
    authorizer: Arc<PolicyAuthorizer>,
    path: Option<PathBuf>,
) -> Result<(), ServerError> {
    use tokio::signal::unix::SignalKind;
    use tokio::signal::unix::signal;

    let Some(path) = path else {
        info!("policy.path not set; SIGHUP reload disabled");
        return Ok(());
    };
    let mut hangup = signal(SignalKind::hangup())
        .map_err(|err| ServerError::Init(format!("sighup handler: {err}")))?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!(path = %path.display(), "reloading policy");
            if let Err(err) = reload_policy(&authorizer, &path) {
                warn!(error = %err, "policy reload failed");
            }
        }
    });
    Ok(())
}

/// Policy reload is signal-driven and only available on Unix.
#[cfg(not(unix))]
fn spawn_policy_reloader(
    _authorizer: Arc<PolicyAuthorizer>,
    _path: Option<PathBuf>,
) -> Result<(), ServerError> {
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

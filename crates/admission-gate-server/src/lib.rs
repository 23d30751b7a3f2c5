// crates/admission-gate-server/src/lib.rs
// ============================================================================
// Module: Admission Gate Server
// Description: HTTPS gateway running the admission pipeline in front of handlers.
// Purpose: Terminate mutual TLS and admit requests before business logic.
// Dependencies: admission-gate-core, admission-gate-config, axum, axum-server
// ============================================================================

//! ## Overview
//! The server crate turns the transport-agnostic admission stages into an
//! axum middleware, terminates mutual TLS with rustls, and hosts a minimal
//! payment handler behind the pipeline. [`GatewayServer`] is the entry point
//! used by the CLI; [`build_router`] and [`AdmissionState`] let callers mount
//! their own handlers behind the same pipeline.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod capture;
pub mod error;
pub mod payments;
pub mod pipeline;
pub mod server;
pub mod tls;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::GatewayRejection;
pub use error::ServerError;
pub use payments::PaymentLedger;
pub use pipeline::AdmissionState;
pub use pipeline::AdmittedRequest;
pub use pipeline::admission_middleware;
pub use server::GatewayServer;
pub use server::build_router;
pub use server::reload_policy;
pub use tls::ClientCertAcceptor;
pub use tls::load_server_tls;

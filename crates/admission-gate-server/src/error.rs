// crates/admission-gate-server/src/error.rs
// ============================================================================
// Module: Server Errors
// Description: HTTP rendering of admission failures and server lifecycle errors.
// Purpose: Give every rejection a stable status code and JSON body.
// Dependencies: admission-gate-core, axum, serde, thiserror
// ============================================================================

//! ## Overview
//! [`GatewayRejection`] renders an [`AdmissionError`] as
//! `{"error": <kind>, "message": <text>}` with the error's status code.
//! [`ServerError`] covers configuration, initialization, and transport
//! failures raised while building or running the server.

// ============================================================================
// SECTION: Imports
// ============================================================================

use admission_gate_core::AdmissionError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Rejections
// ============================================================================

/// JSON body returned for rejected requests.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    /// Stable error kind.
    error: &'static str,
    /// Human-readable message.
    message: &'a str,
}

/// Axum response wrapper for admission failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRejection(pub AdmissionError);

impl From<AdmissionError> for GatewayRejection {
    fn from(error: AdmissionError) -> Self {
        Self(error)
    }
}

impl IntoResponse for GatewayRejection {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.message(),
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// SECTION: Server Errors
// ============================================================================

/// Gateway server lifecycle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================

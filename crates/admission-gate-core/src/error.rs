// crates/admission-gate-core/src/error.rs
// ============================================================================
// Module: Admission Errors
// Description: Terminal failure taxonomy for the admission pipeline.
// Purpose: Give every pipeline stage one fail-closed error vocabulary.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every stage of the admission pipeline short-circuits with an
//! [`AdmissionError`]. Each variant maps to exactly one HTTP status so the
//! transport layer never has to interpret stage internals. Degraded cache
//! conditions are intentionally absent: they are logged and the request
//! proceeds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Terminal admission failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// No client credential, or the credential chain was not verified.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// Credential is valid but does not name a tenant, or policy denied.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Request is malformed for the admission contract.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Request body exceeds the configured buffer limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    /// A request with the same idempotency key is already in flight.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The pipeline did not complete within the request deadline.
    #[error("request timed out")]
    Timeout,
    /// Evaluator failure, corrupted cache record, or other internal fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AdmissionError {
    /// Returns the HTTP status code for this failure.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated(_) => 401,
            Self::Forbidden(_) => 403,
            Self::BadRequest(_) => 400,
            Self::PayloadTooLarge(_) => 413,
            Self::Conflict(_) => 409,
            Self::Timeout => 408,
            Self::Internal(_) => 500,
        }
    }

    /// Returns a stable machine-readable label for this failure.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::BadRequest(_) => "bad_request",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::Conflict(_) => "conflict",
            Self::Timeout => "timeout",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns the client-facing message without the kind prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Unauthenticated(message)
            | Self::Forbidden(message)
            | Self::BadRequest(message)
            | Self::PayloadTooLarge(message)
            | Self::Conflict(message)
            | Self::Internal(message) => message,
            Self::Timeout => "request timed out",
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

// crates/admission-gate-server/src/capture.rs
// ============================================================================
// Module: Response Capture
// Description: Buffer handler responses into records and rebuild replays.
// Purpose: Bridge axum responses and stored idempotency records.
// Dependencies: admission-gate-core, axum
// ============================================================================

//! ## Overview
//! A captured response is fully buffered so its bytes can be both returned to
//! the client and stored. Multi-valued headers keep their first value; header
//! values that are not visible ASCII are not recorded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use admission_gate_core::AdmissionError;
use admission_gate_core::IdempotencyRecord;
use axum::body::Body;
use axum::body::to_bytes;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::response::Response;

// ============================================================================
// SECTION: Capture
// ============================================================================

/// Buffers a handler response and returns it with its record.
///
/// # Errors
///
/// Returns [`AdmissionError::Internal`] when the response body cannot be read.
pub async fn capture_response(
    response: Response,
) -> Result<(Response, IdempotencyRecord), AdmissionError> {
    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|err| AdmissionError::Internal(format!("response body unreadable: {err}")))?;

    let mut headers = BTreeMap::new();
    for (name, value) in &parts.headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        headers.entry(name.as_str().to_string()).or_insert_with(|| value.to_string());
    }

    let record = IdempotencyRecord::new(parts.status.as_u16(), headers, bytes.to_vec());
    Ok((Response::from_parts(parts, Body::from(bytes)), record))
}

// ============================================================================
// SECTION: Replay
// ============================================================================

/// Rebuilds the stored response verbatim.
///
/// # Errors
///
/// Returns [`AdmissionError::Internal`] when the record holds an invalid status
/// or header.
pub fn replay_response(record: &IdempotencyRecord) -> Result<Response, AdmissionError> {
    let status = StatusCode::from_u16(record.status_code)
        .map_err(|_| corrupted("status code"))?;
    let mut response = Response::new(Body::from(record.body.clone()));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in &record.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| corrupted("header name"))?;
        let value = HeaderValue::from_str(value).map_err(|_| corrupted("header value"))?;
        headers.insert(name, value);
    }
    Ok(response)
}

/// Builds the error for an unusable stored record.
fn corrupted(part: &str) -> AdmissionError {
    AdmissionError::Internal(format!("corrupted idempotency record: invalid {part}"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

// crates/admission-gate-core/src/idempotency/record.rs
// ============================================================================
// Module: Idempotency Record
// Description: Stored response snapshot and its JSON wire format.
// Purpose: Persist and replay handler responses byte-for-byte.
// Dependencies: base64, serde, serde_json
// ============================================================================

//! ## Overview
//! Records serialize as `{"status_code":int,"headers":{..},"body":<json>}`.
//! A body that is exactly one JSON document is embedded verbatim. Any other
//! body, including JSON with surrounding whitespace, is written as
//! `"body_base64":"<standard base64>"` instead.
//! An empty body omits both fields.
//!
//! Decoding is strict: a record that does not parse, carries both body
//! fields, or carries an impossible status code is reported as
//! [`StoreError::Corrupt`] rather than guessed at.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::Serialize;
use serde_json::value::RawValue;

use super::store::StoreError;

// ============================================================================
// SECTION: Record
// ============================================================================

/// Snapshot of a handler response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredRecord", into = "StoredRecord")]
pub struct IdempotencyRecord {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers; the first value per name.
    pub headers: BTreeMap<String, String>,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl IdempotencyRecord {
    /// Builds a record; a zero status is normalized to 200.
    #[must_use]
    pub fn new(status_code: u16, headers: BTreeMap<String, String>, body: Vec<u8>) -> Self {
        Self {
            status_code: if status_code == 0 { 200 } else { status_code },
            headers,
            body,
        }
    }

    /// Returns true when the response may be cached.
    #[must_use]
    pub const fn is_cacheable(&self) -> bool {
        self.status_code < 500
    }

    /// Serializes the record for storage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Encode`] when serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|err| StoreError::Encode(err.to_string()))
    }

    /// Parses a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when the bytes are not a valid record.
    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let record: Self =
            serde_json::from_slice(bytes).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        if !(100..=599).contains(&record.status_code) {
            return Err(StoreError::Corrupt(format!(
                "invalid status code {}",
                record.status_code
            )));
        }
        Ok(record)
    }
}

// ============================================================================
// SECTION: Wire Format
// ============================================================================

/// Stored JSON shape of a record.
#[derive(Serialize, Deserialize)]
struct StoredRecord {
    /// HTTP status code.
    status_code: u16,
    /// Response headers.
    #[serde(default)]
    headers: BTreeMap<String, String>,
    /// Body embedded as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<Box<RawValue>>,
    /// Body that is not a single JSON document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body_base64: Option<String>,
}

impl From<IdempotencyRecord> for StoredRecord {
    fn from(record: IdempotencyRecord) -> Self {
        let (body, body_base64) = match embeddable_json(&record.body) {
            Some(raw) => (Some(raw), None),
            None if record.body.is_empty() => (None, None),
            None => (None, Some(BASE64.encode(&record.body))),
        };
        Self {
            status_code: record.status_code,
            headers: record.headers,
            body,
            body_base64,
        }
    }
}

impl TryFrom<StoredRecord> for IdempotencyRecord {
    type Error = String;

    fn try_from(stored: StoredRecord) -> Result<Self, Self::Error> {
        let body = match (stored.body, stored.body_base64) {
            (Some(_), Some(_)) => return Err("record has both body and body_base64".to_string()),
            (Some(raw), None) => raw.get().as_bytes().to_vec(),
            (None, Some(encoded)) => BASE64
                .decode(encoded.as_bytes())
                .map_err(|err| format!("invalid body_base64: {err}"))?,
            (None, None) => Vec::new(),
        };
        Ok(Self {
            status_code: stored.status_code,
            headers: stored.headers,
            body,
        })
    }
}

/// Returns the body as raw JSON when embedding it reproduces the exact bytes.
fn embeddable_json(body: &[u8]) -> Option<Box<RawValue>> {
    let text = std::str::from_utf8(body).ok()?;
    let raw = RawValue::from_string(text.to_string()).ok()?;
    // `null` would read back as an absent body.
    (raw.get() == text && raw.get() != "null").then_some(raw)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

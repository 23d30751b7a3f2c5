// crates/admission-gate-server/src/payments.rs
// ============================================================================
// Module: Payment Handlers
// Description: Minimal tenant-scoped payment endpoints behind the pipeline.
// Purpose: Give the admission pipeline a concrete business handler boundary.
// Dependencies: axum, serde, serde_json
// ============================================================================

//! ## Overview
//! An in-memory ledger with create, list, read, and update operations scoped
//! to the admitted tenant. Handlers read the tenant only from the
//! [`AdmittedRequest`] extension; a request without it is refused, so the
//! routes are unusable outside the admission middleware.
//!
//! Amounts are integer minor units.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use axum::Extension;
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::pipeline::AdmittedRequest;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum description length in bytes.
const MAX_DESCRIPTION_BYTES: usize = 500;
/// Maximum reference length in bytes.
const MAX_REFERENCE_BYTES: usize = 100;

// ============================================================================
// SECTION: Model
// ============================================================================

/// Stored payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Payment id, unique across tenants.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Amount in minor units.
    pub amount: u64,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Free-form description.
    pub description: String,
    /// Optional client reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Lifecycle status.
    pub status: String,
}

/// Payment creation body.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreatePayment {
    /// Amount in minor units.
    amount: u64,
    /// ISO 4217 currency code.
    currency: String,
    /// Description.
    description: String,
    /// Optional client reference.
    #[serde(default)]
    reference: Option<String>,
}

/// Payment update body.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdatePayment {
    /// Replacement description.
    #[serde(default)]
    description: Option<String>,
    /// Replacement reference.
    #[serde(default)]
    reference: Option<String>,
}

// ============================================================================
// SECTION: Ledger
// ============================================================================

/// In-memory payment ledger.
#[derive(Debug, Default)]
pub struct PaymentLedger {
    /// Next payment sequence number.
    next_id: AtomicU64,
    /// Payments keyed by id.
    payments: Mutex<BTreeMap<String, Payment>>,
}

impl PaymentLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored payments across all tenants.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Unavailable`] when the ledger lock is poisoned.
    pub fn len(&self) -> Result<usize, PaymentError> {
        Ok(self.lock()?.len())
    }

    /// Returns whether the ledger holds no payments.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Unavailable`] when the ledger lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, PaymentError> {
        Ok(self.lock()?.is_empty())
    }

    /// Locks the payment map.
    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, Payment>>, PaymentError> {
        self.payments.lock().map_err(|_| PaymentError::Unavailable)
    }

    /// Stores a new payment for `tenant_id`.
    fn create(&self, tenant_id: &str, request: CreatePayment) -> Result<Payment, PaymentError> {
        let sequence = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let payment = Payment {
            id: format!("p{sequence}"),
            tenant_id: tenant_id.to_string(),
            amount: request.amount,
            currency: request.currency,
            description: request.description,
            reference: request.reference,
            status: "pending".to_string(),
        };
        self.lock()?.insert(payment.id.clone(), payment.clone());
        Ok(payment)
    }

    /// Lists the payments of `tenant_id` in id order.
    fn list(&self, tenant_id: &str) -> Result<Vec<Payment>, PaymentError> {
        Ok(self
            .lock()?
            .values()
            .filter(|payment| payment.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    /// Returns a payment owned by `tenant_id`.
    fn get(&self, tenant_id: &str, id: &str) -> Result<Payment, PaymentError> {
        self.lock()?
            .get(id)
            .filter(|payment| payment.tenant_id == tenant_id)
            .cloned()
            .ok_or(PaymentError::NotFound)
    }

    /// Applies an update to a payment owned by `tenant_id`.
    fn update(
        &self,
        tenant_id: &str,
        id: &str,
        update: UpdatePayment,
    ) -> Result<Payment, PaymentError> {
        let mut payments = self.lock()?;
        let payment = payments
            .get_mut(id)
            .filter(|payment| payment.tenant_id == tenant_id)
            .ok_or(PaymentError::NotFound)?;
        if let Some(description) = update.description {
            payment.description = description;
        }
        if let Some(reference) = update.reference {
            payment.reference = Some(reference);
        }
        Ok(payment.clone())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Payment handler errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    /// The request was not admitted by the gateway.
    #[error("request was not admitted")]
    NotAdmitted,
    /// Body failed validation.
    #[error("{0}")]
    Invalid(String),
    /// Payment missing or owned by another tenant.
    #[error("payment not found")]
    NotFound,
    /// Ledger unusable.
    #[error("payment ledger unavailable")]
    Unavailable,
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            Self::NotAdmitted => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            Self::Invalid(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            Self::Unavailable => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        (status, Json(json!({ "error": kind, "message": self.to_string() }))).into_response()
    }
}

// ============================================================================
// SECTION: Routes
// ============================================================================

/// Builds the payment routes over `ledger`.
pub fn routes(ledger: Arc<PaymentLedger>) -> Router {
    Router::new()
        .route("/api/v1/whoami", get(whoami))
        .route("/api/v1/payments", get(list_payments).post(create_payment))
        .route("/api/v1/payments/{id}", get(get_payment).put(update_payment))
        .with_state(ledger)
}

/// Returns the admitted tenant and deciding rule.
async fn whoami(admitted: Option<Extension<AdmittedRequest>>) -> Result<Response, PaymentError> {
    let Extension(admitted) = admitted.ok_or(PaymentError::NotAdmitted)?;
    Ok(Json(json!({
        "tenant_id": admitted.tenant_id,
        "rule": admitted.decision.rule,
    }))
    .into_response())
}

/// Creates a payment.
async fn create_payment(
    State(ledger): State<Arc<PaymentLedger>>,
    admitted: Option<Extension<AdmittedRequest>>,
    body: Bytes,
) -> Result<Response, PaymentError> {
    let Extension(admitted) = admitted.ok_or(PaymentError::NotAdmitted)?;
    let request: CreatePayment = parse_body(&body)?;
    validate_create(&request)?;
    let payment = ledger.create(&admitted.tenant_id, request)?;
    Ok((StatusCode::CREATED, Json(payment)).into_response())
}

/// Lists the tenant's payments.
async fn list_payments(
    State(ledger): State<Arc<PaymentLedger>>,
    admitted: Option<Extension<AdmittedRequest>>,
) -> Result<Response, PaymentError> {
    let Extension(admitted) = admitted.ok_or(PaymentError::NotAdmitted)?;
    let payments = ledger.list(&admitted.tenant_id)?;
    Ok(Json(json!({ "payments": payments })).into_response())
}

/// Reads one payment.
async fn get_payment(
    State(ledger): State<Arc<PaymentLedger>>,
    admitted: Option<Extension<AdmittedRequest>>,
    Path(id): Path<String>,
) -> Result<Response, PaymentError> {
    let Extension(admitted) = admitted.ok_or(PaymentError::NotAdmitted)?;
    Ok(Json(ledger.get(&admitted.tenant_id, &id)?).into_response())
}

/// Updates one payment.
async fn update_payment(
    State(ledger): State<Arc<PaymentLedger>>,
    admitted: Option<Extension<AdmittedRequest>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, PaymentError> {
    let Extension(admitted) = admitted.ok_or(PaymentError::NotAdmitted)?;
    let update: UpdatePayment = parse_body(&body)?;
    if let Some(description) = &update.description {
        validate_description(description)?;
    }
    if let Some(reference) = &update.reference {
        validate_reference(reference)?;
    }
    Ok(Json(ledger.update(&admitted.tenant_id, &id, update)?).into_response())
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Parses a JSON body.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, PaymentError> {
    serde_json::from_slice(body)
        .map_err(|err| PaymentError::Invalid(format!("invalid request body: {err}")))
}

/// Validates a creation request.
fn validate_create(request: &CreatePayment) -> Result<(), PaymentError> {
    if request.amount == 0 {
        return Err(PaymentError::Invalid("amount must be greater than zero".to_string()));
    }
    if request.currency.len() != 3 || !request.currency.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(PaymentError::Invalid(
            "currency must be a three-letter uppercase code".to_string(),
        ));
    }
    validate_description(&request.description)?;
    if let Some(reference) = &request.reference {
        validate_reference(reference)?;
    }
    Ok(())
}

/// Validates a description.
fn validate_description(description: &str) -> Result<(), PaymentError> {
    if description.trim().is_empty() {
        return Err(PaymentError::Invalid("description is required".to_string()));
    }
    if description.len() > MAX_DESCRIPTION_BYTES {
        return Err(PaymentError::Invalid(format!(
            "description exceeds {MAX_DESCRIPTION_BYTES} bytes"
        )));
    }
    Ok(())
}

/// Validates a reference.
fn validate_reference(reference: &str) -> Result<(), PaymentError> {
    if reference.len() > MAX_REFERENCE_BYTES {
        return Err(PaymentError::Invalid(format!("reference exceeds {MAX_REFERENCE_BYTES} bytes")));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions use unwrap for clarity.")]

    use super::CreatePayment;
    use super::PaymentError;
    use super::PaymentLedger;
    use super::UpdatePayment;
    use super::validate_create;

    fn create_request(currency: &str, amount: u64) -> CreatePayment {
        CreatePayment {
            amount,
            currency: currency.to_string(),
            description: "invoice 42".to_string(),
            reference: None,
        }
    }

    #[test]
    fn ledger_scopes_payments_to_tenant() {
        let ledger = PaymentLedger::new();
        let payment = ledger.create("abc", create_request("USD", 1_000)).unwrap();
        assert_eq!(payment.id, "p1");
        assert_eq!(ledger.get("abc", "p1").unwrap(), payment);
        assert_eq!(ledger.get("xyz", "p1"), Err(PaymentError::NotFound));
        assert!(ledger.list("xyz").unwrap().is_empty());
        assert_eq!(ledger.list("abc").unwrap().len(), 1);
    }

    #[test]
    fn update_of_foreign_payment_is_not_found() {
        let ledger = PaymentLedger::new();
        ledger.create("abc", create_request("EUR", 5)).unwrap();
        let update = UpdatePayment {
            description: Some("changed".to_string()),
            reference: None,
        };
        assert_eq!(ledger.update("xyz", "p1", update), Err(PaymentError::NotFound));
        assert_eq!(ledger.get("abc", "p1").unwrap().description, "invoice 42");
    }

    #[test]
    fn create_validation_rejects_bad_input() {
        assert!(validate_create(&create_request("USD", 1)).is_ok());
        assert!(matches!(validate_create(&create_request("USD", 0)), Err(PaymentError::Invalid(_))));
        assert!(matches!(validate_create(&create_request("usd", 1)), Err(PaymentError::Invalid(_))));
        assert!(matches!(validate_create(&create_request("USDT", 1)), Err(PaymentError::Invalid(_))));
    }
}

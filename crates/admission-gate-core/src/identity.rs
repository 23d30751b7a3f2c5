// crates/admission-gate-core/src/identity.rs
// ============================================================================
// Module: Identity Resolver
// Description: Tenant identity derivation from verified client certificates.
// Purpose: Turn a transport-verified credential chain into a tenant identity.
// Dependencies: rustls-pki-types, x509-parser
// ============================================================================

//! ## Overview
//! The listener requires and verifies a client certificate during the TLS
//! handshake. This module only inspects the result: it confirms that a
//! verified chain is present, reads the leaf subject common name, and extracts
//! the tenant id from the `tenant-<id>.<domain>` naming convention.
//!
//! Failures are fail-closed. A missing or unverified chain is
//! [`AdmissionError::Unauthenticated`]; a verified certificate that does not
//! name a tenant is [`AdmissionError::Forbidden`]. A [`TenantIdentity`] can
//! only be produced by [`IdentityResolver::resolve`], so holding one proves the
//! checks passed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use rustls_pki_types::CertificateDer;
use serde::Serialize;
use x509_parser::parse_x509_certificate;

use crate::error::AdmissionError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Common-name prefix that marks a tenant credential.
pub const TENANT_CN_PREFIX: &str = "tenant-";
/// Default DNS domain under which tenant credentials are issued.
pub const DEFAULT_TENANT_DOMAIN: &str = "yourorg.com";
/// Maximum accepted tenant id length.
const MAX_TENANT_ID_LENGTH: usize = 128;

// ============================================================================
// SECTION: Peer Credentials
// ============================================================================

/// Client certificate chain captured from the transport handshake.
#[derive(Debug, Clone)]
pub struct PeerCertificates {
    /// Presented chain, leaf first.
    chain: Vec<CertificateDer<'static>>,
    /// Whether the transport verified the chain against its trust roots.
    verified: bool,
}

impl PeerCertificates {
    /// Wraps a chain the transport verified during the handshake.
    #[must_use]
    pub const fn verified(chain: Vec<CertificateDer<'static>>) -> Self {
        Self {
            chain,
            verified: true,
        }
    }

    /// Wraps a chain that was presented but not verified.
    #[must_use]
    pub const fn unverified(chain: Vec<CertificateDer<'static>>) -> Self {
        Self {
            chain,
            verified: false,
        }
    }

    /// Returns true when the transport verified the chain.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        self.verified
    }

    /// Returns the leaf certificate, if any.
    #[must_use]
    pub fn leaf(&self) -> Option<&CertificateDer<'static>> {
        self.chain.first()
    }

    /// Returns the full presented chain.
    #[must_use]
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }
}

// ============================================================================
// SECTION: Tenant Identity
// ============================================================================

/// Verified tenant identity derived for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantIdentity {
    /// Tenant id extracted from the certificate common name.
    tenant_id: String,
    /// Leaf certificate serial number, lowercase hex.
    credential_serial: String,
    /// Leaf certificate issuer distinguished name.
    credential_issuer: String,
    /// Always true for a constructed identity.
    verified: bool,
}

impl TenantIdentity {
    /// Returns the tenant id.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Returns the credential serial number as lowercase hex.
    #[must_use]
    pub fn credential_serial(&self) -> &str {
        &self.credential_serial
    }

    /// Returns the credential issuer distinguished name.
    #[must_use]
    pub fn credential_issuer(&self) -> &str {
        &self.credential_issuer
    }

    /// Returns whether the backing credential was verified.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        self.verified
    }

    /// Builds an identity for unit tests without a certificate.
    #[cfg(test)]
    pub(crate) fn fixture(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            credential_serial: "01".to_string(),
            credential_issuer: "CN=test-ca".to_string(),
            verified: true,
        }
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Derives tenant identities from verified client certificates.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    /// Domain suffix including the leading dot, e.g. `.yourorg.com`.
    suffix: String,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_TENANT_DOMAIN)
    }
}

impl IdentityResolver {
    /// Creates a resolver for credentials issued under `tenant_domain`.
    #[must_use]
    pub fn new(tenant_domain: &str) -> Self {
        let domain = tenant_domain.trim().trim_start_matches('.');
        Self {
            suffix: format!(".{domain}"),
        }
    }

    /// Returns the configured tenant domain without the leading dot.
    #[must_use]
    pub fn tenant_domain(&self) -> &str {
        self.suffix.strip_prefix('.').unwrap_or(&self.suffix)
    }

    /// Resolves the tenant identity for the presented peer credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Unauthenticated`] when no verified credential
    /// is present and [`AdmissionError::Forbidden`] when the credential does
    /// not name a tenant.
    pub fn resolve(
        &self,
        peer: Option<&PeerCertificates>,
    ) -> Result<TenantIdentity, AdmissionError> {
        let Some(peer) = peer else {
            return Err(AdmissionError::Unauthenticated(
                "client certificate required".to_string(),
            ));
        };
        if !peer.is_verified() {
            return Err(AdmissionError::Unauthenticated(
                "client certificate chain not verified".to_string(),
            ));
        }
        let Some(leaf) = peer.leaf() else {
            return Err(AdmissionError::Unauthenticated(
                "client certificate chain is empty".to_string(),
            ));
        };
        let (_, certificate) = parse_x509_certificate(leaf.as_ref()).map_err(|_| {
            AdmissionError::Unauthenticated("client certificate could not be parsed".to_string())
        })?;
        let common_name = certificate
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attribute| attribute.as_str().ok())
            .unwrap_or_default();
        let tenant_id = self.tenant_id_from_common_name(common_name)?;
        Ok(TenantIdentity {
            tenant_id,
            credential_serial: hex_serial(certificate.raw_serial()),
            credential_issuer: certificate.issuer().to_string(),
            verified: true,
        })
    }

    /// Extracts the tenant id from a `tenant-<id>.<domain>` common name.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Forbidden`] when the common name is empty,
    /// does not match the pattern, or yields an invalid tenant id.
    pub fn tenant_id_from_common_name(&self, common_name: &str) -> Result<String, AdmissionError> {
        if common_name.is_empty() {
            return Err(AdmissionError::Forbidden(
                "client certificate has no common name".to_string(),
            ));
        }
        let tenant_id = common_name
            .strip_prefix(TENANT_CN_PREFIX)
            .and_then(|rest| rest.strip_suffix(self.suffix.as_str()))
            .ok_or_else(|| {
                AdmissionError::Forbidden(format!(
                    "certificate common name does not match {TENANT_CN_PREFIX}<id>{}",
                    self.suffix
                ))
            })?;
        validate_tenant_id(tenant_id)?;
        Ok(tenant_id.to_string())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates an extracted tenant id.
fn validate_tenant_id(tenant_id: &str) -> Result<(), AdmissionError> {
    if tenant_id.is_empty() {
        return Err(AdmissionError::Forbidden("certificate names an empty tenant id".to_string()));
    }
    if tenant_id.len() > MAX_TENANT_ID_LENGTH {
        return Err(AdmissionError::Forbidden("tenant id exceeds max length".to_string()));
    }
    if !tenant_id.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')) {
        return Err(AdmissionError::Forbidden(
            "tenant id contains unsupported characters".to_string(),
        ));
    }
    Ok(())
}

/// Formats a raw serial number as lowercase hex without separators.
fn hex_serial(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len() * 2);
    for byte in raw {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions use unwrap for clarity.")]

    use super::IdentityResolver;
    use super::hex_serial;
    use crate::error::AdmissionError;

    #[test]
    fn extracts_tenant_id_from_common_name() {
        let resolver = IdentityResolver::default();
        assert_eq!(resolver.tenant_id_from_common_name("tenant-abc.yourorg.com").unwrap(), "abc");
    }

    #[test]
    fn custom_domain_with_leading_dot_is_normalized() {
        let resolver = IdentityResolver::new(".payments.example");
        assert_eq!(resolver.tenant_domain(), "payments.example");
        assert_eq!(
            resolver.tenant_id_from_common_name("tenant-acme.payments.example").unwrap(),
            "acme"
        );
    }

    #[test]
    fn rejects_foreign_domain_and_missing_prefix() {
        let resolver = IdentityResolver::default();
        for cn in ["tenant-abc.evil.com", "abc.yourorg.com", "tenant-abc.yourorg.com.evil"] {
            assert!(matches!(
                resolver.tenant_id_from_common_name(cn),
                Err(AdmissionError::Forbidden(_))
            ));
        }
    }

    #[test]
    fn rejects_empty_id_and_empty_common_name() {
        let resolver = IdentityResolver::default();
        assert!(matches!(
            resolver.tenant_id_from_common_name("tenant-.yourorg.com"),
            Err(AdmissionError::Forbidden(_))
        ));
        assert!(matches!(
            resolver.tenant_id_from_common_name(""),
            Err(AdmissionError::Forbidden(_))
        ));
    }

    #[test]
    fn rejects_separator_characters_in_tenant_id() {
        let resolver = IdentityResolver::default();
        assert!(matches!(
            resolver.tenant_id_from_common_name("tenant-a:b.yourorg.com"),
            Err(AdmissionError::Forbidden(_))
        ));
    }

    #[test]
    fn missing_credential_is_unauthenticated() {
        let resolver = IdentityResolver::default();
        assert!(matches!(resolver.resolve(None), Err(AdmissionError::Unauthenticated(_))));
    }

    #[test]
    fn serial_is_lowercase_hex() {
        assert_eq!(hex_serial(&[0x0a, 0xff, 0x01]), "0aff01");
    }
}

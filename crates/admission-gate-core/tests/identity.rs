// crates/admission-gate-core/tests/identity.rs
// ============================================================================
// Module: Identity Resolver Tests
// Description: Certificate-driven tenant identity resolution.
// Purpose: Validate fail-closed credential handling with real X.509 input.
// Dependencies: admission-gate-core, rcgen
// ============================================================================

//! Identity resolver tests using freshly minted client certificates.

use admission_gate_core::AdmissionError;
use admission_gate_core::IdentityResolver;
use admission_gate_core::PeerCertificates;
use rustls_pki_types::CertificateDer;

mod common;

use common::TestResult;
use common::client_chain;

#[test]
fn resolves_tenant_from_verified_certificate() -> TestResult {
    let chain = client_chain(Some("tenant-abc.yourorg.com"), &[0x0a, 0xbc])?;
    let identity = IdentityResolver::default().resolve(Some(&PeerCertificates::verified(chain)))?;
    assert_eq!(identity.tenant_id(), "abc");
    assert_eq!(identity.credential_serial(), "0abc");
    assert!(identity.credential_issuer().contains("Payments Test CA"));
    assert!(identity.is_verified());
    Ok(())
}

#[test]
fn foreign_domain_is_forbidden() -> TestResult {
    let chain = client_chain(Some("tenant-abc.evil.com"), &[0x01])?;
    let result = IdentityResolver::default().resolve(Some(&PeerCertificates::verified(chain)));
    assert!(matches!(result, Err(AdmissionError::Forbidden(_))));
    Ok(())
}

#[test]
fn certificate_without_common_name_is_forbidden() -> TestResult {
    let chain = client_chain(None, &[0x01])?;
    let result = IdentityResolver::default().resolve(Some(&PeerCertificates::verified(chain)));
    assert!(matches!(result, Err(AdmissionError::Forbidden(_))));
    Ok(())
}

#[test]
fn unverified_chain_is_unauthenticated() -> TestResult {
    let chain = client_chain(Some("tenant-abc.yourorg.com"), &[0x01])?;
    let result = IdentityResolver::default().resolve(Some(&PeerCertificates::unverified(chain)));
    assert!(matches!(result, Err(AdmissionError::Unauthenticated(_))));
    Ok(())
}

#[test]
fn empty_chain_is_unauthenticated() {
    let result = IdentityResolver::default().resolve(Some(&PeerCertificates::verified(Vec::new())));
    assert!(matches!(result, Err(AdmissionError::Unauthenticated(_))));
}

#[test]
fn unparseable_leaf_is_unauthenticated() {
    let garbage = CertificateDer::from(vec![0x30, 0x03, 0x01, 0x02, 0x03]);
    let result = IdentityResolver::default().resolve(Some(&PeerCertificates::verified(vec![garbage])));
    assert!(matches!(result, Err(AdmissionError::Unauthenticated(_))));
}

#[test]
fn custom_tenant_domain_is_honored() -> TestResult {
    let chain = client_chain(Some("tenant-acme.payments.example"), &[0x01])?;
    let peer = PeerCertificates::verified(chain);
    let identity = IdentityResolver::new("payments.example").resolve(Some(&peer))?;
    assert_eq!(identity.tenant_id(), "acme");
    let default_domain = IdentityResolver::default().resolve(Some(&peer));
    assert!(matches!(default_domain, Err(AdmissionError::Forbidden(_))));
    Ok(())
}

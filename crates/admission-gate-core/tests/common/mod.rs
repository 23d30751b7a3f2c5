// crates/admission-gate-core/tests/common/mod.rs
// =============================================================================
// Module: Core Test Helpers
// Description: Ephemeral client certificates for identity and policy tests.
// Purpose: Mint tenant credentials without committing private keys.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use admission_gate_core::IdentityResolver;
use admission_gate_core::PeerCertificates;
use admission_gate_core::TenantIdentity;
use rcgen::BasicConstraints;
use rcgen::CertificateParams;
use rcgen::DistinguishedName;
use rcgen::DnType;
use rcgen::IsCa;
use rcgen::Issuer;
use rcgen::KeyPair;
use rcgen::SerialNumber;
use rustls_pki_types::CertificateDer;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Issues a client certificate chain (leaf, CA) for `common_name`.
pub fn client_chain(
    common_name: Option<&str>,
    serial: &[u8],
) -> Result<Vec<CertificateDer<'static>>, Box<dyn std::error::Error>> {
    let ca_key = KeyPair::generate()?;
    let mut ca_params = CertificateParams::default();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.distinguished_name = distinguished_name(Some("Payments Test CA"));
    let ca = ca_params.self_signed(&ca_key)?;
    let issuer = Issuer::new(ca_params, ca_key);

    let key = KeyPair::generate()?;
    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(common_name);
    params.is_ca = IsCa::NoCa;
    params.serial_number = Some(SerialNumber::from(serial.to_vec()));
    let leaf = params.signed_by(&key, &issuer)?;
    Ok(vec![leaf.der().clone(), ca.der().clone()])
}

/// Resolves an identity for `tenant-<tenant_id>.yourorg.com`.
pub fn identity_for(tenant_id: &str) -> Result<TenantIdentity, Box<dyn std::error::Error>> {
    let chain = client_chain(Some(&format!("tenant-{tenant_id}.yourorg.com")), &[0x01])?;
    let peer = PeerCertificates::verified(chain);
    Ok(IdentityResolver::default().resolve(Some(&peer))?)
}

fn distinguished_name(common_name: Option<&str>) -> DistinguishedName {
    let mut name = DistinguishedName::new();
    if let Some(common_name) = common_name {
        name.push(DnType::CommonName, common_name);
    }
    name.push(DnType::OrganizationName, "Payments Test");
    name
}

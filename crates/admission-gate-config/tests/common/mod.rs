// crates/admission-gate-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for admission-gate-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use admission_gate_config::AdmissionGateConfig;
use admission_gate_config::ConfigError;

/// TLS section accepted by validation.
pub const TLS_SECTION: &str = r#"
[server.tls]
cert_path = "certs/server.pem"
key_path = "certs/server.key"
client_ca_path = "certs/clients-ca.pem"
"#;

/// Parses a TOML string into an `AdmissionGateConfig` for tests.
pub fn config_from_toml(toml_str: &str) -> Result<AdmissionGateConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns a minimal config that passes validation.
pub fn minimal_config() -> Result<AdmissionGateConfig, toml::de::Error> {
    config_from_toml(TLS_SECTION)
}

/// Asserts that `result` failed with a message containing `needle`.
pub fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> Result<(), String> {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}

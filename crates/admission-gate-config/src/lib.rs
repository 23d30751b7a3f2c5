// crates/admission-gate-config/src/lib.rs
// ============================================================================
// Module: Admission Gate Config
// Description: Configuration model, loading, and validation.
// Purpose: Provide one strict, fail-closed source of gateway settings.
// Dependencies: admission-gate-core, serde, toml
// ============================================================================

//! ## Overview
//! The gateway is configured from a single TOML file. Loading enforces size
//! and path limits, parsing rejects unknown keys, and [`AdmissionGateConfig::validate`]
//! checks cross-field invariants before any listener starts.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AdmissionGateConfig;
pub use config::CacheBackend;
pub use config::ConfigError;
pub use config::IdempotencyConfig;
pub use config::IdentityConfig;
pub use config::LogFormat;
pub use config::LoggingConfig;
pub use config::PolicyConfig;
pub use config::ServerConfig;
pub use config::ServerTlsConfig;
pub use config::TenantsConfig;
pub use config::read_policy_file;

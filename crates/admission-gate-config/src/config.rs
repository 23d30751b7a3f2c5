// crates/admission-gate-config/src/config.rs
// ============================================================================
// Module: Admission Gate Configuration
// Description: Configuration loading and validation for the admission gateway.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: admission-gate-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed: the gateway refuses to start
//! rather than serve with a weakened posture. Client certificates are always
//! required, so the `server.tls` section is mandatory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use admission_gate_core::IdempotencySettings;
use admission_gate_core::TenantAttributes;
use admission_gate_core::TenantDirectory;
use admission_gate_core::policy::DEFAULT_POLICY_SOURCE;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "admission-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "ADMISSION_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum policy file size in bytes.
pub(crate) const MAX_POLICY_FILE_SIZE: usize = 256 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Accepted Redis URL schemes; `rediss://` connects over TLS.
pub(crate) const REDIS_URL_SCHEMES: [&str; 2] = ["redis://", "rediss://"];
/// Maximum number of per-tenant attribute overrides.
pub(crate) const MAX_TENANT_OVERRIDES: usize = 10_000;
/// Maximum record lifetime in hours.
pub(crate) const MAX_IDEMPOTENCY_TTL_HOURS: u64 = 720;
/// Minimum cache operation timeout in milliseconds.
pub(crate) const MIN_CACHE_TIMEOUT_MS: u64 = 10;
/// Maximum cache operation timeout in milliseconds.
pub(crate) const MAX_CACHE_TIMEOUT_MS: u64 = 10_000;
/// Maximum in-flight lease lifetime in seconds.
pub(crate) const MAX_LEASE_SECS: u64 = 300;
/// Minimum request timeout in milliseconds.
pub(crate) const MIN_REQUEST_TIMEOUT_MS: u64 = 100;
/// Maximum request timeout in milliseconds.
pub(crate) const MAX_REQUEST_TIMEOUT_MS: u64 = 300_000;
/// Minimum stored record size limit in bytes.
pub(crate) const MIN_RECORD_BYTES: usize = 1024;
/// Maximum stored record size limit in bytes.
pub(crate) const MAX_RECORD_BYTES: usize = 16 * 1024 * 1024;
/// Maximum buffered request body size in bytes.
pub(crate) const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Admission gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdmissionGateConfig {
    /// Listener configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Identity resolution configuration.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Policy source configuration.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Idempotency cache configuration.
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    /// Tenant attribute configuration.
    #[serde(default)]
    pub tenants: TenantsConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AdmissionGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// The path is taken from `path`, else [`CONFIG_ENV_VAR`], else
    /// `admission-gate.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let content = read_bounded(&resolved, MAX_CONFIG_FILE_SIZE, "config file")?;
        let config: Self =
            toml::from_str(&content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.identity.validate()?;
        self.policy.validate()?;
        self.idempotency.validate()?;
        self.tenants.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// TLS material; required.
    #[serde(default)]
    pub tls: Option<ServerTlsConfig>,
    /// Maximum buffered request body size for idempotent requests.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Deadline for the whole admission pipeline and handler.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Trust `X-Forwarded-For` / `X-Real-IP` for the client address.
    #[serde(default)]
    pub trust_forwarded_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            tls: None,
            max_body_bytes: default_max_body_bytes(),
            request_timeout_ms: default_request_timeout_ms(),
            trust_forwarded_headers: false,
        }
    }
}

impl ServerConfig {
    /// Validates listener configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        let Some(tls) = &self.tls else {
            return Err(ConfigError::Invalid(
                "server.tls is required; client certificates are mandatory".to_string(),
            ));
        };
        tls.validate()?;
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_BODY_BYTES}"
            )));
        }
        if !(MIN_REQUEST_TIMEOUT_MS ..= MAX_REQUEST_TIMEOUT_MS).contains(&self.request_timeout_ms)
        {
            return Err(ConfigError::Invalid(format!(
                "server.request_timeout_ms must be between {MIN_REQUEST_TIMEOUT_MS} and \
                 {MAX_REQUEST_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }

    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is not a socket address: {}", self.bind)))
    }

    /// Returns the request deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// TLS material for the mTLS listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerTlsConfig {
    /// Server certificate chain (PEM).
    pub cert_path: String,
    /// Server private key (PEM).
    pub key_path: String,
    /// CA bundle used to verify client certificates (PEM).
    pub client_ca_path: String,
}

impl ServerTlsConfig {
    /// Validates TLS paths.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("server.tls.cert_path", &self.cert_path)?;
        validate_path_string("server.tls.key_path", &self.key_path)?;
        validate_path_string("server.tls.client_ca_path", &self.client_ca_path)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Identity resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// DNS domain under which tenant certificates are issued.
    #[serde(default = "default_tenant_domain")]
    pub tenant_domain: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            tenant_domain: default_tenant_domain(),
        }
    }
}

impl IdentityConfig {
    /// Validates the tenant domain as a dotted DNS name.
    fn validate(&self) -> Result<(), ConfigError> {
        let domain = self.tenant_domain.trim().trim_start_matches('.');
        if domain.is_empty() || domain.len() > 253 {
            return Err(ConfigError::Invalid(
                "identity.tenant_domain must be a non-empty DNS name".to_string(),
            ));
        }
        let labels_ok = domain.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
        });
        if !labels_ok {
            return Err(ConfigError::Invalid(format!(
                "identity.tenant_domain is not a valid DNS name: {domain}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Policy source configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Cedar policy file; the built-in policy is used when absent.
    #[serde(default)]
    pub path: Option<String>,
}

impl PolicyConfig {
    /// Validates the policy path.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("policy.path", path)?;
        }
        Ok(())
    }

    /// Reads the configured policy source, or the built-in policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the policy file cannot be read.
    pub fn load_source(&self) -> Result<String, ConfigError> {
        match &self.path {
            Some(path) => read_policy_file(Path::new(path)),
            None => Ok(DEFAULT_POLICY_SOURCE.to_string()),
        }
    }
}

/// Reads a policy file with the policy size limit.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file is unreadable, oversized, or not UTF-8.
pub fn read_policy_file(path: &Path) -> Result<String, ConfigError> {
    validate_path(path)?;
    read_bounded(path, MAX_POLICY_FILE_SIZE, "policy file")
}

// ============================================================================
// SECTION: Idempotency
// ============================================================================

/// Idempotency cache backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Redis-compatible server.
    #[default]
    Redis,
    /// Process-local memory; records do not survive restarts or span replicas.
    Memory,
}

/// Idempotency cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdempotencyConfig {
    /// Cache backend.
    #[serde(default)]
    pub backend: CacheBackend,
    /// Redis connection URL (`redis://` or `rediss://` for TLS).
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Record lifetime in hours.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    /// Bound on each cache operation in milliseconds.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// In-flight lease lifetime in seconds; leases are disabled when absent.
    #[serde(default)]
    pub in_flight_lease_secs: Option<u64>,
    /// Responses whose encoded record exceeds this size are not stored.
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: usize,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            redis_url: default_redis_url(),
            ttl_hours: default_ttl_hours(),
            operation_timeout_ms: default_operation_timeout_ms(),
            in_flight_lease_secs: None,
            max_record_bytes: default_max_record_bytes(),
        }
    }
}

impl IdempotencyConfig {
    /// Validates cache configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == CacheBackend::Redis
            && !REDIS_URL_SCHEMES.iter().any(|scheme| self.redis_url.starts_with(scheme))
        {
            return Err(ConfigError::Invalid(
                "idempotency.redis_url must use the redis:// or rediss:// scheme".to_string(),
            ));
        }
        if self.ttl_hours == 0 || self.ttl_hours > MAX_IDEMPOTENCY_TTL_HOURS {
            return Err(ConfigError::Invalid(format!(
                "idempotency.ttl_hours must be between 1 and {MAX_IDEMPOTENCY_TTL_HOURS}"
            )));
        }
        if !(MIN_CACHE_TIMEOUT_MS ..= MAX_CACHE_TIMEOUT_MS).contains(&self.operation_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "idempotency.operation_timeout_ms must be between {MIN_CACHE_TIMEOUT_MS} and \
                 {MAX_CACHE_TIMEOUT_MS}"
            )));
        }
        if let Some(lease) = self.in_flight_lease_secs
            && (lease == 0 || lease > MAX_LEASE_SECS)
        {
            return Err(ConfigError::Invalid(format!(
                "idempotency.in_flight_lease_secs must be between 1 and {MAX_LEASE_SECS}"
            )));
        }
        if !(MIN_RECORD_BYTES ..= MAX_RECORD_BYTES).contains(&self.max_record_bytes) {
            return Err(ConfigError::Invalid(format!(
                "idempotency.max_record_bytes must be between {MIN_RECORD_BYTES} and \
                 {MAX_RECORD_BYTES}"
            )));
        }
        Ok(())
    }

    /// Returns the cache flow settings.
    #[must_use]
    pub const fn settings(&self) -> IdempotencySettings {
        let in_flight_lease = match self.in_flight_lease_secs {
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };
        IdempotencySettings {
            ttl: Duration::from_secs(self.ttl_hours * 60 * 60),
            operation_timeout: Duration::from_millis(self.operation_timeout_ms),
            in_flight_lease,
            max_record_bytes: self.max_record_bytes,
        }
    }
}

// ============================================================================
// SECTION: Tenants
// ============================================================================

/// Tenant attribute configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantsConfig {
    /// Attributes for tenants without an override.
    #[serde(default)]
    pub defaults: TenantAttributes,
    /// Per-tenant attribute overrides keyed by tenant id.
    #[serde(default)]
    pub overrides: BTreeMap<String, TenantAttributes>,
}

impl TenantsConfig {
    /// Validates tenant overrides.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.overrides.len() > MAX_TENANT_OVERRIDES {
            return Err(ConfigError::Invalid(format!(
                "tenants.overrides exceeds {MAX_TENANT_OVERRIDES} entries"
            )));
        }
        for tenant_id in self.overrides.keys() {
            let valid = !tenant_id.is_empty()
                && tenant_id.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
            if !valid {
                return Err(ConfigError::Invalid(format!(
                    "tenants.overrides has invalid tenant id: `{tenant_id}`"
                )));
            }
        }
        Ok(())
    }

    /// Builds the tenant attribute directory.
    #[must_use]
    pub fn directory(&self) -> TenantDirectory {
        TenantDirectory::new(self.defaults.clone(), self.overrides.clone())
    }
}

// ============================================================================
// SECTION: Logging
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}

impl LoggingConfig {
    /// Validates logging configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.filter.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.filter must be non-empty".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default bind address.
fn default_bind() -> String {
    "0.0.0.0:8443".to_string()
}

/// Default request body limit.
const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Default request deadline.
const fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Default tenant domain.
fn default_tenant_domain() -> String {
    admission_gate_core::identity::DEFAULT_TENANT_DOMAIN.to_string()
}

/// Default Redis URL.
fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

/// Default record lifetime in hours.
const fn default_ttl_hours() -> u64 {
    24
}

/// Default cache operation timeout.
const fn default_operation_timeout_ms() -> u64 {
    500
}

/// Default stored record size limit.
const fn default_max_record_bytes() -> usize {
    1024 * 1024
}

/// Default log filter.
fn default_log_filter() -> String {
    "info".to_string()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates a path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path string.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    validate_path(Path::new(trimmed)).map_err(|err| ConfigError::Invalid(format!("{field}: {err}")))
}

/// Reads a UTF-8 file no larger than `limit` bytes.
fn read_bounded(path: &Path, limit: usize, label: &str) -> Result<String, ConfigError> {
    let bytes = fs::read(path)
        .map_err(|err| ConfigError::Io(format!("{label} {}: {err}", path.display())))?;
    if bytes.len() > limit {
        return Err(ConfigError::Invalid(format!("{label} exceeds size limit")));
    }
    String::from_utf8(bytes).map_err(|_| ConfigError::Invalid(format!("{label} must be utf-8")))
}

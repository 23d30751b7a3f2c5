// crates/admission-gate-cli/src/logging.rs
// ============================================================================
// Module: Logging Setup
// Description: tracing-subscriber initialization from logging configuration.
// Purpose: Route operational and audit logs to stderr as text or JSON.
// Dependencies: admission-gate-config, tracing-subscriber
// ============================================================================

//! ## Overview
//! `RUST_LOG` wins over `logging.filter` when set. Output goes to stderr so
//! command results on stdout stay machine-readable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use admission_gate_config::LogFormat;
use admission_gate_config::LoggingConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ============================================================================
// SECTION: Setup
// ============================================================================

/// Builds the log filter from `RUST_LOG` or the configured directive.
///
/// # Errors
///
/// Returns a message when the selected directive does not parse.
pub fn build_filter(configured: &str, env_override: Option<&str>) -> Result<EnvFilter, String> {
    let directive = env_override.filter(|value| !value.trim().is_empty()).unwrap_or(configured);
    EnvFilter::try_new(directive).map_err(|err| format!("invalid log filter `{directive}`: {err}"))
}

/// Installs the global tracing subscriber.
///
/// # Errors
///
/// Returns a message when the filter is invalid or a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<(), String> {
    let env_override = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(&config.filter, env_override.as_deref())?;
    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => {
            registry.with(fmt::layer().with_target(true).with_writer(std::io::stderr)).try_init()
        }
    };
    result.map_err(|err| format!("logging init failed: {err}"))
}

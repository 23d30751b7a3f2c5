// crates/admission-gate-cli/src/main.rs
// ============================================================================
// Module: Admission Gate CLI Entry Point
// Description: Command dispatcher for serving and validating the gateway.
// Purpose: Start the mTLS gateway and check configuration and policy files offline.
// Dependencies: clap, admission-gate-config, admission-gate-core, admission-gate-server, tokio
// ============================================================================

//! ## Overview
//! `admission-gate serve` loads configuration, installs logging, and runs the
//! gateway until it fails. `config check` and `policy check` validate inputs
//! without opening sockets so they can gate deployments.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod logging;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use admission_gate_config::AdmissionGateConfig;
use admission_gate_config::CacheBackend;
use admission_gate_config::read_policy_file;
use admission_gate_core::CedarPolicy;
use admission_gate_core::PolicyProgram;
use admission_gate_server::GatewayServer;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;
use tracing::info;

use crate::logging::init_logging;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "admission-gate", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the admission gateway.
    Serve(ConfigArgs),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Policy utilities.
    Policy {
        /// Selected policy subcommand.
        #[command(subcommand)]
        command: PolicyCommand,
    },
}

/// Config file selection shared by commands.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Optional config file path (defaults to admission-gate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a configuration file and its policy.
    Check(ConfigArgs),
}

/// Policy subcommands.
#[derive(Subcommand, Debug)]
enum PolicyCommand {
    /// Compile a policy file and print its fingerprint.
    Check(PolicyCheckCommand),
}

/// Arguments for `policy check`.
#[derive(Args, Debug)]
struct PolicyCheckCommand {
    /// Policy file to compile.
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => command_serve(args).await,
        Commands::Config {
            command: ConfigCommand::Check(args),
        } => command_config_check(&args),
        Commands::Policy {
            command: PolicyCommand::Check(command),
        } => command_policy_check(&command),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(args: ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    init_logging(&config.logging).map_err(CliError::new)?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting admission gateway");

    let server = GatewayServer::from_config(config)
        .await
        .map_err(|err| CliError::new(format!("gateway init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("gateway failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `config check`.
fn command_config_check(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    let source = config
        .policy
        .load_source()
        .map_err(|err| CliError::new(format!("policy load failed: {err}")))?;
    let policy = compile_policy(&source)?;
    write_stdout_line(&config_summary(&config, &policy))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `policy check`.
fn command_policy_check(command: &PolicyCheckCommand) -> CliResult<ExitCode> {
    let policy = check_policy_file(&command.path)?;
    write_stdout_line(&policy_summary(&policy))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads and validates configuration.
fn load_config(path: Option<&Path>) -> CliResult<AdmissionGateConfig> {
    AdmissionGateConfig::load(path)
        .map_err(|err| CliError::new(format!("config load failed: {err}")))
}

/// Reads and compiles a policy file.
fn check_policy_file(path: &Path) -> CliResult<CedarPolicy> {
    let source = read_policy_file(path)
        .map_err(|err| CliError::new(format!("policy load failed: {err}")))?;
    compile_policy(&source)
}

/// Compiles policy source.
fn compile_policy(source: &str) -> CliResult<CedarPolicy> {
    CedarPolicy::compile(source)
        .map_err(|err| CliError::new(format!("policy check failed: {err}")))
}

/// One-line description of a compiled policy.
fn policy_summary(policy: &CedarPolicy) -> String {
    format!(
        "policy ok: policies={} fingerprint={}",
        policy.policy_count(),
        policy.fingerprint()
    )
}

/// One-line description of a validated configuration.
fn config_summary(config: &AdmissionGateConfig, policy: &CedarPolicy) -> String {
    let backend = match config.idempotency.backend {
        CacheBackend::Redis => "redis",
        CacheBackend::Memory => "memory",
    };
    format!(
        "config ok: bind={} tenant_domain={} idempotency={} {}",
        config.server.bind,
        config.identity.tenant_domain,
        backend,
        policy_summary(policy)
    )
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}

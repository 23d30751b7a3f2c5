// crates/admission-gate-core/src/policy/mod.rs
// ============================================================================
// Module: Policy
// Description: Policy evaluation seams, Cedar engine, and hot-swappable authorizer.
// Purpose: Decide whether a verified tenant may perform a request.
// Dependencies: arc-swap, cedar-policy, serde, sha2
// ============================================================================

//! ## Overview
//! Policy evaluation is split into a compile step ([`PolicyEngine`]) and an
//! evaluate step ([`PolicyProgram`]). The [`PolicyAuthorizer`] holds exactly
//! one compiled program behind an atomically swappable pointer; replacing the
//! policy compiles the new source first and only then swaps, so readers always
//! observe a complete program. The shipped engine is [`CedarEngine`], which
//! evaluates Cedar policy sets and denies any request no `permit` matches.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod authorizer;
pub mod cedar;
pub mod input;
pub mod tenants;

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

pub use self::authorizer::PolicyAuthorizer;
pub use self::authorizer::RequestAuthorizer;
pub use self::cedar::CedarEngine;
pub use self::cedar::CedarPolicy;
pub use self::cedar::DEFAULT_POLICY_SOURCE;
pub use self::input::POLICY_HEADER_ALLOWLIST;
pub use self::input::PolicyDecision;
pub use self::input::PolicyInput;
pub use self::input::RequestAttributes;
pub use self::input::TenantAttributes;
pub use self::tenants::TenantDirectory;

// ============================================================================
// SECTION: Engine Seams
// ============================================================================

/// Compiles policy source into an evaluable program.
pub trait PolicyEngine: Send + Sync {
    /// Compiled program produced by this engine.
    type Program: PolicyProgram + 'static;

    /// Compiles and validates policy source.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Compile`] when the source is invalid.
    fn compile(&self, source: &str) -> Result<Self::Program, PolicyError>;
}

/// Immutable compiled policy.
pub trait PolicyProgram: Send + Sync {
    /// Evaluates the program against a request.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Evaluation`] when the program cannot decide.
    fn evaluate(&self, input: &PolicyInput) -> Result<PolicyDecision, PolicyError>;

    /// Returns a stable fingerprint of the source this program was compiled from.
    fn fingerprint(&self) -> &str;
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Policy compilation and evaluation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Policy source failed to compile or validate.
    #[error("policy compile error: {0}")]
    Compile(String),
    /// Evaluator failed to produce a decision.
    #[error("policy evaluation error: {0}")]
    Evaluation(String),
}

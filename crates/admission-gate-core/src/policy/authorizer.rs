// crates/admission-gate-core/src/policy/authorizer.rs
// ============================================================================
// Module: Policy Authorizer
// Description: Atomically swappable holder for the active compiled policy.
// Purpose: Evaluate requests against one consistent policy while allowing live updates.
// Dependencies: arc-swap, tracing
// ============================================================================

//! ## Overview
//! The authorizer owns the single active policy program. Each evaluation takes
//! a reference-counted snapshot, so an in-flight evaluation keeps using the
//! program it started with even if a replacement lands meanwhile. Replacement
//! compiles outside any exclusive section and publishes with one pointer
//! store; a source that fails to compile never displaces the active program.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::PolicyEngine;
use super::PolicyError;
use super::PolicyProgram;
use super::input::PolicyDecision;
use super::input::PolicyInput;
use super::cedar::CedarEngine;
use super::cedar::DEFAULT_POLICY_SOURCE;
use crate::error::AdmissionError;

// ============================================================================
// SECTION: Authorizer Seam
// ============================================================================

/// Object-safe authorization seam used by the request pipeline.
pub trait RequestAuthorizer: Send + Sync {
    /// Evaluates the active policy.
    ///
    /// Returns the decision for both allow and deny outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Internal`] when the evaluator fails.
    fn authorize(&self, input: &PolicyInput) -> Result<PolicyDecision, AdmissionError>;

    /// Returns the fingerprint of the active policy.
    fn active_fingerprint(&self) -> String;
}

// ============================================================================
// SECTION: Policy Authorizer
// ============================================================================

/// Holds the active compiled policy for an engine.
pub struct PolicyAuthorizer<E: PolicyEngine = CedarEngine> {
    /// Engine used to compile replacements.
    engine: E,
    /// Active compiled program.
    active: ArcSwap<E::Program>,
}

impl PolicyAuthorizer<CedarEngine> {
    /// Creates an authorizer running the built-in Cedar policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] if the built-in policy fails to compile.
    pub fn with_default_policy() -> Result<Self, PolicyError> {
        Self::new(CedarEngine, DEFAULT_POLICY_SOURCE)
    }
}

impl<E: PolicyEngine> PolicyAuthorizer<E> {
    /// Compiles `source` and creates an authorizer with it active.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Compile`] when the source is invalid.
    pub fn new(engine: E, source: &str) -> Result<Self, PolicyError> {
        let program = engine.compile(source)?;
        info!(fingerprint = %program.fingerprint(), "policy loaded");
        Ok(Self {
            engine,
            active: ArcSwap::from_pointee(program),
        })
    }

    /// Returns a snapshot of the active program.
    #[must_use]
    pub fn snapshot(&self) -> Arc<E::Program> {
        self.active.load_full()
    }

    /// Evaluates the active program without mapping errors.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Evaluation`] when the program cannot decide.
    pub fn evaluate(&self, input: &PolicyInput) -> Result<PolicyDecision, PolicyError> {
        let program = self.active.load_full();
        program.evaluate(input)
    }

    /// Compiles `source` and, on success, makes it the active policy.
    ///
    /// Returns the fingerprint of the newly active policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Compile`] when the source is invalid; the
    /// previously active policy stays in place.
    pub fn replace_policy(&self, source: &str) -> Result<String, PolicyError> {
        let program = match self.engine.compile(source) {
            Ok(program) => program,
            Err(err) => {
                warn!(
                    error = %err,
                    active = %self.active.load().fingerprint(),
                    "policy update rejected; keeping active policy"
                );
                return Err(err);
            }
        };
        let fingerprint = program.fingerprint().to_string();
        let previous = self.active.swap(Arc::new(program));
        info!(previous = %previous.fingerprint(), active = %fingerprint, "policy replaced");
        Ok(fingerprint)
    }
}

impl<E: PolicyEngine> RequestAuthorizer for PolicyAuthorizer<E> {
    fn authorize(&self, input: &PolicyInput) -> Result<PolicyDecision, AdmissionError> {
        self.evaluate(input).map_err(|err| {
            error!(
                tenant_id = %input.tenant_id,
                method = %input.method,
                path = %input.path,
                error = %err,
                "policy evaluation failed"
            );
            AdmissionError::Internal("authorization check failed".to_string())
        })
    }

    fn active_fingerprint(&self) -> String {
        self.active.load().fingerprint().to_string()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions use unwrap for clarity.")]

    use super::PolicyAuthorizer;
    use super::RequestAuthorizer;
    use crate::error::AdmissionError;
    use crate::identity::TenantIdentity;
    use crate::policy::PolicyError;
    use crate::policy::CedarEngine;
    use crate::policy::input::PolicyInput;
    use crate::policy::input::RequestAttributes;
    use crate::policy::input::TenantAttributes;

    fn get(path: &str) -> PolicyInput {
        PolicyInput::new(
            &TenantIdentity::fixture("abc"),
            RequestAttributes {
                method: "GET".to_string(),
                path: path.to_string(),
                ..RequestAttributes::default()
            },
            TenantAttributes::default(),
        )
    }

    #[test]
    fn failed_replacement_keeps_active_policy() {
        let authorizer = PolicyAuthorizer::with_default_policy().unwrap();
        let before = authorizer.active_fingerprint();
        let result = authorizer.replace_policy("permit (principal, action, resource);");
        assert!(matches!(result, Err(PolicyError::Compile(_))));
        assert_eq!(authorizer.active_fingerprint(), before);
        assert!(authorizer.authorize(&get("/api/v1/whoami")).unwrap().allowed);
    }

    #[test]
    fn successful_replacement_takes_effect() {
        let authorizer = PolicyAuthorizer::with_default_policy().unwrap();
        let fingerprint = authorizer
            .replace_policy(
                "@id(\"only-reports\")\npermit (principal, action, resource == \
                 Gateway::Endpoint::\"/reports\");",
            )
            .unwrap();
        assert_eq!(authorizer.active_fingerprint(), fingerprint);
        assert!(!authorizer.authorize(&get("/api/v1/whoami")).unwrap().allowed);
        assert!(authorizer.authorize(&get("/reports")).unwrap().allowed);
    }

    #[test]
    fn evaluation_error_maps_to_internal() {
        let source = "@id(\"boom\")\npermit (principal, action, resource) when { context.missing == 1 };";
        let authorizer = PolicyAuthorizer::new(CedarEngine, source).unwrap();
        assert!(matches!(authorizer.authorize(&get("/")), Err(AdmissionError::Internal(_))));
    }
}

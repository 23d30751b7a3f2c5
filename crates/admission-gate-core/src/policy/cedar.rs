// crates/admission-gate-core/src/policy/cedar.rs
// ============================================================================
// Module: Cedar Policy Engine
// Description: Cedar policy sets compiled and evaluated for admission requests.
// Purpose: Provide a deny-by-default evaluator backed by the Cedar authorizer.
// Dependencies: cedar-policy, sha2
// ============================================================================

//! ## Overview
//! Policies are written in Cedar. Each request is evaluated as
//! `Gateway::Tenant` performing `Gateway::Action::"<METHOD>"` on
//! `Gateway::Endpoint::"<path>"`:
//!
//! - `principal` carries `permissions` (set of strings), `tier` and `compliant`.
//! - `resource` carries `path`.
//! - `context` carries `tenant_id`, `method`, `path`, `user_agent`,
//!   `client_ip` and `headers`, a record of the allow-listed request headers
//!   keyed by lowercase name.
//!
//! Every policy needs a unique `@id` annotation, which is reported as the
//! deciding rule. A `forbid` may carry `@reason`, which becomes the deny
//! message. Cedar denies when no `permit` applies and any applicable `forbid`
//! overrides every `permit`. Evaluation errors fail the whole decision, so a
//! `forbid` that errors can never turn into an allow.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::str::FromStr;

use cedar_policy::Authorizer;
use cedar_policy::Context;
use cedar_policy::Decision;
use cedar_policy::Entities;
use cedar_policy::Entity;
use cedar_policy::EntityId;
use cedar_policy::EntityTypeName;
use cedar_policy::EntityUid;
use cedar_policy::PolicySet;
use cedar_policy::Request;
use cedar_policy::RestrictedExpression;
use sha2::Digest;
use sha2::Sha256;

use super::PolicyEngine;
use super::PolicyError;
use super::PolicyProgram;
use super::input::PolicyDecision;
use super::input::PolicyInput;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Built-in policy used when no policy file is configured.
pub const DEFAULT_POLICY_SOURCE: &str = include_str!("default_policy.cedar");
/// Deny reason when no permit applies.
pub const NO_MATCH_REASON: &str = "no matching allow rule";
/// Cedar namespace for admission entities.
const NAMESPACE: &str = "Gateway";
/// Annotation naming a policy.
const ID_ANNOTATION: &str = "id";
/// Annotation carrying a deny reason.
const REASON_ANNOTATION: &str = "reason";
/// Maximum accepted policy source size in bytes.
const MAX_POLICY_SOURCE_BYTES: usize = 256 * 1024;
/// Maximum number of policies per set.
const MAX_POLICIES: usize = 1024;
/// Maximum `@id` length.
const MAX_POLICY_ID_LENGTH: usize = 128;

// ============================================================================
// SECTION: Compiled Policy
// ============================================================================

/// Annotations of one compiled policy.
#[derive(Debug, Clone)]
struct PolicyLabel {
    /// Value of `@id`.
    id: String,
    /// Value of `@reason`, if any.
    reason: Option<String>,
}

/// Compiled, immutable Cedar policy set.
#[derive(Debug)]
pub struct CedarPolicy {
    /// Parsed static policies.
    policies: PolicySet,
    /// Labels keyed by Cedar policy id.
    labels: BTreeMap<String, PolicyLabel>,
    /// SHA-256 fingerprint of the source.
    fingerprint: String,
    /// Cedar authorizer.
    authorizer: Authorizer,
}

impl CedarPolicy {
    /// Compiles a Cedar policy set.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Compile`] when the source is oversized, fails to
    /// parse, contains templates, or has a missing or duplicate `@id`.
    pub fn compile(source: &str) -> Result<Self, PolicyError> {
        if source.len() > MAX_POLICY_SOURCE_BYTES {
            return Err(PolicyError::Compile("policy source exceeds size limit".to_string()));
        }
        let policies = PolicySet::from_str(source)
            .map_err(|err| PolicyError::Compile(format!("parse error: {err}")))?;
        if policies.templates().next().is_some() {
            return Err(PolicyError::Compile("policy templates are not supported".to_string()));
        }

        let mut labels = BTreeMap::new();
        let mut seen = HashSet::new();
        for policy in policies.policies() {
            let cedar_id = policy.id().to_string();
            let id = policy.annotation(ID_ANNOTATION).map(str::trim).unwrap_or_default();
            if id.is_empty() {
                return Err(PolicyError::Compile(format!("{cedar_id}: missing @id annotation")));
            }
            if id.len() > MAX_POLICY_ID_LENGTH {
                return Err(PolicyError::Compile(format!("{cedar_id}: @id exceeds max length")));
            }
            if !seen.insert(id.to_string()) {
                return Err(PolicyError::Compile(format!("duplicate policy @id `{id}`")));
            }
            let reason = policy
                .annotation(REASON_ANNOTATION)
                .map(str::trim)
                .filter(|reason| !reason.is_empty())
                .map(str::to_string);
            labels.insert(cedar_id, PolicyLabel {
                id: id.to_string(),
                reason,
            });
        }
        if labels.len() > MAX_POLICIES {
            return Err(PolicyError::Compile("policy exceeds max policy count".to_string()));
        }

        Ok(Self {
            policies,
            labels,
            fingerprint: fingerprint(source),
            authorizer: Authorizer::new(),
        })
    }

    /// Returns the number of compiled policies.
    #[must_use]
    pub fn policy_count(&self) -> usize {
        self.labels.len()
    }

    /// Returns the labels of the policies that determined a response, ordered by `@id`.
    fn deciding_labels(&self, ids: impl Iterator<Item = String>) -> Vec<&PolicyLabel> {
        let mut deciding: Vec<&PolicyLabel> = ids.filter_map(|id| self.labels.get(&id)).collect();
        deciding.sort_by(|left, right| left.id.cmp(&right.id));
        deciding
    }
}

impl PolicyProgram for CedarPolicy {
    fn evaluate(&self, input: &PolicyInput) -> Result<PolicyDecision, PolicyError> {
        let request = build_request(input)?;
        let entities = build_entities(input)?;
        let response = self.authorizer.is_authorized(&request, &self.policies, &entities);

        let errors: Vec<String> =
            response.diagnostics().errors().map(ToString::to_string).collect();
        if !errors.is_empty() {
            return Err(PolicyError::Evaluation(errors.join("; ")));
        }

        let deciding = self.deciding_labels(response.diagnostics().reason().map(ToString::to_string));
        match response.decision() {
            Decision::Allow => Ok(PolicyDecision::allow(deciding.first().map(|label| label.id.clone()))),
            Decision::Deny => Ok(deciding.first().map_or_else(
                || PolicyDecision::deny(NO_MATCH_REASON, None),
                |label| {
                    let reason = label
                        .reason
                        .clone()
                        .unwrap_or_else(|| format!("denied by policy {}", label.id));
                    PolicyDecision::deny(reason, Some(label.id.clone()))
                },
            )),
        }
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Engine compiling [`CedarPolicy`] programs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CedarEngine;

impl PolicyEngine for CedarEngine {
    type Program = CedarPolicy;

    fn compile(&self, source: &str) -> Result<Self::Program, PolicyError> {
        CedarPolicy::compile(source)
    }
}

// ============================================================================
// SECTION: Request Translation
// ============================================================================

/// Builds a namespaced entity UID.
fn entity_uid(type_name: &str, id: &str) -> Result<EntityUid, PolicyError> {
    let full_type_name = format!("{NAMESPACE}::{type_name}");
    let entity_type = EntityTypeName::from_str(&full_type_name).map_err(|err| {
        PolicyError::Evaluation(format!("invalid entity type `{full_type_name}`: {err}"))
    })?;
    Ok(EntityUid::from_type_name_and_id(entity_type, EntityId::new(id)))
}

/// Builds the Cedar request for an input.
fn build_request(input: &PolicyInput) -> Result<Request, PolicyError> {
    let principal = entity_uid("Tenant", &input.tenant_id)?;
    let action = entity_uid("Action", &input.method)?;
    let resource = entity_uid("Endpoint", &input.path)?;

    let headers = RestrictedExpression::new_record(input.headers.iter().map(|(name, value)| {
        (name.to_ascii_lowercase(), RestrictedExpression::new_string(value.clone()))
    }))
    .map_err(|err| PolicyError::Evaluation(format!("invalid header context: {err}")))?;
    let context = Context::from_pairs([
        ("tenant_id".to_string(), RestrictedExpression::new_string(input.tenant_id.clone())),
        ("method".to_string(), RestrictedExpression::new_string(input.method.clone())),
        ("path".to_string(), RestrictedExpression::new_string(input.path.clone())),
        ("user_agent".to_string(), RestrictedExpression::new_string(input.user_agent.clone())),
        ("client_ip".to_string(), RestrictedExpression::new_string(input.client_ip.clone())),
        ("headers".to_string(), headers),
    ])
    .map_err(|err| PolicyError::Evaluation(format!("invalid request context: {err}")))?;

    Request::new(principal, action, resource, context, None)
        .map_err(|err| PolicyError::Evaluation(format!("invalid request: {err}")))
}

/// Builds the tenant and endpoint entities for an input.
fn build_entities(input: &PolicyInput) -> Result<Entities, PolicyError> {
    let attributes = &input.attributes;
    let tenant_attrs = HashMap::from([
        ("tier".to_string(), RestrictedExpression::new_string(attributes.tier.clone())),
        ("compliant".to_string(), RestrictedExpression::new_bool(attributes.compliant)),
        (
            "permissions".to_string(),
            RestrictedExpression::new_set(
                attributes.permissions.iter().cloned().map(RestrictedExpression::new_string),
            ),
        ),
    ]);
    let tenant = Entity::new(entity_uid("Tenant", &input.tenant_id)?, tenant_attrs, HashSet::new())
        .map_err(|err| PolicyError::Evaluation(format!("invalid tenant entity: {err}")))?;

    let endpoint_attrs =
        HashMap::from([("path".to_string(), RestrictedExpression::new_string(input.path.clone()))]);
    let endpoint = Entity::new(entity_uid("Endpoint", &input.path)?, endpoint_attrs, HashSet::new())
        .map_err(|err| PolicyError::Evaluation(format!("invalid endpoint entity: {err}")))?;

    Entities::from_entities([tenant, endpoint], None)
        .map_err(|err| PolicyError::Evaluation(format!("invalid entity set: {err}")))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Computes the `sha256:<hex>` fingerprint of policy source.
fn fingerprint(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    let mut out = String::with_capacity(7 + digest.len() * 2);
    out.push_str("sha256:");
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

// crates/admission-gate-core/src/policy/tenants.rs
// ============================================================================
// Module: Tenant Directory
// Description: Per-tenant attribute lookup for policy input.
// Purpose: Supply the attribute bag evaluated alongside the verified identity.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Attributes are resolved from configuration: tenants listed explicitly get
//! their own bag, every other verified tenant gets the default bag.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use super::input::TenantAttributes;

// ============================================================================
// SECTION: Directory
// ============================================================================

/// Static tenant attribute directory.
#[derive(Debug, Clone, Default)]
pub struct TenantDirectory {
    /// Attributes for tenants without an override.
    defaults: TenantAttributes,
    /// Per-tenant attribute overrides.
    overrides: BTreeMap<String, TenantAttributes>,
}

impl TenantDirectory {
    /// Creates a directory from defaults and overrides.
    #[must_use]
    pub const fn new(
        defaults: TenantAttributes,
        overrides: BTreeMap<String, TenantAttributes>,
    ) -> Self {
        Self {
            defaults,
            overrides,
        }
    }

    /// Returns the attribute bag for `tenant_id`.
    #[must_use]
    pub fn attributes_for(&self, tenant_id: &str) -> TenantAttributes {
        self.overrides.get(tenant_id).unwrap_or(&self.defaults).clone()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::TenantDirectory;
    use crate::policy::input::TenantAttributes;

    #[test]
    fn overrides_take_precedence_over_defaults() {
        let restricted = TenantAttributes {
            permissions: vec!["read_payments".to_string()],
            tier: "standard".to_string(),
            compliant: false,
        };
        let directory = TenantDirectory::new(
            TenantAttributes::default(),
            BTreeMap::from([("limited".to_string(), restricted.clone())]),
        );
        assert_eq!(directory.attributes_for("limited"), restricted);
        assert_eq!(directory.attributes_for("other"), TenantAttributes::default());
    }
}

//! Tenant context for a single inbound request
//!
//! Produced by the auth/session layer and read-only from then on. The ORM's
//! tenant guard and the loader registry both consume it.

use serde::{Deserialize, Serialize};

/// Who the current operation runs on behalf of
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    /// Business the caller belongs to, if any
    pub tenant_id: Option<String>,
    /// Platform administrator acting across tenants
    pub admin_bypass: bool,
    /// Explicit opt-out of tenant scoping for one operation
    pub skip_scope: bool,
}

impl TenantContext {
    /// Context scoped to one tenant
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Self::default()
        }
    }

    /// Administrator context that bypasses tenant scoping
    pub fn admin() -> Self {
        Self {
            admin_bypass: true,
            ..Self::default()
        }
    }

    /// Context with no tenant, used by background and system jobs
    pub fn system() -> Self {
        Self::default()
    }

    /// Copy of this context that opts out of tenant scoping
    pub fn skip_tenant_scope(&self) -> Self {
        Self {
            skip_scope: true,
            ..self.clone()
        }
    }

    /// The tenant id, treating an empty string as absent
    pub fn tenant(&self) -> Option<&str> {
        self.tenant_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn bypasses_scope(&self) -> bool {
        self.admin_bypass || self.skip_scope
    }
}

//! Cache scoping: which user and which table a cached entry belongs to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Authenticated principal owning a table session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Unique identifier for the authenticated entity (user or session id).
    pub id: String,
}

/// Discriminator that partitions every cache entry.
///
/// Two table sessions share cached results only when their scopes are equal.
/// A scope always carries both the caller identity and the table/component
/// identity, so one user's cached rows are never served to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    /// Tenant for multi-tenant deployments. `None` for single-tenant.
    pub tenant_id: Option<String>,
    /// User or session identity.
    pub principal_id: String,
    /// Table/component identity within the host UI.
    pub table_id: String,
}

impl Scope {
    /// Creates a single-tenant scope.
    #[must_use]
    pub fn new(principal_id: impl Into<String>, table_id: impl Into<String>) -> Self {
        Self {
            tenant_id: None,
            principal_id: principal_id.into(),
            table_id: table_id.into(),
        }
    }

    /// Returns a copy of this scope bound to `tenant_id`.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tenant_id {
            Some(tenant) => write!(f, "{tenant}/{}/{}", self.principal_id, self.table_id),
            None => write!(f, "{}/{}", self.principal_id, self.table_id),
        }
    }
}

/// Supplies the stable per-scope discriminator for a table session.
pub trait IdentityProvider: Send + Sync {
    /// The scope every cache entry of this session is keyed under.
    fn scope(&self) -> Scope;
}

/// Identity provider for a fixed principal and table.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    scope: Scope,
}

impl StaticIdentity {
    /// Creates a provider that always returns `scope`.
    #[must_use]
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }

    /// Creates a provider for `principal` viewing `table_id`.
    #[must_use]
    pub fn for_principal(principal: &Principal, table_id: impl Into<String>) -> Self {
        Self::new(Scope::new(principal.id.clone(), table_id))
    }
}

impl IdentityProvider for StaticIdentity {
    fn scope(&self) -> Scope {
        self.scope.clone()
    }
}

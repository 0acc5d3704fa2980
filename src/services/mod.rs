//! Downstream collaborators consulted by the gateway: the auth, tenant and
//! project services. Each is a trait so the gateway receives them explicitly
//! at construction time.

pub mod auth_service;
pub mod directory;
pub mod project_service;
pub mod tenant_service;

use async_trait::async_trait;
use uuid::Uuid;

use crate::identity::scope::ScopeId;
use crate::permissions::grants::{Grant, PermissionSet, Role, Target};

pub use auth_service::{ApiKeyRecord, ApiKeyStore, JwtAuthService, PgApiKeyStore};
pub use directory::DirectoryService;
pub use project_service::PgProjectService;
pub use tenant_service::PgTenantService;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The credential itself is invalid, expired or revoked
    #[error("Credential rejected: {0}")]
    Rejected(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database manager error: {0}")]
    DatabaseManager(#[from] crate::database::manager::DatabaseError),
}

/// Identity asserted by a credential after signature and expiry checks.
/// Tenant and project are still in their raw (un-normalized) encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    pub user_id: Uuid,
    pub tenant: String,
    pub project: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRecord {
    pub id: ScopeId,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRecord {
    pub id: ScopeId,
    pub tenant_id: ScopeId,
    pub name: String,
    pub is_active: bool,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn validate_token(&self, token: &str) -> Result<VerifiedCredential, ServiceError>;

    async fn validate_api_key(&self, key: &str) -> Result<VerifiedCredential, ServiceError>;
}

#[async_trait]
pub trait TenantService: Send + Sync {
    async fn resolve_tenant(&self, id: &ScopeId) -> Result<Option<TenantRecord>, ServiceError>;
}

#[async_trait]
pub trait ProjectService: Send + Sync {
    async fn resolve_project(&self, id: &ScopeId) -> Result<Option<ProjectRecord>, ServiceError>;

    /// Whether `user` holds `permission` on `project`. `"access"` asks for
    /// any non-deny membership; other values are grant strings.
    async fn check_project_permission(
        &self,
        user: Uuid,
        project: &ScopeId,
        permission: &str,
    ) -> Result<bool, ServiceError>;

    /// Effective permissions of `user` within the tenant, narrowed to
    /// `project` when one is given
    async fn effective_permissions(
        &self,
        user: Uuid,
        tenant: &ScopeId,
        project: Option<&ScopeId>,
    ) -> Result<PermissionSet, ServiceError>;
}

/// Shared rule for `check_project_permission` implementations
pub(crate) fn permission_allows(set: &PermissionSet, permission: &str) -> bool {
    if permission == "access" {
        return set.role > Role::Deny;
    }
    match Grant::parse(permission) {
        Some(Grant::View(Target::Named(entity))) => set.can_view(&entity),
        Some(Grant::Broadcast(Target::Named(name))) => set.can_broadcast(&name),
        Some(Grant::Channel(name)) => set.can_use_channel(&name),
        Some(Grant::Elevate(Target::Named(table))) => set.is_elevated_for(&table),
        Some(grant) => set.role == Role::Root || set.grants.contains(&grant),
        None => false,
    }
}

/// A user's membership in one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub role: Role,
    pub grants: Vec<String>,
}

/// Combine a tenant-level role with an optional project membership.
///
/// Tenant-wide scope: the tenant role applies to every table, so `read` and
/// `edit` carry `view:*`. Project scope: tenant `root` and tenant `deny` win
/// outright; otherwise the membership's role and grants apply and a missing
/// membership is `deny`.
pub(crate) fn effective_set(tenant_role: Role, project: Option<Option<Membership>>) -> PermissionSet {
    match (tenant_role, project) {
        (Role::Deny, _) => PermissionSet::denied(),
        (Role::Root, _) => PermissionSet::new(Role::Root, Vec::new()),
        (role, None) => PermissionSet::new(role, vec![Grant::View(Target::Any)]),
        (_, Some(None)) => PermissionSet::denied(),
        (_, Some(Some(m))) => PermissionSet::from_strings(m.role, m.grants.iter().map(String::as_str)),
    }
}

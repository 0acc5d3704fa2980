//! Identity resolution: credential → tenant/project scoped permission context

pub mod scope;

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::permissions::grants::{PermissionSet, Role};
use crate::services::{AuthService, ProjectService, TenantService};
use scope::ScopeId;

/// A bearer token or an API key, never both
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Token(String),
    ApiKey(String),
}

impl Credential {
    /// Pick the credential to use. A non-empty token wins over an API key.
    pub fn from_parts(token: Option<&str>, api_key: Option<&str>) -> Result<Credential, GatewayError> {
        let non_empty = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

        if let Some(token) = non_empty(token) {
            return Ok(Credential::Token(token));
        }
        if let Some(key) = non_empty(api_key) {
            return Ok(Credential::ApiKey(key));
        }
        Err(GatewayError::missing_auth("Bearer token or API key required"))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Token(_) => "token",
            Credential::ApiKey(_) => "api_key",
        }
    }
}

// Keep secrets out of logs
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential::{}(***)", self.kind())
    }
}

/// Resolved identity of a caller, recomputed on every authenticate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermissionContext {
    pub user_id: Uuid,
    pub tenant_id: ScopeId,
    pub project_id: Option<ScopeId>,
    pub permission_set: PermissionSet,
}

impl PermissionContext {
    pub fn role(&self) -> Role {
        self.permission_set.role
    }
}

/// Turns credentials into permission contexts using the auth, tenant and
/// project services. Read-only.
#[derive(Clone)]
pub struct IdentityResolver {
    auth: Arc<dyn AuthService>,
    tenants: Arc<dyn TenantService>,
    projects: Arc<dyn ProjectService>,
}

impl IdentityResolver {
    pub fn new(
        auth: Arc<dyn AuthService>,
        tenants: Arc<dyn TenantService>,
        projects: Arc<dyn ProjectService>,
    ) -> Self {
        Self { auth, tenants, projects }
    }

    pub async fn resolve(&self, credential: &Credential) -> Result<PermissionContext, GatewayError> {
        let verified = match credential {
            Credential::Token(token) => self.auth.validate_token(token).await?,
            Credential::ApiKey(key) => self.auth.validate_api_key(key).await?,
        };

        let tenant_id = ScopeId::tenant(&verified.tenant).map_err(|e| {
            tracing::warn!("Credential for user {} carries malformed tenant claim: {}", verified.user_id, e);
            GatewayError::auth_failed("Credential carries an invalid tenant claim")
        })?;
        let project_id = verified
            .project
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(ScopeId::project)
            .transpose()
            .map_err(|e| {
                tracing::warn!("Credential for user {} carries malformed project claim: {}", verified.user_id, e);
                GatewayError::auth_failed("Credential carries an invalid project claim")
            })?;

        let tenant = self.tenants.resolve_tenant(&tenant_id).await?;
        match tenant {
            Some(t) if t.is_active => {}
            _ => {
                tracing::warn!("Tenant '{}' is not active or does not exist", tenant_id);
                return Err(GatewayError::tenant_access_denied("Tenant is not active or does not exist"));
            }
        }

        // Tenant-level decision first, so a project rejection is never
        // reported as a tenant one
        let mut permission_set = self.projects.effective_permissions(verified.user_id, &tenant_id, None).await?;
        if permission_set.role == Role::Deny {
            tracing::warn!("User {} has deny access in tenant '{}'", verified.user_id, tenant_id);
            return Err(GatewayError::tenant_access_denied("User access denied"));
        }

        if let Some(project_id) = &project_id {
            self.ensure_project_in_tenant(project_id, &tenant_id).await?;
            if !self.projects.check_project_permission(verified.user_id, project_id, "access").await? {
                tracing::warn!("User {} has no access to claimed project '{}'", verified.user_id, project_id);
                return Err(GatewayError::project_access_denied("User has no access to this project"));
            }
            permission_set = self
                .projects
                .effective_permissions(verified.user_id, &tenant_id, Some(project_id))
                .await?;
        }

        tracing::debug!(
            "Resolved {} for user {} in tenant '{}' with {} access",
            credential.kind(),
            verified.user_id,
            tenant_id,
            permission_set.role
        );

        Ok(PermissionContext { user_id: verified.user_id, tenant_id, project_id, permission_set })
    }

    /// Fail with PROJECT_ACCESS_DENIED unless `project` exists, is active and
    /// belongs to `tenant`
    pub async fn ensure_project_in_tenant(&self, project: &ScopeId, tenant: &ScopeId) -> Result<(), GatewayError> {
        match self.projects.resolve_project(project).await? {
            Some(p) if p.is_active && &p.tenant_id == tenant => Ok(()),
            Some(_) => {
                tracing::warn!("Project '{}' is inactive or outside tenant '{}'", project, tenant);
                Err(GatewayError::project_access_denied("Project is not accessible in this tenant"))
            }
            None => {
                tracing::warn!("Project '{}' does not exist", project);
                Err(GatewayError::project_access_denied("Project does not exist"))
            }
        }
    }

    pub fn projects(&self) -> &Arc<dyn ProjectService> {
        &self.projects
    }
}

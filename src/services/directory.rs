//! In-process tenant/project/API-key directory loaded from a YAML fixture.
//! Backs the memory store in development and the integration tests.
//!
//! ```yaml
//! tenants:
//!   - name: acme
//!     users:
//!       - { id: 6f1c1a8e-3a50-4d7e-9a4e-0b7c9b2f1a11, access: edit }
//! projects:
//!   - name: crm
//!     tenant: acme
//!     members:
//!       - { user: 6f1c1a8e-3a50-4d7e-9a4e-0b7c9b2f1a11, access: read, grants: ["view:activities"] }
//! api_keys:
//!   - { key: mk_dev_123, user: 6f1c1a8e-3a50-4d7e-9a4e-0b7c9b2f1a11, tenant: acme, project: crm }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use super::{
    effective_set, permission_allows, ApiKeyRecord, ApiKeyStore, Membership, ProjectRecord, ProjectService,
    ServiceError, TenantRecord, TenantService,
};
use crate::auth::hash_api_key;
use crate::identity::scope::{ScopeId, ScopeKind};
use crate::permissions::grants::{PermissionSet, Role};
use crate::permissions::policy::PolicyError;

fn active_default() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fixture {
    tenants: Vec<TenantFixture>,
    projects: Vec<ProjectFixture>,
    api_keys: Vec<ApiKeyFixture>,
}

#[derive(Debug, Deserialize)]
struct TenantFixture {
    name: String,
    #[serde(default = "active_default")]
    active: bool,
    #[serde(default)]
    users: Vec<UserFixture>,
}

#[derive(Debug, Deserialize)]
struct UserFixture {
    id: Uuid,
    access: Role,
}

#[derive(Debug, Deserialize)]
struct ProjectFixture {
    name: String,
    tenant: String,
    #[serde(default = "active_default")]
    active: bool,
    #[serde(default)]
    members: Vec<MemberFixture>,
}

#[derive(Debug, Deserialize)]
struct MemberFixture {
    user: Uuid,
    access: Role,
    #[serde(default)]
    grants: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiKeyFixture {
    key: String,
    user: Uuid,
    tenant: String,
    project: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    revoked: bool,
}

#[derive(Debug, Clone)]
struct TenantEntry {
    record: TenantRecord,
    users: HashMap<Uuid, Role>,
}

#[derive(Debug, Clone)]
struct ProjectEntry {
    record: ProjectRecord,
    members: HashMap<Uuid, Membership>,
}

/// Fixture-backed tenant, project and API key lookups
#[derive(Debug, Clone, Default)]
pub struct DirectoryService {
    tenants: HashMap<ScopeId, TenantEntry>,
    projects: HashMap<ScopeId, ProjectEntry>,
    api_keys: HashMap<String, ApiKeyRecord>,
}

impl DirectoryService {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PolicyError> {
        let fixture: Fixture = serde_yaml::from_str(yaml)?;
        Self::from_fixture(fixture)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|source| PolicyError::Io { path: path.display().to_string(), source })?;
        Self::from_yaml_str(&yaml)
    }

    /// Project keys hash the bare project name, so names must be unique
    /// across tenants. Duplicates are rejected rather than shadowed.
    fn from_fixture(fixture: Fixture) -> Result<Self, PolicyError> {
        let mut directory = Self::default();

        for t in fixture.tenants {
            let id = ScopeId::from_name(ScopeKind::Tenant, &t.name);
            if directory.tenants.contains_key(&id) {
                return Err(PolicyError::Duplicate { kind: "tenant", name: t.name });
            }
            let users = t.users.into_iter().map(|u| (u.id, u.access)).collect();
            directory.tenants.insert(
                id.clone(),
                TenantEntry { record: TenantRecord { id, name: t.name, is_active: t.active }, users },
            );
        }

        for p in fixture.projects {
            let id = ScopeId::from_name(ScopeKind::Project, &p.name);
            if let Some(existing) = directory.projects.get(&id) {
                tracing::error!(
                    "Project '{}' is declared in tenants '{}' and '{}'",
                    p.name,
                    existing.record.tenant_id,
                    p.tenant
                );
                return Err(PolicyError::Duplicate { kind: "project", name: p.name });
            }
            let tenant_id = ScopeId::from_name(ScopeKind::Tenant, &p.tenant);
            let members = p
                .members
                .into_iter()
                .map(|m| (m.user, Membership { role: m.access, grants: m.grants }))
                .collect();
            directory.projects.insert(
                id.clone(),
                ProjectEntry {
                    record: ProjectRecord { id, tenant_id, name: p.name, is_active: p.active },
                    members,
                },
            );
        }

        for k in fixture.api_keys {
            directory.api_keys.insert(
                hash_api_key(&k.key),
                ApiKeyRecord {
                    user_id: k.user,
                    tenant: format!("tenant_{}", k.tenant),
                    project: k.project.map(|p| format!("project_{}", p)),
                    expires_at: k.expires_at,
                    revoked: k.revoked,
                },
            );
        }

        tracing::info!(
            "Loaded directory with {} tenants, {} projects, {} api keys",
            directory.tenants.len(),
            directory.projects.len(),
            directory.api_keys.len()
        );
        Ok(directory)
    }

    fn tenant_role(&self, user: Uuid, tenant: &ScopeId) -> Role {
        self.tenants
            .get(tenant)
            .and_then(|t| t.users.get(&user).copied())
            .unwrap_or(Role::Deny)
    }
}

#[async_trait]
impl TenantService for DirectoryService {
    async fn resolve_tenant(&self, id: &ScopeId) -> Result<Option<TenantRecord>, ServiceError> {
        Ok(self.tenants.get(id).map(|t| t.record.clone()))
    }
}

#[async_trait]
impl ProjectService for DirectoryService {
    async fn resolve_project(&self, id: &ScopeId) -> Result<Option<ProjectRecord>, ServiceError> {
        Ok(self.projects.get(id).map(|p| p.record.clone()))
    }

    async fn check_project_permission(
        &self,
        user: Uuid,
        project: &ScopeId,
        permission: &str,
    ) -> Result<bool, ServiceError> {
        let Some(entry) = self.projects.get(project) else {
            return Ok(false);
        };
        let set = self.effective_permissions(user, &entry.record.tenant_id, Some(project)).await?;
        Ok(permission_allows(&set, permission))
    }

    async fn effective_permissions(
        &self,
        user: Uuid,
        tenant: &ScopeId,
        project: Option<&ScopeId>,
    ) -> Result<PermissionSet, ServiceError> {
        let membership = project.map(|p| self.projects.get(p).and_then(|e| e.members.get(&user).cloned()));
        Ok(effective_set(self.tenant_role(user, tenant), membership))
    }
}

#[async_trait]
impl ApiKeyStore for DirectoryService {
    async fn lookup(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, ServiceError> {
        Ok(self.api_keys.get(key_hash).cloned())
    }
}

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{effective_set, permission_allows, Membership, ProjectRecord, ProjectService, ServiceError};
use crate::database::DatabaseManager;
use crate::identity::scope::ScopeId;
use crate::permissions::grants::{PermissionSet, Role};

#[derive(Debug, sqlx::FromRow)]
struct ProjectRow {
    name: String,
    tenant_database: String,
    is_active: Option<bool>,
    trashed_at: Option<NaiveDateTime>,
}

/// Projects and memberships live in the system database; a user's
/// tenant-level access comes from the tenant database's `users` table.
pub struct PgProjectService {
    databases: DatabaseManager,
    main_pool: PgPool,
}

impl PgProjectService {
    pub fn new(databases: DatabaseManager, main_pool: PgPool) -> Self {
        Self { databases, main_pool }
    }

    async fn tenant_role(&self, user: Uuid, tenant: &ScopeId) -> Result<Role, ServiceError> {
        let pool = self.databases.tenant_pool(tenant).await?;

        let row = sqlx::query(
            r#"
            SELECT access
            FROM users
            WHERE id = $1
            AND trashed_at IS NULL
            AND deleted_at IS NULL
            "#,
        )
        .bind(user)
        .fetch_optional(&pool)
        .await?;

        let Some(row) = row else {
            tracing::debug!("User {} not found in tenant '{}'", user, tenant);
            return Ok(Role::Deny);
        };

        let access: String = row.try_get("access")?;
        Ok(Role::parse(&access).unwrap_or_else(|| {
            tracing::warn!("Unknown access level '{}' for user {}; treating as deny", access, user);
            Role::Deny
        }))
    }

    async fn membership(&self, user: Uuid, project: &ScopeId) -> Result<Option<Membership>, ServiceError> {
        let row = sqlx::query("SELECT access, grants FROM project_members WHERE project_key = $1 AND user_id = $2")
            .bind(project.as_str())
            .bind(user)
            .fetch_optional(&self.main_pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let access: String = row.try_get("access")?;
        let grants: Option<Vec<String>> = row.try_get("grants")?;

        Ok(Some(Membership { role: Role::parse(&access).unwrap_or(Role::Deny), grants: grants.unwrap_or_default() }))
    }
}

#[async_trait]
impl ProjectService for PgProjectService {
    async fn resolve_project(&self, id: &ScopeId) -> Result<Option<ProjectRecord>, ServiceError> {
        let row: Option<ProjectRow> = sqlx::query_as(
            r#"
            SELECT name, tenant_database, is_active, trashed_at
            FROM projects
            WHERE project_key = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.main_pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        // tenant_database is `tenant_<short id>`
        let tenant_id = row
            .tenant_database
            .strip_prefix("tenant_")
            .and_then(|short| ScopeId::tenant(short).ok())
            .ok_or_else(|| {
                ServiceError::Unavailable(format!(
                    "Project '{}' references malformed tenant database '{}'",
                    id, row.tenant_database
                ))
            })?;

        Ok(Some(ProjectRecord {
            id: id.clone(),
            tenant_id,
            name: row.name,
            is_active: row.is_active.unwrap_or(false) && row.trashed_at.is_none(),
        }))
    }

    async fn check_project_permission(
        &self,
        user: Uuid,
        project: &ScopeId,
        permission: &str,
    ) -> Result<bool, ServiceError> {
        let Some(record) = self.resolve_project(project).await? else {
            return Ok(false);
        };
        let set = self.effective_permissions(user, &record.tenant_id, Some(project)).await?;
        Ok(permission_allows(&set, permission))
    }

    async fn effective_permissions(
        &self,
        user: Uuid,
        tenant: &ScopeId,
        project: Option<&ScopeId>,
    ) -> Result<PermissionSet, ServiceError> {
        let tenant_role = self.tenant_role(user, tenant).await?;

        let membership = match project {
            Some(project) if matches!(tenant_role, Role::Read | Role::Edit | Role::Full) => {
                Some(self.membership(user, project).await?)
            }
            // Outcome is fixed by the tenant role; skip the lookup
            Some(_) => Some(None),
            None => None,
        };

        Ok(effective_set(tenant_role, membership))
    }
}

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::PgPool;

use super::{ServiceError, TenantRecord, TenantService};
use crate::identity::scope::ScopeId;

#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    name: String,
    is_active: Option<bool>,
    trashed_at: Option<NaiveDateTime>,
}

/// Tenant lookups against the `tenants` table of the system database.
/// A tenant's `database` column holds `tenant_<short id>`.
pub struct PgTenantService {
    main_pool: PgPool,
}

impl PgTenantService {
    pub fn new(main_pool: PgPool) -> Self {
        Self { main_pool }
    }
}

#[async_trait]
impl TenantService for PgTenantService {
    async fn resolve_tenant(&self, id: &ScopeId) -> Result<Option<TenantRecord>, ServiceError> {
        let row: Option<TenantRow> = sqlx::query_as(
            r#"
            SELECT name, is_active, trashed_at
            FROM tenants
            WHERE database = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id.database_name())
        .fetch_optional(&self.main_pool)
        .await?;

        Ok(row.map(|r| TenantRecord {
            id: id.clone(),
            name: r.name,
            // Trashed tenants are kept for restore but cannot be used
            is_active: r.is_active.unwrap_or(false) && r.trashed_at.is_none(),
        }))
    }
}

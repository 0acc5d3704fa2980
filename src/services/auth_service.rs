use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use uuid::Uuid;

use super::{AuthService, ServiceError, VerifiedCredential};
use crate::auth::{decode_jwt, hash_api_key, JwtError};

/// Stored API key, looked up by the sha256 of the presented key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRecord {
    pub user_id: Uuid,
    pub tenant: String,
    pub project: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn lookup(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, ServiceError>;
}

/// Validates HS256 session tokens locally and API keys against a key store
pub struct JwtAuthService {
    secret: String,
    api_keys: Arc<dyn ApiKeyStore>,
}

impl JwtAuthService {
    pub fn new(secret: impl Into<String>, api_keys: Arc<dyn ApiKeyStore>) -> Self {
        Self { secret: secret.into(), api_keys }
    }
}

#[async_trait]
impl AuthService for JwtAuthService {
    async fn validate_token(&self, token: &str) -> Result<VerifiedCredential, ServiceError> {
        let claims = decode_jwt(&self.secret, token).map_err(|e| match e {
            JwtError::InvalidSecret => ServiceError::Unavailable("JWT secret is not configured".into()),
            other => ServiceError::Rejected(other.to_string()),
        })?;

        Ok(VerifiedCredential { user_id: claims.user_id, tenant: claims.tenant, project: claims.project })
    }

    async fn validate_api_key(&self, key: &str) -> Result<VerifiedCredential, ServiceError> {
        let record = self
            .api_keys
            .lookup(&hash_api_key(key))
            .await?
            .ok_or_else(|| ServiceError::Rejected("Unknown API key".into()))?;

        if record.revoked {
            return Err(ServiceError::Rejected("API key has been revoked".into()));
        }
        if record.expires_at.is_some_and(|at| at <= Utc::now()) {
            return Err(ServiceError::Rejected("API key has expired".into()));
        }

        Ok(VerifiedCredential { user_id: record.user_id, tenant: record.tenant, project: record.project })
    }
}

/// `api_keys` table in the system database
pub struct PgApiKeyStore {
    main_pool: PgPool,
}

impl PgApiKeyStore {
    pub fn new(main_pool: PgPool) -> Self {
        Self { main_pool }
    }
}

#[async_trait]
impl ApiKeyStore for PgApiKeyStore {
    async fn lookup(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, ServiceError> {
        let row = sqlx::query(
            "SELECT user_id, tenant, project, expires_at, revoked_at IS NOT NULL AS revoked \
             FROM api_keys WHERE key_hash = $1",
        )
        .bind(key_hash)
        .fetch_optional(&self.main_pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ApiKeyRecord {
            user_id: row.try_get("user_id")?,
            tenant: row.try_get("tenant")?,
            project: row.try_get("project")?,
            expires_at: row.try_get("expires_at")?,
            revoked: row.try_get("revoked")?,
        }))
    }
}

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Claims carried by platform-issued session tokens. `tenant` and `project`
/// may be in either long or short encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub tenant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub user: String,
    pub user_id: Uuid,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(tenant: String, project: Option<String>, user: String, user_id: Uuid, expiry: Duration) -> Self {
        let now = Utc::now();

        Self {
            tenant,
            project,
            user,
            user_id,
            exp: (now + expiry).timestamp(),
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug)]
pub enum JwtError {
    TokenGeneration(String),
    InvalidToken(String),
    InvalidSecret,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::TokenGeneration(msg) => write!(f, "JWT generation error: {}", msg),
            JwtError::InvalidToken(msg) => write!(f, "Invalid JWT: {}", msg),
            JwtError::InvalidSecret => write!(f, "Invalid JWT secret"),
        }
    }
}

impl std::error::Error for JwtError {}

pub fn generate_jwt(secret: &str, claims: &Claims) -> Result<String, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    let header = Header::default();

    encode(&header, claims, &encoding_key).map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

/// Verify signature and expiry (HS256)
pub fn decode_jwt(secret: &str, token: &str) -> Result<Claims, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| JwtError::InvalidToken(e.to_string()))
}

/// API keys are stored hashed; lookups go by this digest
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(expiry: Duration) -> Claims {
        Claims::new("tenant_acme".into(), Some("project_crm".into()), "alice".into(), Uuid::new_v4(), expiry)
    }

    #[test]
    fn decodes_what_it_encodes() {
        let original = claims(Duration::hours(1));
        let token = generate_jwt("secret", &original).unwrap();
        let decoded = decode_jwt("secret", &token).unwrap();
        assert_eq!(decoded.user_id, original.user_id);
        assert_eq!(decoded.project.as_deref(), Some("project_crm"));
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = generate_jwt("secret", &claims(Duration::hours(1))).unwrap();
        assert!(matches!(decode_jwt("other", &token), Err(JwtError::InvalidToken(_))));
    }

    #[test]
    fn rejects_expired_token() {
        let token = generate_jwt("secret", &claims(Duration::hours(-2))).unwrap();
        assert!(decode_jwt("secret", &token).is_err());
    }

    #[test]
    fn empty_secret_is_refused() {
        assert!(matches!(generate_jwt("", &claims(Duration::hours(1))), Err(JwtError::InvalidSecret)));
        assert!(matches!(decode_jwt("", "x.y.z"), Err(JwtError::InvalidSecret)));
    }

    #[test]
    fn api_key_hash_is_stable_hex() {
        let h = hash_api_key("mk_live_123");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_api_key("mk_live_123"));
        assert_ne!(h, hash_api_key("mk_live_124"));
    }
}

use axum::http::HeaderMap;

/// Credentials presented in request headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderCredentials {
    pub token: Option<String>,
    pub api_key: Option<String>,
}

impl HeaderCredentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self { token: extract_bearer_token(headers), api_key: extract_api_key(headers) }
    }

    /// Header values win over body values, field by field
    pub fn overlay(self, body_token: Option<String>, body_api_key: Option<String>) -> (Option<String>, Option<String>) {
        (self.token.or(body_token), self.api_key.or(body_api_key))
    }
}

/// Extract the token from `Authorization: Bearer <token>`. Other schemes are ignored.
fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_str = headers.get("authorization")?.to_str().ok()?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .or_else(|| auth_str.strip_prefix("bearer "))?
        .trim();

    (!token.is_empty()).then(|| token.to_string())
}

fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    let key = headers.get("x-api-key")?.to_str().ok()?.trim();
    (!key.is_empty()).then(|| key.to_string())
}

// Gateway Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::fmt;

use crate::registry::RegistryError;
use crate::services::ServiceError;

/// Machine-readable error codes returned to the transport process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // 400 Bad Request
    MissingFields,

    // 401 Unauthorized
    MissingAuth,
    AuthFailed,

    // 403 Forbidden
    TenantAccessDenied,
    ProjectAccessDenied,
    AccessDenied,
    RowAccessDenied,

    // 404 Not Found
    ConnectionNotFound,

    // 409 Conflict
    SubscriptionFailed,

    // 500 Internal Server Error
    ConnectionFailed,
    InternalError,
}

impl ErrorKind {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::MissingFields => 400,
            ErrorKind::MissingAuth => 401,
            ErrorKind::AuthFailed => 401,
            ErrorKind::TenantAccessDenied => 403,
            ErrorKind::ProjectAccessDenied => 403,
            ErrorKind::AccessDenied => 403,
            ErrorKind::RowAccessDenied => 403,
            ErrorKind::ConnectionNotFound => 404,
            ErrorKind::SubscriptionFailed => 409,
            ErrorKind::ConnectionFailed => 500,
            ErrorKind::InternalError => 500,
        }
    }

    /// Get error code for client handling
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::MissingFields => "MISSING_FIELDS",
            ErrorKind::MissingAuth => "MISSING_AUTH",
            ErrorKind::AuthFailed => "AUTH_FAILED",
            ErrorKind::TenantAccessDenied => "TENANT_ACCESS_DENIED",
            ErrorKind::ProjectAccessDenied => "PROJECT_ACCESS_DENIED",
            ErrorKind::AccessDenied => "ACCESS_DENIED",
            ErrorKind::RowAccessDenied => "ROW_ACCESS_DENIED",
            ErrorKind::ConnectionNotFound => "CONNECTION_NOT_FOUND",
            ErrorKind::SubscriptionFailed => "SUBSCRIPTION_FAILED",
            ErrorKind::ConnectionFailed => "CONNECTION_FAILED",
            ErrorKind::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Only transient faults are worth retrying; everything else is a policy decision
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::InternalError | ErrorKind::ConnectionFailed)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned by every gateway operation, with a client-safe message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    kind: ErrorKind,
    message: String,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "success": false,
            "error": true,
            "message": self.message,
            "code": self.kind.code(),
            "retryable": self.kind.is_retryable(),
        })
    }
}

// Static constructor methods
impl GatewayError {
    pub fn missing_fields(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingFields, message)
    }

    pub fn missing_auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingAuth, message)
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthFailed, message)
    }

    pub fn tenant_access_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TenantAccessDenied, message)
    }

    pub fn project_access_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProjectAccessDenied, message)
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AccessDenied, message)
    }

    pub fn row_access_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RowAccessDenied, message)
    }

    pub fn connection_not_found(connection_id: impl fmt::Display) -> Self {
        Self::new(ErrorKind::ConnectionNotFound, format!("Connection '{}' not found", connection_id))
    }

    pub fn subscription_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SubscriptionFailed, message)
    }

    /// Log the underlying detail and return a generic retryable error
    pub fn connection_failed(detail: impl fmt::Display) -> Self {
        tracing::error!("Connection registration failed: {}", detail);
        Self::new(ErrorKind::ConnectionFailed, "Failed to register connection")
    }

    /// Log the underlying detail and return a generic internal error
    pub fn internal(detail: impl fmt::Display) -> Self {
        tracing::error!("Internal gateway error: {}", detail);
        Self::new(ErrorKind::InternalError, "An error occurred while processing your request")
    }
}

impl From<RegistryError> for GatewayError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => GatewayError::connection_not_found(id),
            RegistryError::NotConnected { id, status } => GatewayError::subscription_failed(format!(
                "Connection '{}' is {} and cannot subscribe",
                id, status
            )),
            other => GatewayError::internal(other),
        }
    }
}

impl From<ServiceError> for GatewayError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Rejected(msg) => {
                tracing::warn!("Credential rejected: {}", msg);
                GatewayError::auth_failed("Invalid or expired credential")
            }
            other => GatewayError::internal(other),
        }
    }
}

// Standard error trait implementations
impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for GatewayError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn codes_and_statuses() {
        let err = GatewayError::tenant_access_denied("nope");
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.to_json()["code"], "TENANT_ACCESS_DENIED");
        assert_eq!(GatewayError::missing_auth("x").status_code(), 401);
        assert_eq!(GatewayError::connection_not_found("abc").status_code(), 404);
        assert_eq!(GatewayError::missing_fields("x").status_code(), 400);
    }

    #[test]
    fn only_transient_faults_are_retryable() {
        assert!(ErrorKind::InternalError.is_retryable());
        assert!(ErrorKind::ConnectionFailed.is_retryable());
        assert!(!ErrorKind::AuthFailed.is_retryable());
        assert!(!ErrorKind::RowAccessDenied.is_retryable());
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = GatewayError::internal("password authentication failed for user postgres");
        assert_eq!(err.kind(), ErrorKind::InternalError);
        assert!(!err.message().contains("postgres"));
    }

    #[test]
    fn registry_not_found_maps_to_connection_not_found() {
        let id = Uuid::new_v4();
        let err: GatewayError = RegistryError::NotFound(id).into();
        assert_eq!(err.kind(), ErrorKind::ConnectionNotFound);
        assert!(err.message().contains(&id.to_string()));
    }

    #[test]
    fn rejected_credentials_map_to_auth_failed() {
        let err: GatewayError = ServiceError::Rejected("expired".into()).into();
        assert_eq!(err.kind(), ErrorKind::AuthFailed);
        let err: GatewayError = ServiceError::Unavailable("down".into()).into();
        assert_eq!(err.kind(), ErrorKind::InternalError);
    }
}

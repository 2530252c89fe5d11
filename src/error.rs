// Tenant routing errors and their HTTP mapping
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use thiserror::Error;

/// Failure kinds surfaced by the tenant routing core.
///
/// Cloneable so one in-flight pool creation can hand the same outcome to
/// every request waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TenantError {
    #[error("Request host does not name a tenant")]
    NotATenantRequest,

    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Tenant registry unavailable: {0}")]
    RegistryUnavailable(String),

    // No detail: a corrupt token and a wrong key look the same.
    #[error("Tenant credentials could not be decrypted")]
    CredentialDecryptionFailed,

    #[error("Tenant connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("Tenant pool creation failed: {0}")]
    PoolCreationFailed(String),
}

impl TenantError {
    /// Whether the client should be told to retry later rather than being denied.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TenantError::RegistryUnavailable(_) | TenantError::PoolCreationFailed(_)
        )
    }

    /// Stable machine-readable kind, safe to expose to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            TenantError::NotATenantRequest => "NOT_A_TENANT_REQUEST",
            TenantError::TenantNotFound(_) => "TENANT_NOT_FOUND",
            TenantError::RegistryUnavailable(_) => "REGISTRY_UNAVAILABLE",
            TenantError::CredentialDecryptionFailed => "CREDENTIAL_DECRYPTION_FAILED",
            TenantError::ConnectionUnavailable(_) => "CONNECTION_UNAVAILABLE",
            TenantError::PoolCreationFailed(_) => "POOL_CREATION_FAILED",
        }
    }
}

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden { message: String, code: &'static str },

    // 404 Not Found
    NotFound(String),

    // 503 Service Unavailable
    ServiceUnavailable { message: String, code: &'static str },
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden { message, .. } => message,
            ApiError::NotFound(msg) => msg,
            ApiError::ServiceUnavailable { message, .. } => message,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden { code, .. } => code,
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::ServiceUnavailable { code, .. } => code,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            message: message.into(),
            code: "FORBIDDEN",
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }
}

impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        // Never echo the underlying reason; it is logged where it happened.
        if err.is_transient() {
            ApiError::ServiceUnavailable {
                message: "Tenant temporarily unavailable, please retry later".to_string(),
                code: err.kind(),
            }
        } else {
            ApiError::Forbidden {
                message: "Access denied".to_string(),
                code: err.kind(),
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_map_to_service_unavailable() {
        for err in [
            TenantError::RegistryUnavailable("timeout".into()),
            TenantError::PoolCreationFailed("refused".into()),
        ] {
            let api: ApiError = err.into();
            assert_eq!(api.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    #[test]
    fn rejection_kinds_map_to_forbidden_without_detail() {
        let api: ApiError = TenantError::TenantNotFound("acme".into()).into();
        assert_eq!(api.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(api.error_code(), "TENANT_NOT_FOUND");
        assert!(!api.message().contains("acme"));

        let api: ApiError = TenantError::ConnectionUnavailable("pool exhausted".into()).into();
        assert_eq!(api.status_code(), StatusCode::FORBIDDEN);
        assert!(!api.message().contains("exhausted"));

        let api: ApiError = TenantError::CredentialDecryptionFailed.into();
        assert_eq!(api.status_code(), StatusCode::FORBIDDEN);
    }
}

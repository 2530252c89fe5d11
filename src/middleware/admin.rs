use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

use crate::app::AppState;
use crate::database::connector::PoolConnector;
use crate::error::ApiError;

/// Guards the operator endpoints under `/api/root`.
///
/// Requires `Authorization: Bearer <ADMIN_API_TOKEN>`. With no token
/// configured every request is refused.
pub async fn admin_auth_middleware<C: PoolConnector>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if state.admin_token.is_empty() {
        tracing::warn!("Admin endpoint called but no admin token is configured");
        return ApiError::forbidden("Admin API disabled").into_response();
    }

    let token = match extract_bearer_token(&headers) {
        Ok(token) => token,
        Err(msg) => return ApiError::unauthorized(msg).into_response(),
    };

    if !constant_time_eq(token.as_bytes(), state.admin_token.expose().as_bytes()) {
        tracing::warn!("Rejected admin request with invalid token");
        return ApiError::unauthorized("Invalid admin token").into_response();
    }

    next.run(request).await
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    let auth_str = headers
        .get("authorization")
        .ok_or("Missing Authorization header")?
        .to_str()
        .map_err(|_| "Invalid Authorization header format")?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        Some(_) => Err("Empty bearer token"),
        None => Err("Authorization header must use Bearer token format"),
    }
}

/// Compare fixed-size digests so neither the contents nor the length of the
/// expected token shows up in timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let (a, b) = (Sha256::digest(a), Sha256::digest(b));
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_auth(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(extract_bearer_token(&with_auth("Bearer s3cret")), Ok("s3cret"));
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        assert!(extract_bearer_token(&HeaderMap::new()).is_err());
        assert!(extract_bearer_token(&with_auth("Basic abc")).is_err());
        assert!(extract_bearer_token(&with_auth("Bearer   ")).is_err());
    }

    #[test]
    fn compares_tokens_exactly() {
        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"tokem"));
        assert!(!constant_time_eq(b"token", b"token2"));
    }

    #[test]
    fn tokens_of_any_length_compare_without_matching_prefixes() {
        assert!(!constant_time_eq(b"", b"admin-test-token"));
        assert!(!constant_time_eq(b"admin", b"admin-test-token"));
        assert!(!constant_time_eq(b"admin-test-token-and-more", b"admin-test-token"));
        assert!(constant_time_eq(b"", b""));
    }
}

//! # Authentication Module
//!
//! Bearer API key for the Catty HTTP API.
//!
//! When `CATTY_API_KEY` is set and non-empty, every route except `/health`
//! requires `Authorization: Bearer <key>`. Unset means open access.

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "CATTY_API_KEY";

/// Routes reachable without a key.
const PUBLIC_PATHS: &[&str] = &["/health"];

/// The configured API key, `None` if authentication is off.
pub fn get_api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
}

/// Compare two keys in time independent of where they differ.
///
/// Both sides are padded to a common length first so the comparison covers
/// the same number of bytes whatever the provided length.
pub fn keys_match(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    let len = provided.len().max(expected.len());
    let mut a = vec![0u8; len];
    let mut b = vec![0u8; len];
    a[..provided.len()].copy_from_slice(provided);
    b[..expected.len()].copy_from_slice(expected);
    let same_bytes: bool = a.ct_eq(&b).into();
    same_bytes && provided.len() == expected.len()
}

/// API key authentication middleware.
pub async fn api_key_auth_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    let Some(expected) = get_api_key_from_env() else {
        return Ok(next.run(request).await);
    };
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim());

    match provided {
        Some(key) if keys_match(key, &expected) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!(
                event = "auth_failure",
                reason = "invalid_api_key",
                path = %request.uri().path(),
                "Authentication failed: invalid API key"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                path = %request.uri().path(),
                "Missing Authorization header"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_comparison() {
        assert!(keys_match("secret", "secret"));
        assert!(!keys_match("secret", "secreT"));
        assert!(!keys_match("secret", "secret2"));
        assert!(!keys_match("", "secret"));
    }
}

//! Bearer-token authentication.
//!
//! Tokens are issued by the external identity provider; this service only
//! verifies them (HS256, shared secret) and reads the subject as user id.

use crate::api::{AppState, ErrorBody};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    Json,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Claims we rely on from the identity provider's token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: Option<String>,
    pub exp: usize,
}

/// Authenticated caller.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.validate_aud = false;

    decode::<Claims>(token, &key, &validation).map(|data| data.claims)
}

pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

type Rejection = (StatusCode, Json<ErrorBody>);

fn reject(error: &str, message: &str) -> Rejection {
    (StatusCode::UNAUTHORIZED, Json(ErrorBody::new(error, message)))
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = Rejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| reject("unauthorized", "Missing Authorization header"))?;

        let token = extract_bearer_token(auth_header)
            .ok_or_else(|| reject("unauthorized", "Authorization header must be 'Bearer <token>'"))?;

        let secret = state
            .config
            .jwt_secret
            .as_deref()
            .ok_or_else(|| reject("unauthorized", "Token verification is not configured"))?;

        let claims = verify_token(token, secret).map_err(|e| {
            warn!("⚠️ Auth failed: {}", e);
            reject("invalid_token", "Invalid or expired token")
        })?;

        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{far_future, token_for};
    use super::*;

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer_token("Bearer   "), None);
        assert_eq!(extract_bearer_token("Basic abc"), None);
    }

    #[test]
    fn test_verify_round_trip() {
        let token = token_for("user-1", "secret", far_future());
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn test_wrong_secret_and_expired_are_rejected() {
        let token = token_for("user-1", "secret", far_future());
        assert!(verify_token(&token, "other").is_err());

        let expired = token_for("user-1", "secret", 1_000);
        assert!(verify_token(&expired, "secret").is_err());
    }
}

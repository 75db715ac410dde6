use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::services::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    /// User id; scopes remote attempts and owns sessions.
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

impl JwtClaims {
    pub fn for_user(user_id: impl Into<String>, ttl_seconds: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.into(),
            exp: (now + ttl_seconds).max(0) as usize,
            iat: now.max(0) as usize,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    ExpiredToken,
    #[error("Invalid token signature")]
    InvalidSignature,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn generate_token(&self, claims: &JwtClaims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding_key).map_err(|_| AuthError::InvalidToken)
    }

    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidToken,
            })
    }
}

/// Validates the bearer token and stores its claims in request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let jwt_service = JwtService::new(&state.config.jwt_secret);
    let claims = jwt_service.validate_token(token).map_err(|e| {
        tracing::warn!("JWT validation failed: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    tracing::debug!("Authenticated user: {}", claims.sub);

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

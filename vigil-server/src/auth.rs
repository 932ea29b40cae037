//! Bearer session tokens.
//!
//! Sessions are HS256 JWTs signed with `SESSION_JWT_SECRET`; the `sub` claim
//! is the actor id. Issuing tokens is the identity provider's job, so
//! `issue_session_token` exists for tests and local tooling.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ModerationError;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    exp: u64,
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
}

/// Verify the `Authorization: Bearer <jwt>` header.
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<Actor, ModerationError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = match auth_header {
        Some(value) if value.starts_with("Bearer ") => &value[7..],
        Some(_) => {
            return Err(ModerationError::Unauthenticated(
                "Invalid Authorization header format. Expected: Bearer <token>".to_string(),
            ))
        }
        None => {
            return Err(ModerationError::Unauthenticated(
                "Missing Authorization header".to_string(),
            ))
        }
    };

    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        warn!("Rejected session token: {}", e);
        ModerationError::Unauthenticated("Invalid session token".to_string())
    })?;

    if data.claims.sub.trim().is_empty() {
        return Err(ModerationError::Unauthenticated(
            "Session token has no subject".to_string(),
        ));
    }

    Ok(Actor {
        id: data.claims.sub,
    })
}

/// Sign a session token for `actor_id` valid for `ttl_secs`.
pub fn issue_session_token(
    secret: &str,
    actor_id: &str,
    ttl_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    let claims = SessionClaims {
        sub: actor_id.to_string(),
        exp: now + ttl_secs,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Actor {
    type Rejection = ModerationError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authenticate(&parts.headers, &state.session_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret";

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_valid_token_yields_subject() {
        let token = issue_session_token(SECRET, "alice", 60).unwrap();
        let actor = authenticate(&bearer(&token), SECRET).unwrap();
        assert_eq!(actor.id, "alice");
    }

    #[test]
    fn test_missing_header() {
        let err = authenticate(&HeaderMap::new(), SECRET).unwrap_err();
        assert!(matches!(err, ModerationError::Unauthenticated(_)));
    }

    #[test]
    fn test_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        let err = authenticate(&headers, SECRET).unwrap_err();
        assert!(matches!(err, ModerationError::Unauthenticated(_)));
    }

    #[test]
    fn test_wrong_secret() {
        let token = issue_session_token("other-secret", "alice", 60).unwrap();
        let err = authenticate(&bearer(&token), SECRET).unwrap_err();
        assert!(matches!(err, ModerationError::Unauthenticated(_)));
    }

    #[test]
    fn test_expired_token() {
        let claims = SessionClaims {
            sub: "alice".to_string(),
            exp: 1_000,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        let err = authenticate(&bearer(&token), SECRET).unwrap_err();
        assert!(matches!(err, ModerationError::Unauthenticated(_)));
    }

    #[test]
    fn test_empty_subject_rejected() {
        let token = issue_session_token(SECRET, "  ", 60).unwrap();
        let err = authenticate(&bearer(&token), SECRET).unwrap_err();
        assert!(matches!(err, ModerationError::Unauthenticated(_)));
    }
}

//! Identity assertions.
//!
//! The hub never checks credentials. The authentication collaborator
//! issues an HS256-signed identity token; the hub only verifies the
//! signature with the shared secret and trusts the `sub` claim.

use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Claims carried by an identity token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// User id, as known to the persistence collaborator.
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Verify a token and return its claims.
pub fn verify_identity_token(
    secret: &[u8],
    token: &str,
) -> Result<IdentityClaims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    let token_data = decode::<IdentityClaims>(
        token,
        &DecodingKey::from_secret(secret),
        &validation,
    )?;
    Ok(token_data.claims)
}

/// Mint a token in the auth collaborator's format. Used by local tooling
/// and the integration tests, which stand in for the auth service.
pub fn issue_identity_token(
    secret: &[u8],
    user_id: &str,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = IdentityClaims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + ttl_secs,
    };
    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Resolve the shared secret from config. An empty configured value gets an
/// ephemeral random secret, which only works when the auth collaborator is
/// this process's own test tooling.
pub fn secret_from_config(configured: &str) -> Vec<u8> {
    if configured.is_empty() {
        tracing::warn!(
            "no identity secret configured, generating an ephemeral one; \
             tokens from the auth service will not verify"
        );
        let secret: [u8; 32] = rand::rng().random();
        secret.to_vec()
    } else {
        configured.as_bytes().to_vec()
    }
}

/// Verified identity extracted from the Authorization: Bearer header.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
}

/// Shared secret stored in request extensions for the Identity extractor.
#[derive(Clone)]
pub struct IdentitySecret(pub Vec<u8>);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = crate::error::HubError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        use crate::error::HubError;

        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(HubError::Unauthorized)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(HubError::Unauthorized)?;

        let secret = parts.extensions.get::<IdentitySecret>().ok_or_else(|| {
            HubError::Internal("identity secret missing from request extensions".to_string())
        })?;

        let claims =
            verify_identity_token(&secret.0, token).map_err(|_| HubError::Unauthorized)?;

        Ok(Identity {
            user_id: claims.sub,
        })
    }
}

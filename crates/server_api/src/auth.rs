use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::{
    domain::OrganizationId,
    error::{ApiError, ErrorCode},
};

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub issuer: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Who is calling: the authenticated user and the organization whose draft they edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub org_id: OrganizationId,
}

pub fn mint_token(
    cfg: &AuthConfig,
    user_id: &str,
    org_id: Option<&OrganizationId>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::seconds(cfg.ttl_seconds);
    let claims = Claims {
        iss: cfg.issuer.clone(),
        sub: user_id.to_string(),
        org: org_id.map(|org| org.as_str().to_string()),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(cfg.secret.as_bytes()),
    )
}

/// Checks signature, issuer and expiry, then pulls the caller out of the claims.
pub fn verify_token(cfg: &AuthConfig, token: &str) -> Result<Identity, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[cfg.issuer.as_str()]);

    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.secret.as_bytes()),
        &validation,
    )
    .map_err(|_| ApiError::new(ErrorCode::Unauthorized, "invalid or expired credentials"))?;

    let claims = decoded.claims;
    let org_id = claims
        .org
        .filter(|org| !org.trim().is_empty())
        .ok_or_else(|| {
            ApiError::new(
                ErrorCode::Unauthorized,
                "missing claims info, try logging out and logging back in",
            )
        })?;

    Ok(Identity {
        user_id: claims.sub,
        org_id: OrganizationId(org_id),
    })
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;

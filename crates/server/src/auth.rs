use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    Json,
};
use server_api::auth::{verify_token, Identity};
use shared::error::{ApiError, ErrorCode};
use tracing::debug;

use crate::{app_state::AppState, status_for};

/// Caller identity taken from the `Authorization: Bearer` header.
pub(crate) struct Authenticated(pub(crate) Identity);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                let err = ApiError::new(
                    ErrorCode::Unauthorized,
                    "this endpoint requires authentication",
                );
                (status_for(err.code), Json(err))
            })?;

        let identity = verify_token(&state.auth, token).map_err(|err| {
            debug!(error = %err, "bearer token rejected");
            (status_for(err.code), Json(err))
        })?;
        Ok(Self(identity))
    }
}

use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use server_api::{
    auth::AuthConfig, fetch_step, registration_status, reset_draft, submit_registration,
    upsert_step, ApiContext, LocalRegistrar,
};
use shared::{
    domain::{Network, StepScope},
    error::{ApiError, ErrorCode},
    protocol::{
        certificate_step_route, registration_status_route, RegisterReply, RegisterRequest,
        RegistrationStatus, StepReply, StepRequest, MAX_UPLOAD_BYTES,
    },
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

mod app_state;
mod auth;
mod config;

use app_state::AppState;
use auth::Authenticated;
use config::{load_settings, prepare_database_url};

/// Room for the `{step, form}` envelope around a maximal upload.
const MAX_REQUEST_BYTES: usize = 2 * MAX_UPLOAD_BYTES;

type ApiRejection = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
struct StepKeyQuery {
    key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let registrar = LocalRegistrar {
        testnet_directory: settings.testnet_directory,
        mainnet_directory: settings.mainnet_directory,
    };
    let api = ApiContext::new(storage, Arc::new(registrar));
    let auth = AuthConfig {
        secret: settings.auth_secret,
        issuer: settings.auth_issuer,
        ttl_seconds: settings.auth_ttl_seconds,
    };

    let state = AppState { api, auth };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            certificate_step_route(),
            get(http_load_step)
                .post(http_save_step)
                .delete(http_reset_step),
        )
        .route("/register/:network", post(http_register))
        .route(registration_status_route(), get(http_registration_status))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .with_state(state)
}

pub(crate) fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> ApiRejection {
    if err.code == ErrorCode::Internal {
        error!(error = %err.message, "request failed");
    }
    (status_for(err.code), Json(err))
}

fn parse_scope(raw: Option<&str>) -> Result<StepScope, ApiRejection> {
    raw.unwrap_or_default()
        .parse::<StepScope>()
        .map_err(|err| reject(ApiError::new(ErrorCode::Validation, err.to_string())))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state.api.storage.health_check().await.map_err(|error| {
        warn!(%error, "health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok("ok")
}

async fn http_load_step(
    State(state): State<Arc<AppState>>,
    Authenticated(identity): Authenticated,
    Query(q): Query<StepKeyQuery>,
) -> Result<Json<StepReply>, ApiRejection> {
    let scope = parse_scope(q.key.as_deref())?;
    let reply = fetch_step(&state.api, &identity.org_id, scope)
        .await
        .map_err(reject)?;
    Ok(Json(reply))
}

async fn http_save_step(
    State(state): State<Arc<AppState>>,
    Authenticated(identity): Authenticated,
    body: Bytes,
) -> Result<Json<StepReply>, ApiRejection> {
    let request: StepRequest = serde_json::from_slice(&body).map_err(|e| {
        reject(ApiError::new(
            ErrorCode::Validation,
            format!("could not parse registration form: {e}"),
        ))
    })?;
    let reply = upsert_step(&state.api, &identity.org_id, request)
        .await
        .map_err(reject)?;
    Ok(Json(reply))
}

async fn http_reset_step(
    State(state): State<Arc<AppState>>,
    Authenticated(identity): Authenticated,
    Query(q): Query<StepKeyQuery>,
) -> Result<Json<StepReply>, ApiRejection> {
    let scope = parse_scope(q.key.as_deref())?;
    let reply = reset_draft(&state.api, &identity.org_id, Some(scope))
        .await
        .map_err(reject)?;
    Ok(Json(reply))
}

async fn http_register(
    State(state): State<Arc<AppState>>,
    Authenticated(identity): Authenticated,
    Path(network): Path<String>,
    body: Bytes,
) -> Result<Json<RegisterReply>, ApiRejection> {
    let network = network
        .parse::<Network>()
        .map_err(|err| reject(ApiError::new(ErrorCode::NotFound, err.to_string())))?;
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RegisterRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            reject(ApiError::new(
                ErrorCode::Validation,
                format!("could not parse register request: {e}"),
            ))
        })?
    };
    let reply = submit_registration(&state.api, &identity.org_id, network, request)
        .await
        .map_err(reject)?;
    Ok(Json(reply))
}

async fn http_registration_status(
    State(state): State<Arc<AppState>>,
    Authenticated(identity): Authenticated,
) -> Result<Json<RegistrationStatus>, ApiRejection> {
    let status = registration_status(&state.api, &identity.org_id)
        .await
        .map_err(reject)?;
    Ok(Json(status))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

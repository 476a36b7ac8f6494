use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Network, RegistrationDraft, StepScope},
    error::{ApiError, ErrorCode},
    protocol::{
        certificate_step_route, register_route, registration_status_route, RegisterReply,
        RegisterRequest, RegistrationStatus, ResetQuery, StepQuery, StepReply, StepRequest,
        MAX_UPLOAD_BYTES,
    },
    validation::validate_upload,
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("could not reach the registration server: {0}")]
    Transport(String),
    #[error("registration server answered {status}: {}", .error.message)]
    Server { status: u16, error: ApiError },
    #[error("uploaded draft is invalid at {path}: {message}")]
    UploadSchema { path: String, message: String },
    #[error("uploaded file is not a usable draft: {0}")]
    InvalidUpload(String),
    #[error("could not decode the server reply: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            GatewayError::Server { error, .. } => Some(error.code),
            _ => None,
        }
    }

    /// Field path the failure points at, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            GatewayError::Server { error, .. } => error.field.as_deref(),
            GatewayError::UploadSchema { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Checks an exported draft before it is sent anywhere: size, JSON shape, then the
/// full-document rules. Nothing reaches the server unless all three pass.
pub fn prepare_upload(bytes: &[u8]) -> Result<RegistrationDraft, GatewayError> {
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(GatewayError::InvalidUpload(format!(
            "draft is {} bytes, the limit is {MAX_UPLOAD_BYTES}",
            bytes.len()
        )));
    }
    let draft: RegistrationDraft = serde_json::from_slice(bytes)
        .map_err(|e| GatewayError::InvalidUpload(format!("not a JSON registration draft: {e}")))?;
    let report = validate_upload(&draft).map_err(|rejection| GatewayError::UploadSchema {
        path: rejection.path,
        message: rejection.message,
    })?;
    debug!(issues = report.len(), "upload passed local checks");
    Ok(draft)
}

/// Remote store for one organization's registration draft.
#[async_trait]
pub trait DraftGateway: Send + Sync {
    async fn fetch_step(&self, scope: StepScope) -> Result<StepReply, GatewayError>;

    /// Idempotent per section: sending the same form twice leaves the same stored draft.
    async fn upsert_step(
        &self,
        scope: StepScope,
        form: &RegistrationDraft,
    ) -> Result<StepReply, GatewayError>;

    /// Replaces the stored draft wholesale. A server-side rejection naming a field is
    /// reported as an upload schema error.
    async fn replace_draft(&self, draft: &RegistrationDraft) -> Result<StepReply, GatewayError> {
        self.upsert_step(StepScope::All, draft)
            .await
            .map_err(|err| match err {
                GatewayError::Server { error, .. }
                    if error.code == ErrorCode::Validation && error.field.is_some() =>
                {
                    GatewayError::UploadSchema {
                        path: error.field.unwrap_or_default(),
                        message: error.message,
                    }
                }
                other => other,
            })
    }

    async fn upload_full_draft(&self, bytes: &[u8]) -> Result<StepReply, GatewayError> {
        let draft = prepare_upload(bytes)?;
        self.replace_draft(&draft).await
    }

    async fn reset_draft(&self, scope: Option<StepScope>) -> Result<StepReply, GatewayError>;

    async fn submit(&self, network: Network) -> Result<RegisterReply, GatewayError>;

    async fn registration_status(&self) -> Result<RegistrationStatus, GatewayError>;
}

pub struct HttpDraftGateway {
    http: Client,
    server_url: Url,
    token: String,
}

impl HttpDraftGateway {
    pub fn new(server_url: &str, token: impl Into<String>) -> Result<Self, url::ParseError> {
        Ok(Self {
            http: Client::new(),
            server_url: Url::parse(server_url)?,
            token: token.into(),
        })
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    fn endpoint(&self, route: &str) -> Result<Url, GatewayError> {
        self.server_url
            .join(route)
            .map_err(|e| GatewayError::Transport(format!("invalid route {route}: {e}")))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.token)
    }
}

fn code_for_status(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::UNAUTHORIZED => ErrorCode::Unauthorized,
        StatusCode::FORBIDDEN => ErrorCode::Forbidden,
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        StatusCode::CONFLICT => ErrorCode::Conflict,
        StatusCode::TOO_MANY_REQUESTS => ErrorCode::RateLimited,
        status if status.is_client_error() => ErrorCode::Validation,
        _ => ErrorCode::Internal,
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()));
    }

    let body = response.bytes().await?;
    let error = serde_json::from_slice::<ApiError>(&body).unwrap_or_else(|_| {
        let text = String::from_utf8_lossy(&body).trim().to_string();
        let message = if text.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            text
        };
        ApiError::new(code_for_status(status), message)
    });
    warn!(status = status.as_u16(), code = ?error.code, message = %error.message, "registration server refused request");
    Err(GatewayError::Server {
        status: status.as_u16(),
        error,
    })
}

#[async_trait]
impl DraftGateway for HttpDraftGateway {
    async fn fetch_step(&self, scope: StepScope) -> Result<StepReply, GatewayError> {
        let url = self.endpoint(certificate_step_route())?;
        let response = self
            .authorized(self.http.get(url))
            .query(&StepQuery { key: scope })
            .send()
            .await?;
        decode(response).await
    }

    async fn upsert_step(
        &self,
        scope: StepScope,
        form: &RegistrationDraft,
    ) -> Result<StepReply, GatewayError> {
        let url = self.endpoint(certificate_step_route())?;
        let response = self
            .authorized(self.http.post(url))
            .json(&StepRequest {
                step: scope,
                form: form.clone(),
            })
            .send()
            .await?;
        decode(response).await
    }

    async fn reset_draft(&self, scope: Option<StepScope>) -> Result<StepReply, GatewayError> {
        let url = self.endpoint(certificate_step_route())?;
        let response = self
            .authorized(self.http.delete(url))
            .query(&ResetQuery { key: scope })
            .send()
            .await?;
        decode(response).await
    }

    async fn submit(&self, network: Network) -> Result<RegisterReply, GatewayError> {
        let url = self.endpoint(&register_route(network))?;
        let response = self
            .authorized(self.http.post(url))
            .json(&RegisterRequest {
                network: Some(network),
            })
            .send()
            .await?;
        decode(response).await
    }

    async fn registration_status(&self) -> Result<RegistrationStatus, GatewayError> {
        let url = self.endpoint(registration_status_route())?;
        let response = self.authorized(self.http.get(url)).send().await?;
        decode(response).await
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;

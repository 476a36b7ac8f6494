use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use server_api::{ApiContext, LocalRegistrar};
use shared::{
    domain::{Network, OrganizationId, RegistrationDraft, StepScope},
    error::{ApiError, ErrorCode},
    protocol::{RegisterReply, RegisterRequest, RegistrationStatus, StepReply, StepRequest},
};
use storage::Storage;
use tokio::sync::Semaphore;

use crate::gateway::{DraftGateway, GatewayError};

pub(crate) fn http_status(code: ErrorCode) -> u16 {
    match code {
        ErrorCode::Unauthorized => 401,
        ErrorCode::Forbidden => 403,
        ErrorCode::NotFound => 404,
        ErrorCode::Validation => 400,
        ErrorCode::Conflict => 409,
        ErrorCode::RateLimited => 429,
        ErrorCode::Internal => 500,
    }
}

fn server_error(error: ApiError) -> GatewayError {
    GatewayError::Server {
        status: http_status(error.code),
        error,
    }
}

/// Gateway that calls the server handlers directly against an in-memory database.
pub(crate) struct LocalGateway {
    pub(crate) ctx: ApiContext,
    pub(crate) org: OrganizationId,
    pub(crate) fetches: AtomicUsize,
    pub(crate) upserts: AtomicUsize,
    pub(crate) submits: AtomicUsize,
    pub(crate) offline: AtomicBool,
    pub(crate) max_concurrent_upserts: AtomicUsize,
    upserts_in_flight: AtomicUsize,
    upsert_gate: Option<Arc<Semaphore>>,
}

impl LocalGateway {
    pub(crate) async fn new() -> Self {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        Self {
            ctx: ApiContext::new(storage, Arc::new(LocalRegistrar::default())),
            org: OrganizationId::from("acme"),
            fetches: AtomicUsize::new(0),
            upserts: AtomicUsize::new(0),
            submits: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
            max_concurrent_upserts: AtomicUsize::new(0),
            upserts_in_flight: AtomicUsize::new(0),
            upsert_gate: None,
        }
    }

    /// Upserts wait for a permit on `gate` before reaching the store.
    pub(crate) async fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            upsert_gate: Some(gate),
            ..Self::new().await
        }
    }

    pub(crate) async fn seed(&self, draft: &RegistrationDraft) {
        self.ctx
            .storage
            .replace_draft(&self.org, draft)
            .await
            .expect("seed draft");
    }

    pub(crate) async fn stored(&self) -> Option<RegistrationDraft> {
        self.ctx.storage.load_draft(&self.org).await.expect("load draft")
    }

    pub(crate) fn go_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<(), GatewayError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DraftGateway for LocalGateway {
    async fn fetch_step(&self, scope: StepScope) -> Result<StepReply, GatewayError> {
        self.ensure_online()?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        server_api::fetch_step(&self.ctx, &self.org, scope)
            .await
            .map_err(server_error)
    }

    async fn upsert_step(
        &self,
        scope: StepScope,
        form: &RegistrationDraft,
    ) -> Result<StepReply, GatewayError> {
        self.ensure_online()?;
        let in_flight = self.upserts_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_upserts
            .fetch_max(in_flight, Ordering::SeqCst);
        if let Some(gate) = &self.upsert_gate {
            gate.acquire().await.expect("gate open").forget();
        }
        let result = server_api::upsert_step(
            &self.ctx,
            &self.org,
            StepRequest {
                step: scope,
                form: form.clone(),
            },
        )
        .await
        .map_err(server_error);
        self.upserts_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.upserts.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn reset_draft(&self, scope: Option<StepScope>) -> Result<StepReply, GatewayError> {
        self.ensure_online()?;
        server_api::reset_draft(&self.ctx, &self.org, scope)
            .await
            .map_err(server_error)
    }

    async fn submit(&self, network: Network) -> Result<RegisterReply, GatewayError> {
        self.ensure_online()?;
        self.submits.fetch_add(1, Ordering::SeqCst);
        server_api::submit_registration(
            &self.ctx,
            &self.org,
            network,
            RegisterRequest {
                network: Some(network),
            },
        )
        .await
        .map_err(server_error)
    }

    async fn registration_status(&self) -> Result<RegistrationStatus, GatewayError> {
        self.ensure_online()?;
        server_api::registration_status(&self.ctx, &self.org)
            .await
            .map_err(server_error)
    }
}

/// Lets tests keep a handle on the gateway a wizard or controller owns.
#[async_trait]
impl DraftGateway for Arc<LocalGateway> {
    async fn fetch_step(&self, scope: StepScope) -> Result<StepReply, GatewayError> {
        self.as_ref().fetch_step(scope).await
    }

    async fn upsert_step(
        &self,
        scope: StepScope,
        form: &RegistrationDraft,
    ) -> Result<StepReply, GatewayError> {
        self.as_ref().upsert_step(scope, form).await
    }

    async fn reset_draft(&self, scope: Option<StepScope>) -> Result<StepReply, GatewayError> {
        self.as_ref().reset_draft(scope).await
    }

    async fn submit(&self, network: Network) -> Result<RegisterReply, GatewayError> {
        self.as_ref().submit(network).await
    }

    async fn registration_status(&self) -> Result<RegistrationStatus, GatewayError> {
        self.as_ref().registration_status().await
    }
}

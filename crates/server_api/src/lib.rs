use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use shared::{
    domain::{Network, OrganizationId, RegistrationDraft, StepKey, StepScope},
    error::{ApiError, ErrorCode},
    protocol::{
        RegisterReply, RegisterRequest, RegistrationStatus, StepReply, StepRequest,
        SubmissionRecord,
    },
    validation::{validate_all, validate_step, validate_upload, Severity},
};
use storage::Storage;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub mod auth;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub registrar: Arc<dyn DirectoryRegistrar>,
}

impl ApiContext {
    pub fn new(storage: Storage, registrar: Arc<dyn DirectoryRegistrar>) -> Self {
        Self { storage, registrar }
    }
}

#[derive(Debug, Error)]
pub enum RegistrarError {
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    AlreadyRegistered(String),
    #[error(transparent)]
    Unavailable(#[from] anyhow::Error),
}

/// Directory service that turns a validated draft into a certificate request.
#[async_trait]
pub trait DirectoryRegistrar: Send + Sync {
    async fn register(
        &self,
        network: Network,
        draft: &RegistrationDraft,
    ) -> Result<RegisterReply, RegistrarError>;
}

/// Registrar that accepts every request locally, minting a request id and a
/// one-time PKCS12 password.
#[derive(Debug, Clone)]
pub struct LocalRegistrar {
    pub testnet_directory: String,
    pub mainnet_directory: String,
}

impl Default for LocalRegistrar {
    fn default() -> Self {
        Self {
            testnet_directory: "trisatest.net".into(),
            mainnet_directory: "vaspdirectory.net".into(),
        }
    }
}

#[async_trait]
impl DirectoryRegistrar for LocalRegistrar {
    async fn register(
        &self,
        network: Network,
        draft: &RegistrationDraft,
    ) -> Result<RegisterReply, RegistrarError> {
        let directory = match network {
            Network::Testnet => &self.testnet_directory,
            Network::Mainnet => &self.mainnet_directory,
        };
        let mut secret = Uuid::new_v4().as_bytes().to_vec();
        secret.extend_from_slice(Uuid::new_v4().as_bytes());

        Ok(RegisterReply {
            id: Uuid::new_v4().to_string(),
            registered_directory: directory.clone(),
            common_name: draft.trisa.get(network).common_name.trim().to_string(),
            status: "PENDING_REVIEW".into(),
            message: "a verification email has been sent to the contacts on the registration"
                .into(),
            pkcs12password: STANDARD.encode(secret),
        })
    }
}

/// Stored draft restricted to `scope`, with the issues found in that part of it.
pub async fn fetch_step(
    ctx: &ApiContext,
    org_id: &OrganizationId,
    scope: StepScope,
) -> Result<StepReply, ApiError> {
    let target = issue_step(scope)?;
    let draft = ctx
        .storage
        .load_draft_or_default(org_id)
        .await
        .map_err(internal)?;
    Ok(StepReply {
        step: scope,
        errors: validate_step(&draft, target).to_field_errors(),
        form: draft.truncate(scope),
    })
}

/// Saves one section, or replaces the whole draft when the step is `all`.
///
/// A section is stored even when it still has issues; the reply carries them. A whole
/// document is stored only if it has no blocking issue.
pub async fn upsert_step(
    ctx: &ApiContext,
    org_id: &OrganizationId,
    request: StepRequest,
) -> Result<StepReply, ApiError> {
    let StepRequest { step: scope, form } = request;
    match scope {
        StepScope::All => replace_draft(ctx, org_id, form).await,
        StepScope::Step(step) => {
            issue_step(scope)?;
            let state = form.state.clone();
            let stored = ctx
                .storage
                .upsert_section(org_id, step, &form, state)
                .await
                .map_err(internal)?;
            let errors = validate_step(&stored, step).to_field_errors();
            info!(org = %org_id, step = %step, issues = errors.len(), "registration step saved");
            Ok(StepReply {
                step: scope,
                form: stored.truncate(scope),
                errors,
            })
        }
    }
}

pub async fn replace_draft(
    ctx: &ApiContext,
    org_id: &OrganizationId,
    mut draft: RegistrationDraft,
) -> Result<StepReply, ApiError> {
    let report = validate_upload(&draft).map_err(|rejection| {
        warn!(org = %org_id, field = %rejection.path, "uploaded registration rejected");
        ApiError::new(ErrorCode::Validation, rejection.message).with_field(rejection.path)
    })?;

    if draft.state.is_none() {
        draft.state = ctx
            .storage
            .load_draft_or_default(org_id)
            .await
            .map_err(internal)?
            .state;
    }
    ctx.storage
        .replace_draft(org_id, &draft)
        .await
        .map_err(internal)?;
    info!(org = %org_id, issues = report.len(), "registration draft replaced");

    Ok(StepReply {
        step: StepScope::All,
        form: draft,
        errors: report.to_field_errors(),
    })
}

/// Puts the draft, or one section of it, back to the wizard defaults.
pub async fn reset_draft(
    ctx: &ApiContext,
    org_id: &OrganizationId,
    scope: Option<StepScope>,
) -> Result<StepReply, ApiError> {
    let scope = scope.unwrap_or(StepScope::All);
    issue_step(scope)?;
    let existed = ctx
        .storage
        .reset_draft(org_id, scope)
        .await
        .map_err(internal)?;
    info!(org = %org_id, scope = %String::from(scope), existed, "registration draft reset");
    fetch_step(ctx, org_id, scope).await
}

pub async fn submit_registration(
    ctx: &ApiContext,
    org_id: &OrganizationId,
    network: Network,
    request: RegisterRequest,
) -> Result<RegisterReply, ApiError> {
    if request.network.is_some_and(|requested| requested != network) {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "the request network does not match the URL endpoint",
        ));
    }

    if ctx
        .storage
        .load_submission(org_id, network)
        .await
        .map_err(internal)?
        .is_some()
    {
        return Err(already_submitted(network));
    }

    let draft = ctx
        .storage
        .load_draft(org_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ApiError::new(
                ErrorCode::Validation,
                "no registration form has been saved for this organization",
            )
        })?;

    let report = validate_all(&draft);
    if let Some((field, issue)) = report
        .iter()
        .find(|(_, issue)| issue.severity != Severity::Warning)
    {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("registration form is incomplete: {}", issue.message),
        )
        .with_field(field));
    }
    if draft.trisa.get(network).is_zero() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("no {network} details have been provided"),
        )
        .with_field(network.as_str()));
    }

    let reply = ctx
        .registrar
        .register(network, &draft)
        .await
        .map_err(|err| match err {
            RegistrarError::Rejected(message) => ApiError::new(ErrorCode::Validation, message),
            RegistrarError::AlreadyRegistered(message) => {
                ApiError::new(ErrorCode::Conflict, message)
            }
            RegistrarError::Unavailable(err) => {
                warn!(org = %org_id, network = %network, error = %err, "directory registration failed");
                ApiError::new(
                    ErrorCode::Internal,
                    format!("could not register with {network}"),
                )
            }
        })?;

    let record = SubmissionRecord {
        network,
        id: reply.id.clone(),
        status: reply.status.clone(),
        message: reply.message.clone(),
        submitted_at: Utc::now(),
    };
    let inserted = ctx
        .storage
        .insert_submission(org_id, &record)
        .await
        .map_err(internal)?;
    if !inserted {
        return Err(already_submitted(network));
    }

    info!(org = %org_id, network = %network, request_id = %record.id, "registration submitted");
    Ok(reply)
}

pub async fn registration_status(
    ctx: &ApiContext,
    org_id: &OrganizationId,
) -> Result<RegistrationStatus, ApiError> {
    let submissions = ctx
        .storage
        .list_submissions(Some(org_id))
        .await
        .map_err(internal)?;
    let mut status = RegistrationStatus::default();
    for stored in submissions {
        let submitted_at = Some(stored.record.submitted_at);
        match stored.record.network {
            Network::Testnet => status.testnet_submitted = submitted_at,
            Network::Mainnet => status.mainnet_submitted = submitted_at,
        }
    }
    Ok(status)
}

/// Step whose rules apply to `scope`. The review step owns no fields of its own.
fn issue_step(scope: StepScope) -> Result<StepKey, ApiError> {
    match scope {
        StepScope::All => Ok(StepKey::Review),
        StepScope::Step(StepKey::Review) => Err(ApiError::new(
            ErrorCode::Validation,
            "unknown registration form step \"review\"",
        )),
        StepScope::Step(step) => Ok(step),
    }
}

fn already_submitted(network: Network) -> ApiError {
    ApiError::new(
        ErrorCode::Conflict,
        format!("registration has already been submitted to {network}"),
    )
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::fixtures::complete_draft;

    async fn setup() -> (ApiContext, OrganizationId) {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        (
            ApiContext::new(storage, Arc::new(LocalRegistrar::default())),
            OrganizationId::from("2295c698-afdc-4aaf-9443-85a4515217e3"),
        )
    }

    struct UnavailableRegistrar;

    #[async_trait]
    impl DirectoryRegistrar for UnavailableRegistrar {
        async fn register(
            &self,
            _network: Network,
            _draft: &RegistrationDraft,
        ) -> Result<RegisterReply, RegistrarError> {
            Err(RegistrarError::Unavailable(anyhow::anyhow!("connection refused")))
        }
    }

    #[tokio::test]
    async fn fresh_organization_gets_initial_form() {
        let (ctx, org) = setup().await;
        let reply = fetch_step(&ctx, &org, StepScope::All).await.expect("fetch");
        assert_eq!(reply.form, RegistrationDraft::new_form());
        assert!(!reply.errors.is_empty());
    }

    #[tokio::test]
    async fn step_reads_only_return_that_section_and_its_errors() {
        let (ctx, org) = setup().await;
        let mut draft = complete_draft();
        draft.contacts.technical.email.clear();
        ctx.storage.replace_draft(&org, &draft).await.expect("seed");

        let reply = fetch_step(&ctx, &org, StepScope::Step(StepKey::Basic))
            .await
            .expect("basic");
        assert!(reply.errors.is_empty());
        assert_eq!(reply.form.business, draft.business);
        assert!(reply.form.section_is_empty(StepKey::Contacts));

        let reply = fetch_step(&ctx, &org, StepScope::Step(StepKey::Contacts))
            .await
            .expect("contacts");
        assert_eq!(reply.errors.len(), 1);
        assert_eq!(reply.errors[0].field, "contacts.technical.email");
    }

    #[tokio::test]
    async fn review_is_not_a_readable_step() {
        let (ctx, org) = setup().await;
        let err = fetch_step(&ctx, &org, StepScope::Step(StepKey::Review))
            .await
            .expect_err("review");
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[tokio::test]
    async fn section_upserts_are_stored_with_their_issues() {
        let (ctx, org) = setup().await;
        let mut form = complete_draft();
        form.business.website.clear();

        let reply = upsert_step(
            &ctx,
            &org,
            StepRequest {
                step: StepScope::Step(StepKey::Basic),
                form: form.clone(),
            },
        )
        .await
        .expect("upsert");
        assert_eq!(reply.errors.len(), 1);
        assert_eq!(reply.errors[0].field, "website");
        assert_eq!(reply.errors[0].severity, Severity::Missing);

        let stored = ctx.storage.load_draft(&org).await.expect("load").expect("draft");
        assert_eq!(stored.business, form.business);
        assert!(stored.section_eq(StepKey::Contacts, &RegistrationDraft::new_form()));
    }

    #[tokio::test]
    async fn rejected_upload_leaves_stored_draft_untouched() {
        let (ctx, org) = setup().await;
        let original = complete_draft();
        ctx.storage.replace_draft(&org, &original).await.expect("seed");

        let mut upload = complete_draft();
        upload.business.organization_name = "Changed".into();
        upload.contacts.technical.email.clear();

        let err = upsert_step(
            &ctx,
            &org,
            StepRequest {
                step: StepScope::All,
                form: upload,
            },
        )
        .await
        .expect_err("upload");
        assert_eq!(err.code, ErrorCode::Validation);
        assert_eq!(err.field.as_deref(), Some("contacts.technical.email"));
        assert_eq!(
            ctx.storage.load_draft(&org).await.expect("load"),
            Some(original)
        );
    }

    #[tokio::test]
    async fn accepted_upload_keeps_the_stored_form_state() {
        let (ctx, org) = setup().await;
        let reply = upsert_step(
            &ctx,
            &org,
            StepRequest {
                step: StepScope::All,
                form: complete_draft(),
            },
        )
        .await
        .expect("upload");
        assert!(reply.errors.is_empty());
        assert_eq!(reply.form.state, RegistrationDraft::new_form().state);
    }

    #[tokio::test]
    async fn reset_restores_defaults() {
        let (ctx, org) = setup().await;
        ctx.storage
            .replace_draft(&org, &complete_draft())
            .await
            .expect("seed");

        let reply = reset_draft(&ctx, &org, Some(StepScope::Step(StepKey::Trisa)))
            .await
            .expect("reset trisa");
        assert!(reply.form.section_is_empty(StepKey::Trisa));
        let stored = ctx.storage.load_draft(&org).await.expect("load").expect("draft");
        assert_eq!(stored.contacts, complete_draft().contacts);

        let reply = reset_draft(&ctx, &org, None).await.expect("reset all");
        assert_eq!(reply.form, RegistrationDraft::new_form());
    }

    #[tokio::test]
    async fn incomplete_draft_cannot_be_submitted() {
        let (ctx, org) = setup().await;
        let mut draft = complete_draft();
        draft.trixo.primary_regulator.clear();
        ctx.storage.replace_draft(&org, &draft).await.expect("seed");

        let err = submit_registration(&ctx, &org, Network::Testnet, RegisterRequest::default())
            .await
            .expect_err("incomplete");
        assert_eq!(err.code, ErrorCode::Validation);
        assert_eq!(err.field.as_deref(), Some("trixo.primary_regulator"));
        assert!(ctx
            .storage
            .list_submissions(Some(&org))
            .await
            .expect("list")
            .is_empty());
    }

    #[tokio::test]
    async fn submission_is_recorded_once_per_network() {
        let (ctx, org) = setup().await;
        ctx.storage
            .replace_draft(&org, &complete_draft())
            .await
            .expect("seed");

        let reply = submit_registration(&ctx, &org, Network::Testnet, RegisterRequest::default())
            .await
            .expect("submit");
        assert_eq!(reply.registered_directory, "trisatest.net");
        assert_eq!(reply.common_name, "testnet.example.com");
        assert!(!reply.pkcs12password.is_empty());
        assert!(Uuid::parse_str(&reply.id).is_ok());

        let err = submit_registration(&ctx, &org, Network::Testnet, RegisterRequest::default())
            .await
            .expect_err("duplicate");
        assert_eq!(err.code, ErrorCode::Conflict);

        let status = registration_status(&ctx, &org).await.expect("status");
        assert!(status.testnet_submitted.is_some());
        assert!(status.mainnet_submitted.is_none());

        let stored = ctx
            .storage
            .load_submission(&org, Network::Testnet)
            .await
            .expect("load")
            .expect("record");
        assert_eq!(stored.id, reply.id);
    }

    #[tokio::test]
    async fn mismatched_network_in_body_is_rejected() {
        let (ctx, org) = setup().await;
        let err = submit_registration(
            &ctx,
            &org,
            Network::Mainnet,
            RegisterRequest {
                network: Some(Network::Testnet),
            },
        )
        .await
        .expect_err("mismatch");
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[tokio::test]
    async fn registrar_outage_is_reported_without_recording() {
        let (ctx, org) = setup().await;
        let ctx = ApiContext::new(ctx.storage, Arc::new(UnavailableRegistrar));
        ctx.storage
            .replace_draft(&org, &complete_draft())
            .await
            .expect("seed");

        let err = submit_registration(&ctx, &org, Network::Mainnet, RegisterRequest::default())
            .await
            .expect_err("outage");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "could not register with mainnet");
        let status = registration_status(&ctx, &org).await.expect("status");
        assert_eq!(status, RegistrationStatus::default());
    }
}

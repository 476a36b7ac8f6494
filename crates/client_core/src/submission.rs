use std::{collections::HashMap, fmt, sync::Arc};

use chrono::Utc;
use shared::{
    domain::{Network, RegistrationDraft},
    error::ErrorCode,
    protocol::{RegistrationStatus, SubmissionRecord},
    validation::{validate_all, ValidationReport},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::gateway::{DraftGateway, GatewayError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionState {
    #[default]
    NotSubmitted,
    Pending,
    Submitted,
    /// Last attempt failed; the next submit starts over from not submitted.
    Failed,
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("{0} registration has already been submitted")]
    AlreadySubmitted(Network),
    #[error("{0} registration is already being submitted")]
    InFlight(Network),
    #[error("the review step has not been reached")]
    ReviewNotReached,
    #[error("registration form still has {} issue(s) to resolve", .issues.len())]
    NotReady { issues: ValidationReport },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// PKCS12 password for the certificate bundle. Shown once, never stored.
pub struct OneTimeCredential(String);

impl OneTimeCredential {
    /// Hands the password out, consuming the credential.
    pub fn reveal(self) -> String {
        self.0
    }
}

impl fmt::Debug for OneTimeCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OneTimeCredential(<redacted>)")
    }
}

#[derive(Debug)]
pub struct SubmissionReceipt {
    pub record: SubmissionRecord,
    pub registered_directory: String,
    pub common_name: String,
    pub credential: OneTimeCredential,
}

#[derive(Debug, Default)]
struct NetworkSubmission {
    state: SubmissionState,
    record: Option<SubmissionRecord>,
}

/// Tracks testnet and mainnet submissions independently of each other.
pub struct SubmissionCoordinator {
    gateway: Arc<dyn DraftGateway>,
    networks: Mutex<HashMap<Network, NetworkSubmission>>,
}

impl SubmissionCoordinator {
    pub fn new(gateway: Arc<dyn DraftGateway>) -> Self {
        Self {
            gateway,
            networks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn state(&self, network: Network) -> SubmissionState {
        self.networks
            .lock()
            .await
            .get(&network)
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    pub async fn record(&self, network: Network) -> Option<SubmissionRecord> {
        self.networks.lock().await.get(&network)?.record.clone()
    }

    pub async fn can_submit(&self, network: Network) -> bool {
        matches!(
            self.state(network).await,
            SubmissionState::NotSubmitted | SubmissionState::Failed
        )
    }

    /// Marks networks the server already knows about as submitted.
    pub async fn sync_status(&self, status: &RegistrationStatus) {
        let mut networks = self.networks.lock().await;
        for network in Network::ALL {
            if status.submitted_at(network).is_some() {
                networks.entry(network).or_default().state = SubmissionState::Submitted;
            }
        }
    }

    /// Submits `draft` for `network`. The draft must be free of blocking and missing issues.
    pub async fn submit(
        &self,
        network: Network,
        draft: &RegistrationDraft,
        review_reached: bool,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        if !review_reached {
            return Err(SubmissionError::ReviewNotReached);
        }
        let issues = validate_all(draft);
        if !issues.is_clean() {
            return Err(SubmissionError::NotReady { issues });
        }

        {
            let mut networks = self.networks.lock().await;
            let entry = networks.entry(network).or_default();
            match entry.state {
                SubmissionState::Submitted => {
                    return Err(SubmissionError::AlreadySubmitted(network))
                }
                SubmissionState::Pending => return Err(SubmissionError::InFlight(network)),
                SubmissionState::Failed | SubmissionState::NotSubmitted => {
                    entry.state = SubmissionState::Pending;
                }
            }
        }

        let result = self.gateway.submit(network).await;

        let mut networks = self.networks.lock().await;
        let entry = networks.entry(network).or_default();
        match result {
            Ok(reply) => {
                let record = SubmissionRecord {
                    network,
                    id: reply.id,
                    status: reply.status,
                    message: reply.message,
                    submitted_at: Utc::now(),
                };
                entry.state = SubmissionState::Submitted;
                entry.record = Some(record.clone());
                info!(%network, request_id = %record.id, "registration submitted");
                Ok(SubmissionReceipt {
                    record,
                    registered_directory: reply.registered_directory,
                    common_name: reply.common_name,
                    credential: OneTimeCredential(reply.pkcs12password),
                })
            }
            Err(err) if err.code() == Some(ErrorCode::Conflict) => {
                warn!(%network, "server already holds a submission for this network");
                entry.state = SubmissionState::Submitted;
                Err(SubmissionError::Gateway(err))
            }
            Err(err) => {
                warn!(%network, error = %err, "registration submission failed");
                entry.state = SubmissionState::Failed;
                Err(SubmissionError::Gateway(err))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/submission_tests.rs"]
mod tests;

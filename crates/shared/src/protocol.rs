use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{Network, RegistrationDraft, StepScope},
    validation::{FieldError, ValidationReport},
};

/// Largest draft document accepted by an upload.
pub const MAX_UPLOAD_BYTES: usize = 100_000;

pub fn certificate_step_route() -> &'static str {
    "/certificate/step"
}

pub fn register_route(network: Network) -> String {
    format!("/register/{}", network.as_str())
}

pub fn registration_status_route() -> &'static str {
    "/registration/status"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepQuery {
    pub key: StepScope,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<StepScope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRequest {
    pub step: StepScope,
    pub form: RegistrationDraft,
}

/// A section (or the whole draft) as stored remotely, with the server-confirmed issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReply {
    pub step: StepScope,
    pub form: RegistrationDraft,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl StepReply {
    pub fn report(&self) -> ValidationReport {
        ValidationReport::from_field_errors(&self.errors)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterReply {
    pub id: String,
    pub registered_directory: String,
    pub common_name: String,
    pub status: String,
    pub message: String,
    pub pkcs12password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub network: Network,
    pub id: String,
    pub status: String,
    pub message: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testnet_submitted: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mainnet_submitted: Option<DateTime<Utc>>,
}

impl RegistrationStatus {
    pub fn submitted_at(&self, network: Network) -> Option<DateTime<Utc>> {
        match network {
            Network::Testnet => self.testnet_submitted,
            Network::Mainnet => self.mainnet_submitted,
        }
    }
}

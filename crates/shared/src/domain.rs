use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Organization that owns a registration draft, as named by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub String);

impl OrganizationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrganizationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKey {
    Basic,
    Legal,
    Contacts,
    Trisa,
    Trixo,
    Review,
}

impl StepKey {
    pub const ALL: [StepKey; 6] = [
        StepKey::Basic,
        StepKey::Legal,
        StepKey::Contacts,
        StepKey::Trisa,
        StepKey::Trixo,
        StepKey::Review,
    ];

    /// Steps that carry a section of the registration draft.
    pub const FORM_STEPS: [StepKey; 5] = [
        StepKey::Basic,
        StepKey::Legal,
        StepKey::Contacts,
        StepKey::Trisa,
        StepKey::Trixo,
    ];

    pub fn number(self) -> u8 {
        match self {
            StepKey::Basic => 1,
            StepKey::Legal => 2,
            StepKey::Contacts => 3,
            StepKey::Trisa => 4,
            StepKey::Trixo => 5,
            StepKey::Review => 6,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.get(usize::from(number).checked_sub(1)?).copied()
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub fn previous(self) -> Option<Self> {
        Self::from_number(self.number().checked_sub(1)?)
    }

    pub fn is_form(self) -> bool {
        self != StepKey::Review
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepKey::Basic => "basic",
            StepKey::Legal => "legal",
            StepKey::Contacts => "contacts",
            StepKey::Trisa => "trisa",
            StepKey::Trixo => "trixo",
            StepKey::Review => "review",
        }
    }

    /// Top-level field paths owned by the step. Paths of different steps never overlap.
    pub fn field_prefixes(self) -> &'static [&'static str] {
        match self {
            StepKey::Basic => &[
                "website",
                "business_category",
                "vasp_categories",
                "established_on",
                "organization_name",
            ],
            StepKey::Legal => &["entity"],
            StepKey::Contacts => &["contacts"],
            StepKey::Trisa => &["testnet", "mainnet"],
            StepKey::Trixo => &["trixo"],
            StepKey::Review => &[],
        }
    }

    pub fn owns_field(self, path: &str) -> bool {
        self.field_prefixes().iter().any(|prefix| {
            path == *prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
        })
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown registration form step {0:?}")]
pub struct UnknownStep(pub String);

impl FromStr for StepKey {
    type Err = UnknownStep;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        if let Ok(number) = normalized.parse::<u8>() {
            return Self::from_number(number).ok_or_else(|| UnknownStep(s.to_string()));
        }
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == normalized)
            .ok_or_else(|| UnknownStep(s.to_string()))
    }
}

/// Either a single step or the whole document (`all`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StepScope {
    All,
    Step(StepKey),
}

impl StepScope {
    pub fn covers(self, step: StepKey) -> bool {
        match self {
            StepScope::All => true,
            StepScope::Step(own) => own == step,
        }
    }
}

impl FromStr for StepScope {
    type Err = UnknownStep;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(StepScope::All);
        }
        trimmed.parse().map(StepScope::Step)
    }
}

impl TryFrom<String> for StepScope {
    type Error = UnknownStep;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StepScope> for String {
    fn from(value: StepScope) -> Self {
        match value {
            StepScope::All => "all".to_string(),
            StepScope::Step(step) => step.as_str().to_string(),
        }
    }
}

impl From<StepKey> for StepScope {
    fn from(value: StepKey) -> Self {
        StepScope::Step(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    NotStarted,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Testnet,
    Mainnet,
}

impl Network {
    pub const ALL: [Network; 2] = [Network::Testnet, Network::Mainnet];

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("network should be either testnet or mainnet, got {0:?}")]
pub struct UnknownNetwork(pub String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            _ => Err(UnknownNetwork(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BusinessCategory {
    #[default]
    #[serde(rename = "UNKNOWN_ENTITY")]
    UnknownEntity,
    #[serde(rename = "PRIVATE_ORGANIZATION")]
    PrivateOrganization,
    #[serde(rename = "GOVERNMENT_ENTITY")]
    GovernmentEntity,
    #[serde(rename = "BUSINESS_ENTITY")]
    BusinessEntity,
    #[serde(rename = "NON_COMMERCIAL_ENTITY")]
    NonCommercialEntity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NameIdentifierType {
    #[default]
    #[serde(rename = "LEGAL_PERSON_NAME_TYPE_CODE_LEGL")]
    Legal,
    #[serde(rename = "LEGAL_PERSON_NAME_TYPE_CODE_SHRT")]
    Short,
    #[serde(rename = "LEGAL_PERSON_NAME_TYPE_CODE_TRAD")]
    Trading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AddressType {
    #[serde(rename = "ADDR_TYPE_CODE_HOME")]
    Home,
    #[default]
    #[serde(rename = "ADDR_TYPE_CODE_BIZZ")]
    Business,
    #[serde(rename = "ADDR_TYPE_CODE_GEOG")]
    Geographic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NationalIdentifierType {
    #[serde(rename = "NATIONAL_IDENTIFIER_TYPE_CODE_RAID")]
    RegistrationAuthority,
    #[serde(rename = "NATIONAL_IDENTIFIER_TYPE_CODE_MISC")]
    Unspecified,
    /// Legal Entity Identifier (LEIX).
    #[default]
    #[serde(rename = "NATIONAL_IDENTIFIER_TYPE_CODE_LEIX")]
    LegalEntityIdentifier,
    #[serde(rename = "NATIONAL_IDENTIFIER_TYPE_CODE_TXID")]
    TaxIdentification,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessDetails {
    pub website: String,
    pub business_category: BusinessCategory,
    pub vasp_categories: Vec<String>,
    pub established_on: String,
    pub organization_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NameIdentifier {
    pub legal_person_name: String,
    pub legal_person_name_identifier_type: Option<NameIdentifierType>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegalPersonName {
    pub name_identifiers: Vec<NameIdentifier>,
    pub local_name_identifiers: Vec<NameIdentifier>,
    pub phonetic_name_identifiers: Vec<NameIdentifier>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeographicAddress {
    pub address_type: AddressType,
    pub address_line: Vec<String>,
    pub street_name: String,
    pub building_number: String,
    pub building_name: String,
    pub post_code: String,
    pub town_name: String,
    pub country_sub_division: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NationalIdentification {
    pub national_identifier: String,
    pub national_identifier_type: NationalIdentifierType,
    pub country_of_issue: String,
    pub registration_authority: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegalPerson {
    pub name: LegalPersonName,
    pub geographic_addresses: Vec<GeographicAddress>,
    pub customer_number: String,
    pub national_identification: NationalIdentification,
    pub country_of_registration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl Contact {
    pub fn is_zero(&self) -> bool {
        self.name.trim().is_empty() && self.email.trim().is_empty() && self.phone.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactRole {
    Legal,
    Technical,
    Administrative,
    Billing,
}

impl ContactRole {
    pub const ALL: [ContactRole; 4] = [
        ContactRole::Legal,
        ContactRole::Technical,
        ContactRole::Administrative,
        ContactRole::Billing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContactRole::Legal => "legal",
            ContactRole::Technical => "technical",
            ContactRole::Administrative => "administrative",
            ContactRole::Billing => "billing",
        }
    }

    /// Legal and technical contacts are mandatory; the others are validated only when present.
    pub fn is_required(self) -> bool {
        matches!(self, ContactRole::Legal | ContactRole::Technical)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Contacts {
    pub legal: Contact,
    pub technical: Contact,
    pub administrative: Contact,
    pub billing: Contact,
}

impl Contacts {
    pub fn get(&self, role: ContactRole) -> &Contact {
        match role {
            ContactRole::Legal => &self.legal,
            ContactRole::Technical => &self.technical,
            ContactRole::Administrative => &self.administrative,
            ContactRole::Billing => &self.billing,
        }
    }

    pub fn get_mut(&mut self, role: ContactRole) -> &mut Contact {
        match role {
            ContactRole::Legal => &mut self.legal,
            ContactRole::Technical => &mut self.technical,
            ContactRole::Administrative => &mut self.administrative,
            ContactRole::Billing => &mut self.billing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkDetails {
    pub endpoint: String,
    pub common_name: String,
    pub dns_names: Vec<String>,
}

impl NetworkDetails {
    pub fn is_zero(&self) -> bool {
        self.endpoint.trim().is_empty()
            && self.common_name.trim().is_empty()
            && self.dns_names.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrisaEndpoints {
    pub testnet: NetworkDetails,
    pub mainnet: NetworkDetails,
}

impl TrisaEndpoints {
    pub fn get(&self, network: Network) -> &NetworkDetails {
        match network {
            Network::Testnet => &self.testnet,
            Network::Mainnet => &self.mainnet,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Jurisdiction {
    pub country: String,
    pub regulator_name: String,
    pub license_number: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrixoQuestionnaire {
    pub primary_national_jurisdiction: String,
    pub primary_regulator: String,
    pub other_jurisdictions: Vec<Jurisdiction>,
    pub financial_transfers_permitted: String,
    pub has_required_regulatory_program: String,
    pub conducts_customer_kyc: bool,
    pub kyc_threshold: f64,
    pub kyc_threshold_currency: String,
    pub must_comply_travel_rule: bool,
    pub applicable_regulations: Vec<String>,
    pub compliance_threshold: f64,
    pub compliance_threshold_currency: String,
    pub must_safeguard_pii: bool,
    pub safeguards_pii: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub key: StepKey,
    pub status: StepStatus,
}

/// Stepper snapshot stored alongside the draft so the wizard can resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormState {
    pub current: StepKey,
    #[serde(default)]
    pub ready_to_submit: bool,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl FormState {
    /// State of a wizard nobody has touched yet: on the first step, which is in progress.
    pub fn initial() -> Self {
        Self {
            current: StepKey::Basic,
            ready_to_submit: false,
            steps: vec![StepRecord {
                key: StepKey::Basic,
                status: StepStatus::InProgress,
            }],
        }
    }
}

/// One organization's in-progress registration document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationDraft {
    #[serde(flatten)]
    pub business: BusinessDetails,
    pub entity: LegalPerson,
    pub contacts: Contacts,
    #[serde(flatten)]
    pub trisa: TrisaEndpoints,
    pub trixo: TrixoQuestionnaire,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<FormState>,
}

impl RegistrationDraft {
    /// Draft seeded with the static per-section defaults shown to a first-time registrant.
    pub fn default_for_wizard() -> Self {
        Self {
            business: BusinessDetails::default(),
            entity: LegalPerson {
                name: LegalPersonName {
                    name_identifiers: vec![NameIdentifier {
                        legal_person_name: String::new(),
                        legal_person_name_identifier_type: Some(NameIdentifierType::Legal),
                    }],
                    ..LegalPersonName::default()
                },
                geographic_addresses: vec![GeographicAddress {
                    address_type: AddressType::Business,
                    address_line: vec![String::new(), String::new(), String::new()],
                    ..GeographicAddress::default()
                }],
                national_identification: NationalIdentification {
                    national_identifier_type: NationalIdentifierType::LegalEntityIdentifier,
                    ..NationalIdentification::default()
                },
                ..LegalPerson::default()
            },
            contacts: Contacts::default(),
            trisa: TrisaEndpoints::default(),
            trixo: TrixoQuestionnaire {
                financial_transfers_permitted: "no".into(),
                has_required_regulatory_program: "no".into(),
                kyc_threshold_currency: "USD".into(),
                compliance_threshold_currency: "USD".into(),
                ..TrixoQuestionnaire::default()
            },
            state: None,
        }
    }

    /// Form handed out before anything was saved: wizard defaults plus the initial state.
    pub fn new_form() -> Self {
        Self {
            state: Some(FormState::initial()),
            ..Self::default_for_wizard()
        }
    }

    /// Returns a draft holding only the fields owned by `scope` (plus the stepper state).
    pub fn truncate(&self, scope: StepScope) -> Self {
        let StepScope::Step(step) = scope else {
            return self.clone();
        };
        let mut out = Self {
            state: self.state.clone(),
            ..Self::default()
        };
        out.merge_section(step, self);
        out
    }

    /// Copies the fields owned by `step` from `other` into `self`. Other sections are untouched.
    pub fn merge_section(&mut self, step: StepKey, other: &RegistrationDraft) {
        match step {
            StepKey::Basic => self.business = other.business.clone(),
            StepKey::Legal => self.entity = other.entity.clone(),
            StepKey::Contacts => self.contacts = other.contacts.clone(),
            StepKey::Trisa => self.trisa = other.trisa.clone(),
            StepKey::Trixo => self.trixo = other.trixo.clone(),
            StepKey::Review => {}
        }
    }

    pub fn section_eq(&self, step: StepKey, other: &RegistrationDraft) -> bool {
        match step {
            StepKey::Basic => self.business == other.business,
            StepKey::Legal => self.entity == other.entity,
            StepKey::Contacts => self.contacts == other.contacts,
            StepKey::Trisa => self.trisa == other.trisa,
            StepKey::Trixo => self.trixo == other.trixo,
            StepKey::Review => true,
        }
    }

    /// True when the section still holds nothing but empty values.
    pub fn section_is_empty(&self, step: StepKey) -> bool {
        self.section_eq(step, &RegistrationDraft::default())
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;

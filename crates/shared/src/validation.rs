//! Field rules for every registration step.
//!
//! The same functions run in the wizard before a section is persisted and on the
//! server for every upsert, so both error channels report identical issues.

use std::{collections::BTreeMap, net::IpAddr};

use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    BusinessCategory, Contact, ContactRole, GeographicAddress, NameIdentifier, NameIdentifierType,
    NationalIdentifierType, Network, NetworkDetails, RegistrationDraft, StepKey,
};

/// Host, colon, port whose first digit is not zero. No scheme prefix. The port must
/// also fit in a `u16`.
static TRISA_ENDPOINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-zA-Z0-9.-]+):([1-9][0-9]*)$").expect("endpoint pattern"));

static COMMON_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?\.)+[a-zA-Z0-9]{2,}$")
        .expect("common name pattern")
});

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("email pattern")
});

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)-(\d{1,2})-(\d{1,2})$").expect("date pattern"));

const EARLIEST_INCORPORATION: (i32, u32, u32) = (1800, 1, 1);
const MAX_LEGAL_NAME_LEN: usize = 100;
const MAX_ADDRESS_LINES: usize = 7;
const MAX_CUSTOMER_NUMBER_LEN: usize = 50;
const MAX_LEI_LEN: usize = 35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational; never blocks anything.
    Warning,
    /// Required field left empty; the step stays in progress but may be left.
    Missing,
    /// Hard error; blocks saving and advancing.
    Blocking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub severity: Severity,
    pub message: String,
}

/// Wire form of a single field issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub error: String,
    #[serde(default = "default_wire_severity")]
    pub severity: Severity,
}

fn default_wire_severity() -> Severity {
    Severity::Blocking
}

/// Field path to issue mapping. One issue per path; the most severe one is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationReport {
    issues: BTreeMap<String, FieldIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        path: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) {
        let path = path.into();
        let issue = FieldIssue {
            severity,
            message: message.into(),
        };
        match self.issues.get(&path) {
            Some(existing) if existing.severity >= severity => {}
            _ => {
                self.issues.insert(path, issue);
            }
        }
    }

    fn blocking(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.insert(path, Severity::Blocking, message);
    }

    fn missing(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.insert(path, Severity::Missing, message);
    }

    fn warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.insert(path, Severity::Warning, message);
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn get(&self, path: &str) -> Option<&FieldIssue> {
        self.issues.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldIssue)> {
        self.issues.iter().map(|(path, issue)| (path.as_str(), issue))
    }

    pub fn has_blocking(&self) -> bool {
        self.issues
            .values()
            .any(|issue| issue.severity == Severity::Blocking)
    }

    pub fn has_missing(&self) -> bool {
        self.issues
            .values()
            .any(|issue| issue.severity == Severity::Missing)
    }

    /// No blocking and no missing issues; warnings are allowed.
    pub fn is_clean(&self) -> bool {
        !self.has_blocking() && !self.has_missing()
    }

    pub fn first_blocking(&self) -> Option<(&str, &FieldIssue)> {
        self.iter()
            .find(|(_, issue)| issue.severity == Severity::Blocking)
    }

    pub fn warnings(&self) -> impl Iterator<Item = (&str, &FieldIssue)> {
        self.iter()
            .filter(|(_, issue)| issue.severity == Severity::Warning)
    }

    /// Merges `other` into `self`; on a shared path the issue from `other` replaces ours.
    pub fn merge(&mut self, other: ValidationReport) {
        self.issues.extend(other.issues);
    }

    pub fn for_step(&self, step: StepKey) -> ValidationReport {
        ValidationReport {
            issues: self
                .issues
                .iter()
                .filter(|(path, _)| step.owns_field(path))
                .map(|(path, issue)| (path.clone(), issue.clone()))
                .collect(),
        }
    }

    pub fn to_field_errors(&self) -> Vec<FieldError> {
        self.iter()
            .map(|(field, issue)| FieldError {
                field: field.to_string(),
                error: issue.message.clone(),
                severity: issue.severity,
            })
            .collect()
    }

    pub fn from_field_errors(errors: &[FieldError]) -> Self {
        let mut report = Self::new();
        for error in errors {
            report.insert(error.field.clone(), error.severity, error.error.clone());
        }
        report
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid field {path}: {message}")]
pub struct UploadRejection {
    pub path: String,
    pub message: String,
}

pub fn validate_step(draft: &RegistrationDraft, step: StepKey) -> ValidationReport {
    validate_step_on(draft, step, Utc::now().date_naive())
}

pub fn validate_all(draft: &RegistrationDraft) -> ValidationReport {
    validate_step(draft, StepKey::Review)
}

/// Same as [`validate_step`] with an explicit "today" for the incorporation date bound.
pub fn validate_step_on(
    draft: &RegistrationDraft,
    step: StepKey,
    today: NaiveDate,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    match step {
        StepKey::Basic => validate_basic(draft, today, &mut report),
        StepKey::Legal => validate_legal(draft, &mut report),
        StepKey::Contacts => validate_contacts(draft, &mut report),
        StepKey::Trisa => validate_trisa(draft, &mut report),
        StepKey::Trixo => validate_trixo(draft, &mut report),
        StepKey::Review => {
            validate_basic(draft, today, &mut report);
            validate_legal(draft, &mut report);
            validate_contacts(draft, &mut report);
            validate_trisa(draft, &mut report);
            validate_trixo(draft, &mut report);
        }
    }
    report
}

/// Full-document schema applied to uploaded drafts. Any blocking issue rejects the
/// whole upload; the first offending path, in step order, is reported.
pub fn validate_upload(draft: &RegistrationDraft) -> Result<ValidationReport, UploadRejection> {
    let report = validate_all(draft);
    for step in StepKey::FORM_STEPS {
        if let Some((path, issue)) = report.for_step(step).first_blocking() {
            return Err(UploadRejection {
                path: path.to_string(),
                message: issue.message.clone(),
            });
        }
    }
    Ok(report)
}

pub fn is_valid_trisa_endpoint(endpoint: &str) -> bool {
    TRISA_ENDPOINT
        .captures(endpoint)
        .and_then(|caps| caps.get(2))
        .is_some_and(|port| port.as_str().parse::<u16>().is_ok())
}

pub fn is_valid_common_name(common_name: &str) -> bool {
    COMMON_NAME.is_match(common_name)
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

/// Host part of a `host:port` endpoint, if the endpoint is well formed.
pub fn endpoint_host(endpoint: &str) -> Option<&str> {
    TRISA_ENDPOINT
        .captures(endpoint)
        .and_then(|caps| caps.get(1))
        .map(|host| host.as_str())
}

pub fn is_valid_website(website: &str) -> bool {
    match url::Url::parse(website) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IncorporationDateError {
    #[error("incorporation date must be formatted as YYYY-MM-DD with a four digit year")]
    Format,
    #[error("incorporation date is not a valid calendar date")]
    Calendar,
    #[error("incorporation date must be on or after 1800-01-01")]
    TooEarly,
    #[error("incorporation date cannot be in the future")]
    InFuture,
}

pub fn parse_incorporation_date(
    raw: &str,
    today: NaiveDate,
) -> Result<NaiveDate, IncorporationDateError> {
    let caps = ISO_DATE
        .captures(raw.trim())
        .ok_or(IncorporationDateError::Format)?;
    let year = &caps[1];
    if year.len() != 4 {
        return Err(IncorporationDateError::Format);
    }
    let year: i32 = year.parse().map_err(|_| IncorporationDateError::Format)?;
    let month: u32 = caps[2].parse().map_err(|_| IncorporationDateError::Format)?;
    let day: u32 = caps[3].parse().map_err(|_| IncorporationDateError::Format)?;
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or(IncorporationDateError::Calendar)?;

    let (min_year, min_month, min_day) = EARLIEST_INCORPORATION;
    let earliest = NaiveDate::from_ymd_opt(min_year, min_month, min_day)
        .ok_or(IncorporationDateError::Calendar)?;
    if date < earliest {
        return Err(IncorporationDateError::TooEarly);
    }
    if date > today {
        return Err(IncorporationDateError::InFuture);
    }
    Ok(date)
}

fn validate_basic(draft: &RegistrationDraft, today: NaiveDate, report: &mut ValidationReport) {
    let business = &draft.business;

    let website = business.website.trim();
    if website.is_empty() {
        report.missing("website", "website is required");
    } else if !is_valid_website(website) {
        report.blocking("website", "website must be a valid URL");
    }

    let established_on = business.established_on.trim();
    if established_on.is_empty() {
        report.missing("established_on", "incorporation date is required");
    } else if let Err(err) = parse_incorporation_date(established_on, today) {
        report.blocking("established_on", err.to_string());
    }

    if business.organization_name.trim().is_empty() {
        report.missing("organization_name", "organization name is required");
    }

    if business.business_category == BusinessCategory::UnknownEntity {
        report.missing("business_category", "business category is required");
    }

    for (idx, category) in business.vasp_categories.iter().enumerate() {
        if category.trim().is_empty() {
            report.blocking(
                format!("vasp_categories[{idx}]"),
                "vasp category cannot be blank",
            );
        }
    }
}

fn validate_name_identifiers(
    names: &[NameIdentifier],
    field: &str,
    report: &mut ValidationReport,
) {
    for (idx, name) in names.iter().enumerate() {
        let path = format!("entity.name.{field}[{idx}]");
        let legal_name = name.legal_person_name.trim();
        match (legal_name.is_empty(), name.legal_person_name_identifier_type) {
            (true, Some(_)) => report.missing(
                format!("{path}.legal_person_name"),
                "legal name is required",
            ),
            (false, None) => report.blocking(
                format!("{path}.legal_person_name_identifier_type"),
                "name identifier type is required",
            ),
            _ => {}
        }
        if legal_name.chars().count() > MAX_LEGAL_NAME_LEN {
            report.blocking(
                format!("{path}.legal_person_name"),
                format!("legal name cannot exceed {MAX_LEGAL_NAME_LEN} characters"),
            );
        }
    }
}

fn validate_address(idx: usize, address: &GeographicAddress, report: &mut ValidationReport) {
    let path = format!("entity.geographic_addresses[{idx}]");

    if address.address_line.len() > MAX_ADDRESS_LINES {
        report.blocking(
            format!("{path}.address_line"),
            format!("an address cannot have more than {MAX_ADDRESS_LINES} address lines"),
        );
    }

    let has_line = address.address_line.iter().any(|line| !line.trim().is_empty());
    let has_street = !address.street_name.trim().is_empty()
        && !address.building_number.trim().is_empty();
    if !has_line && !has_street {
        report.missing(
            format!("{path}.address_line[0]"),
            "address line 1 is required",
        );
    }

    let country = address.country.trim();
    if country.is_empty() {
        report.missing(format!("{path}.country"), "country is required");
    } else if !is_alpha2(country) {
        report.blocking(
            format!("{path}.country"),
            "country must be a two letter country code",
        );
    }
}

fn validate_legal(draft: &RegistrationDraft, report: &mut ValidationReport) {
    let entity = &draft.entity;

    validate_name_identifiers(&entity.name.name_identifiers, "name_identifiers", report);
    validate_name_identifiers(
        &entity.name.local_name_identifiers,
        "local_name_identifiers",
        report,
    );
    validate_name_identifiers(
        &entity.name.phonetic_name_identifiers,
        "phonetic_name_identifiers",
        report,
    );

    let has_legal_name = entity.name.name_identifiers.iter().any(|name| {
        name.legal_person_name_identifier_type == Some(NameIdentifierType::Legal)
            && !name.legal_person_name.trim().is_empty()
    });
    if !has_legal_name {
        report.missing(
            "entity.name.name_identifiers",
            "at least one legal name identifier is required",
        );
    }

    if entity.geographic_addresses.is_empty() {
        report.missing(
            "entity.geographic_addresses",
            "at least one geographic address is required",
        );
    }
    for (idx, address) in entity.geographic_addresses.iter().enumerate() {
        validate_address(idx, address, report);
    }

    if entity.customer_number.trim().chars().count() > MAX_CUSTOMER_NUMBER_LEN {
        report.blocking(
            "entity.customer_number",
            format!("customer number cannot exceed {MAX_CUSTOMER_NUMBER_LEN} characters"),
        );
    }

    let national = &entity.national_identification;
    let identifier = national.national_identifier.trim();
    if identifier.is_empty() {
        report.missing(
            "entity.national_identification.national_identifier",
            "national identifier is required",
        );
    }

    let authority = national.registration_authority.trim();
    if national.national_identifier_type == NationalIdentifierType::LegalEntityIdentifier {
        if !authority.is_empty() {
            report.blocking(
                "entity.national_identification.registration_authority",
                "registration authority must be empty for a Legal Entity Identifier (LEIX)",
            );
        }
        if identifier.chars().count() > MAX_LEI_LEN {
            report.blocking(
                "entity.national_identification.national_identifier",
                format!("a Legal Entity Identifier cannot exceed {MAX_LEI_LEN} characters"),
            );
        }
    } else if authority.is_empty() {
        report.missing(
            "entity.national_identification.registration_authority",
            "registration authority is required unless the identifier type is Legal Entity Identifier (LEIX)",
        );
    }

    if !national.country_of_issue.trim().is_empty() {
        report.blocking(
            "entity.national_identification.country_of_issue",
            "country of issue is only used for natural persons",
        );
    }

    let country = entity.country_of_registration.trim();
    if country.is_empty() {
        report.missing(
            "entity.country_of_registration",
            "country of registration is required",
        );
    } else if !is_alpha2(country) {
        report.blocking(
            "entity.country_of_registration",
            "country of registration must be a two letter country code",
        );
    }
}

fn validate_contact(role: ContactRole, contact: &Contact, report: &mut ValidationReport) {
    let path = format!("contacts.{}", role.as_str());
    let required = role.is_required();
    if !required && contact.is_zero() {
        return;
    }

    let name = contact.name.trim();
    if name.is_empty() {
        let message = format!("{} contact name is required", role.as_str());
        if required {
            report.blocking(format!("{path}.name"), message);
        } else {
            report.missing(format!("{path}.name"), message);
        }
    } else if name.chars().count() < 2 {
        report.blocking(
            format!("{path}.name"),
            "contact name must be at least two characters",
        );
    }

    let email = contact.email.trim();
    if email.is_empty() {
        let message = format!("{} contact email is required", role.as_str());
        if required {
            report.blocking(format!("{path}.email"), message);
        } else {
            report.missing(format!("{path}.email"), message);
        }
    } else if !is_valid_email(email) {
        report.blocking(format!("{path}.email"), "email address is not valid");
    }

    if role == ContactRole::Legal && contact.phone.trim().is_empty() {
        report.blocking(
            format!("{path}.phone"),
            "legal contact phone number is required for physical verification",
        );
    }
}

fn validate_contacts(draft: &RegistrationDraft, report: &mut ValidationReport) {
    for role in ContactRole::ALL {
        validate_contact(role, draft.contacts.get(role), report);
    }
}

fn validate_network(network: Network, details: &NetworkDetails, report: &mut ValidationReport) {
    let prefix = network.as_str();

    let endpoint = details.endpoint.trim();
    if endpoint.is_empty() {
        report.missing(format!("{prefix}.endpoint"), "trisa endpoint is required");
    } else if !is_valid_trisa_endpoint(endpoint) {
        report.blocking(format!("{prefix}.endpoint"), "trisa endpoint is not valid");
    }

    let common_name = details.common_name.trim();
    if common_name.is_empty() {
        report.missing(format!("{prefix}.common_name"), "common name is required");
    } else if !is_valid_common_name(common_name) {
        report.blocking(format!("{prefix}.common_name"), "common name is not valid");
    } else if let Some(host) = endpoint_host(endpoint) {
        if host.parse::<IpAddr>().is_err() && !host.eq_ignore_ascii_case(common_name) {
            report.warning(
                format!("{prefix}.common_name"),
                "common name should match the endpoint host without its port",
            );
        }
    }

    for (idx, dns_name) in details.dns_names.iter().enumerate() {
        let dns_name = dns_name.trim();
        if dns_name.is_empty() {
            report.blocking(format!("{prefix}.dns_names[{idx}]"), "dns name cannot be blank");
        } else if !is_valid_common_name(dns_name) {
            report.blocking(format!("{prefix}.dns_names[{idx}]"), "dns name is not valid");
        }
    }
}

fn validate_trisa(draft: &RegistrationDraft, report: &mut ValidationReport) {
    let endpoints = &draft.trisa;
    if endpoints.testnet.is_zero() && endpoints.mainnet.is_zero() {
        for network in Network::ALL {
            report.missing(
                network.as_str(),
                "either testnet or mainnet details are required",
            );
        }
        return;
    }

    for network in Network::ALL {
        let details = endpoints.get(network);
        if !details.is_zero() {
            validate_network(network, details, report);
        }
    }

    let testnet = endpoints.testnet.endpoint.trim();
    let mainnet = endpoints.mainnet.endpoint.trim();
    if !testnet.is_empty() && !mainnet.is_empty() && testnet.eq_ignore_ascii_case(mainnet) {
        report.blocking(
            "mainnet.endpoint",
            "mainnet endpoint must differ from the testnet endpoint",
        );
    }
}

fn validate_trixo(draft: &RegistrationDraft, report: &mut ValidationReport) {
    let trixo = &draft.trixo;

    let jurisdiction = trixo.primary_national_jurisdiction.trim();
    if jurisdiction.is_empty() {
        report.missing(
            "trixo.primary_national_jurisdiction",
            "primary national jurisdiction is required",
        );
    } else if !is_alpha2(jurisdiction) {
        report.blocking(
            "trixo.primary_national_jurisdiction",
            "primary national jurisdiction must be a two letter country code",
        );
    }

    if trixo.primary_regulator.trim().is_empty() {
        report.missing("trixo.primary_regulator", "primary regulator is required");
    }

    let transfers = trixo.financial_transfers_permitted.trim().to_ascii_lowercase();
    if transfers.is_empty() {
        report.missing(
            "trixo.financial_transfers_permitted",
            "financial transfers permitted is required",
        );
    } else if !matches!(transfers.as_str(), "yes" | "no" | "partially") {
        report.blocking(
            "trixo.financial_transfers_permitted",
            "must be one of yes, no or partially",
        );
    }

    for (idx, other) in trixo.other_jurisdictions.iter().enumerate() {
        let path = format!("trixo.other_jurisdictions[{idx}]");
        let country = other.country.trim();
        if country.is_empty() {
            report.missing(format!("{path}.country"), "country is required");
        } else if !is_alpha2(country) {
            report.blocking(
                format!("{path}.country"),
                "country must be a two letter country code",
            );
        }
        if other.regulator_name.trim().is_empty() {
            report.missing(format!("{path}.regulator_name"), "regulator name is required");
        }
    }

    let program = trixo.has_required_regulatory_program.trim().to_ascii_lowercase();
    if program.is_empty() {
        report.missing(
            "trixo.has_required_regulatory_program",
            "regulatory program answer is required",
        );
    } else if !matches!(program.as_str(), "yes" | "no") {
        report.blocking("trixo.has_required_regulatory_program", "must be yes or no");
    }

    if trixo.conducts_customer_kyc {
        if trixo.kyc_threshold < 0.0 {
            report.blocking("trixo.kyc_threshold", "kyc threshold cannot be negative");
        }
        if trixo.kyc_threshold_currency.trim().is_empty() {
            report.missing(
                "trixo.kyc_threshold_currency",
                "kyc threshold currency is required",
            );
        }
    }

    if trixo.must_comply_travel_rule {
        for (idx, regulation) in trixo.applicable_regulations.iter().enumerate() {
            if regulation.trim().is_empty() {
                report.blocking(
                    format!("trixo.applicable_regulations[{idx}]"),
                    "applicable regulation cannot be blank",
                );
            }
        }
        if trixo.compliance_threshold < 0.0 {
            report.blocking(
                "trixo.compliance_threshold",
                "compliance threshold cannot be negative",
            );
        }
        if trixo.compliance_threshold_currency.trim().is_empty() {
            report.missing(
                "trixo.compliance_threshold_currency",
                "compliance threshold currency is required",
            );
        }
    }
}

fn is_alpha2(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;

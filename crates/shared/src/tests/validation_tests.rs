use super::*;
use crate::{domain::TrisaEndpoints, fixtures::complete_draft};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

fn severity(report: &ValidationReport, path: &str) -> Option<Severity> {
    report.get(path).map(|issue| issue.severity)
}

#[test]
fn complete_draft_has_no_issues_at_all() {
    let report = validate_step_on(&complete_draft(), StepKey::Review, today());
    assert!(report.is_empty(), "unexpected issues: {report:?}");
}

#[test]
fn trisa_endpoint_requires_host_and_non_zero_port() {
    assert!(is_valid_trisa_endpoint("host:443"));
    assert!(is_valid_trisa_endpoint("trisa.example.io:4000"));
    assert!(!is_valid_trisa_endpoint("host:0"));
    assert!(!is_valid_trisa_endpoint("host:0443"));
    assert!(!is_valid_trisa_endpoint("host"));
    assert!(!is_valid_trisa_endpoint("https://host:443"));
    assert!(!is_valid_trisa_endpoint(":443"));
}

#[test]
fn trisa_endpoint_port_must_fit_in_sixteen_bits() {
    assert!(is_valid_trisa_endpoint("host:65535"));
    assert!(!is_valid_trisa_endpoint("host:65536"));
    assert!(!is_valid_trisa_endpoint("host:99999"));

    let mut draft = complete_draft();
    draft.trisa.testnet.endpoint = "testnet.example.com:99999".into();
    let report = validate_step_on(&draft, StepKey::Trisa, today());
    assert_eq!(severity(&report, "testnet.endpoint"), Some(Severity::Blocking));
}

#[test]
fn invalid_endpoint_is_blocking_on_its_network() {
    let mut draft = complete_draft();
    draft.trisa.testnet.endpoint = "https://testnet.example.com:443".into();

    let report = validate_step_on(&draft, StepKey::Trisa, today());
    assert_eq!(severity(&report, "testnet.endpoint"), Some(Severity::Blocking));
    assert_eq!(
        report.get("testnet.endpoint").unwrap().message,
        "trisa endpoint is not valid"
    );
    assert!(report.get("mainnet.endpoint").is_none());
}

#[test]
fn incorporation_date_bounds() {
    assert_eq!(
        parse_incorporation_date("2015-06-01", today()),
        Ok(NaiveDate::from_ymd_opt(2015, 6, 1).unwrap())
    );
    assert_eq!(
        parse_incorporation_date("275760-01-01", today()),
        Err(IncorporationDateError::Format)
    );
    assert_eq!(
        parse_incorporation_date("99-01-01", today()),
        Err(IncorporationDateError::Format)
    );
    assert_eq!(
        parse_incorporation_date("2015-02-30", today()),
        Err(IncorporationDateError::Calendar)
    );
    assert_eq!(
        parse_incorporation_date("1799-12-31", today()),
        Err(IncorporationDateError::TooEarly)
    );
    assert_eq!(
        parse_incorporation_date("2024-03-02", today()),
        Err(IncorporationDateError::InFuture)
    );
    assert!(parse_incorporation_date("2024-03-01", today()).is_ok());
}

#[test]
fn six_digit_year_blocks_the_basic_step() {
    let mut draft = complete_draft();
    draft.business.established_on = "275760-01-01".into();

    let report = validate_step_on(&draft, StepKey::Basic, today());
    assert_eq!(severity(&report, "established_on"), Some(Severity::Blocking));
}

#[test]
fn empty_required_fields_are_missing_not_blocking() {
    let mut draft = complete_draft();
    draft.business.website.clear();
    draft.business.organization_name.clear();

    let report = validate_step_on(&draft, StepKey::Basic, today());
    assert_eq!(severity(&report, "website"), Some(Severity::Missing));
    assert_eq!(severity(&report, "organization_name"), Some(Severity::Missing));
    assert!(!report.has_blocking());
    assert!(!report.is_clean());
}

#[test]
fn legal_contact_phone_is_blocking_until_filled() {
    let mut draft = complete_draft();
    draft.contacts.legal.phone.clear();

    let report = validate_step_on(&draft, StepKey::Contacts, today());
    let issue = report.get("contacts.legal.phone").unwrap();
    assert_eq!(issue.severity, Severity::Blocking);
    assert_eq!(
        issue.message,
        "legal contact phone number is required for physical verification"
    );

    draft.contacts.legal.phone = "+13565645646".into();
    let report = validate_step_on(&draft, StepKey::Contacts, today());
    assert!(report.is_empty());
}

#[test]
fn optional_contacts_are_validated_only_when_started() {
    let mut draft = complete_draft();
    draft.contacts.administrative.email = "not-an-email".into();

    let report = validate_step_on(&draft, StepKey::Contacts, today());
    assert_eq!(
        severity(&report, "contacts.administrative.email"),
        Some(Severity::Blocking)
    );
    assert_eq!(
        severity(&report, "contacts.administrative.name"),
        Some(Severity::Missing)
    );
    assert!(report.get("contacts.billing.name").is_none());
}

#[test]
fn common_name_mismatch_is_only_a_warning() {
    let mut draft = complete_draft();
    draft.trisa.mainnet.endpoint = "traveler.ciphertrace.com:443".into();
    draft.trisa.mainnet.common_name = "traveler.ciphertrace.co".into();

    let report = validate_step_on(&draft, StepKey::Trisa, today());
    assert_eq!(severity(&report, "mainnet.common_name"), Some(Severity::Warning));
    assert!(report.is_clean());
    assert_eq!(report.warnings().count(), 1);

    draft.trisa.mainnet.common_name = "traveler.ciphertrace.com".into();
    let report = validate_step_on(&draft, StepKey::Trisa, today());
    assert!(report.is_empty());
}

#[test]
fn ip_endpoints_skip_the_common_name_match() {
    let mut draft = complete_draft();
    draft.trisa.testnet.endpoint = "10.0.0.5:443".into();
    draft.trisa.testnet.common_name = "testnet.example.com".into();

    let report = validate_step_on(&draft, StepKey::Trisa, today());
    assert!(report.get("testnet.common_name").is_none());
}

#[test]
fn identical_endpoints_block_on_mainnet() {
    let mut draft = complete_draft();
    draft.trisa.mainnet.endpoint = "TESTNET.example.com:443".into();
    draft.trisa.mainnet.common_name = "testnet.example.com".into();

    let report = validate_step_on(&draft, StepKey::Trisa, today());
    assert_eq!(severity(&report, "mainnet.endpoint"), Some(Severity::Blocking));
    assert!(report.get("testnet.endpoint").is_none());
}

#[test]
fn empty_networks_are_missing_on_both_sides() {
    let mut draft = complete_draft();
    draft.trisa = TrisaEndpoints::default();

    let report = validate_step_on(&draft, StepKey::Trisa, today());
    assert_eq!(severity(&report, "testnet"), Some(Severity::Missing));
    assert_eq!(severity(&report, "mainnet"), Some(Severity::Missing));
    assert!(!report.has_blocking());
}

#[test]
fn registration_authority_depends_on_identifier_type() {
    let mut draft = complete_draft();
    draft.entity.national_identification.registration_authority = "RA000602".into();
    let report = validate_step_on(&draft, StepKey::Legal, today());
    assert_eq!(
        severity(
            &report,
            "entity.national_identification.registration_authority"
        ),
        Some(Severity::Blocking)
    );

    draft.entity.national_identification.national_identifier_type =
        NationalIdentifierType::RegistrationAuthority;
    let report = validate_step_on(&draft, StepKey::Legal, today());
    assert!(report.is_empty());

    draft.entity.national_identification.registration_authority.clear();
    let report = validate_step_on(&draft, StepKey::Legal, today());
    assert_eq!(
        severity(
            &report,
            "entity.national_identification.registration_authority"
        ),
        Some(Severity::Missing)
    );
}

#[test]
fn address_needs_a_line_or_street_and_building() {
    let mut draft = complete_draft();
    let address = &mut draft.entity.geographic_addresses[0];
    address.address_line = vec![String::new()];
    let report = validate_step_on(&draft, StepKey::Legal, today());
    assert_eq!(
        severity(&report, "entity.geographic_addresses[0].address_line[0]"),
        Some(Severity::Missing)
    );

    let address = &mut draft.entity.geographic_addresses[0];
    address.street_name = "Main Street".into();
    address.building_number = "1".into();
    let report = validate_step_on(&draft, StepKey::Legal, today());
    assert!(report.is_empty());
}

#[test]
fn named_identifier_without_type_is_blocking() {
    let mut draft = complete_draft();
    draft
        .entity
        .name
        .local_name_identifiers
        .push(NameIdentifier {
            legal_person_name: "Example".into(),
            legal_person_name_identifier_type: None,
        });

    let report = validate_step_on(&draft, StepKey::Legal, today());
    assert_eq!(
        severity(
            &report,
            "entity.name.local_name_identifiers[0].legal_person_name_identifier_type"
        ),
        Some(Severity::Blocking)
    );
}

#[test]
fn trixo_thresholds_are_checked_only_when_enabled() {
    let mut draft = complete_draft();
    draft.trixo.kyc_threshold = -1.0;
    let report = validate_step_on(&draft, StepKey::Trixo, today());
    assert_eq!(severity(&report, "trixo.kyc_threshold"), Some(Severity::Blocking));

    draft.trixo.conducts_customer_kyc = false;
    let report = validate_step_on(&draft, StepKey::Trixo, today());
    assert!(report.is_empty());
}

#[test]
fn wizard_defaults_only_block_on_required_contacts() {
    let draft = RegistrationDraft::default_for_wizard();
    let report = validate_step_on(&draft, StepKey::Review, today());

    for step in [StepKey::Basic, StepKey::Legal, StepKey::Trisa, StepKey::Trixo] {
        let section = report.for_step(step);
        assert!(!section.has_blocking(), "{step}: {section:?}");
        assert!(section.has_missing(), "{step} should report missing fields");
    }
    assert!(report.for_step(StepKey::Contacts).has_blocking());
}

#[test]
fn upload_reports_the_first_blocking_path() {
    let mut draft = complete_draft();
    draft.contacts.technical.email.clear();

    let err = validate_upload(&draft).unwrap_err();
    assert_eq!(err.path, "contacts.technical.email");

    assert!(validate_upload(&complete_draft()).is_ok());
}

#[test]
fn upload_accepts_soft_issues() {
    let mut draft = complete_draft();
    draft.trixo.primary_regulator.clear();

    let report = validate_upload(&draft).unwrap();
    assert!(report.has_missing());
}

#[test]
fn report_keeps_the_most_severe_issue_per_path() {
    let mut report = ValidationReport::new();
    report.insert("website", Severity::Blocking, "bad");
    report.insert("website", Severity::Warning, "meh");
    assert_eq!(report.get("website").unwrap().message, "bad");

    let mut server = ValidationReport::new();
    server.insert("website", Severity::Missing, "server says so");
    report.merge(server);
    assert_eq!(report.get("website").unwrap().message, "server says so");
}

#[test]
fn field_errors_round_trip_and_default_to_blocking() {
    let errors: Vec<FieldError> =
        serde_json::from_str(r#"[{"field":"website","error":"bad website"}]"#).unwrap();
    assert_eq!(errors[0].severity, Severity::Blocking);

    let report = ValidationReport::from_field_errors(&errors);
    assert!(report.has_blocking());
    assert_eq!(report.to_field_errors(), errors);
}

#[test]
fn for_step_filters_by_field_ownership() {
    let mut report = ValidationReport::new();
    report.insert("website", Severity::Missing, "a");
    report.insert("mainnet.endpoint", Severity::Blocking, "b");
    report.insert("contacts.legal.phone", Severity::Blocking, "c");

    let trisa = report.for_step(StepKey::Trisa);
    assert_eq!(trisa.len(), 1);
    assert!(trisa.get("mainnet.endpoint").is_some());
}

#[test]
fn websites_need_http_scheme_and_host() {
    assert!(is_valid_website("https://example.com"));
    assert!(is_valid_website("http://example.com/about"));
    assert!(!is_valid_website("example.com"));
    assert!(!is_valid_website("ftp://example.com"));
}

#[test]
fn emails_need_a_dotted_domain() {
    assert!(is_valid_email("alice@example.com"));
    assert!(!is_valid_email("alice@localhost"));
    assert!(!is_valid_email("alice.example.com"));
}

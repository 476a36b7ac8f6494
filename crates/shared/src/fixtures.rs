//! Ready-made drafts for tests in this workspace.

use crate::domain::{
    AddressType, BusinessCategory, BusinessDetails, Contact, Contacts, GeographicAddress,
    LegalPerson, LegalPersonName, NameIdentifier, NameIdentifierType, NationalIdentification,
    NationalIdentifierType, NetworkDetails, RegistrationDraft, TrisaEndpoints, TrixoQuestionnaire,
};

/// A draft that passes every rule without a single issue.
pub fn complete_draft() -> RegistrationDraft {
    RegistrationDraft {
        business: BusinessDetails {
            website: "https://trisa.example.com".into(),
            business_category: BusinessCategory::BusinessEntity,
            vasp_categories: vec!["Exchange".into()],
            established_on: "2015-06-01".into(),
            organization_name: "Example VASP".into(),
        },
        entity: LegalPerson {
            name: LegalPersonName {
                name_identifiers: vec![NameIdentifier {
                    legal_person_name: "Example VASP Ltd".into(),
                    legal_person_name_identifier_type: Some(NameIdentifierType::Legal),
                }],
                ..LegalPersonName::default()
            },
            geographic_addresses: vec![GeographicAddress {
                address_type: AddressType::Business,
                address_line: vec!["1 Main Street".into()],
                town_name: "Springfield".into(),
                country: "US".into(),
                ..GeographicAddress::default()
            }],
            customer_number: String::new(),
            national_identification: NationalIdentification {
                national_identifier: "5493001KJTIIGC8Y1R12".into(),
                national_identifier_type: NationalIdentifierType::LegalEntityIdentifier,
                country_of_issue: String::new(),
                registration_authority: String::new(),
            },
            country_of_registration: "US".into(),
        },
        contacts: Contacts {
            legal: Contact {
                name: "Alice Legal".into(),
                email: "alice@example.com".into(),
                phone: "+13565645646".into(),
            },
            technical: Contact {
                name: "Tom Tech".into(),
                email: "tom@example.com".into(),
                phone: String::new(),
            },
            ..Contacts::default()
        },
        trisa: TrisaEndpoints {
            testnet: NetworkDetails {
                endpoint: "testnet.example.com:443".into(),
                common_name: "testnet.example.com".into(),
                dns_names: Vec::new(),
            },
            mainnet: NetworkDetails {
                endpoint: "trisa.example.com:443".into(),
                common_name: "trisa.example.com".into(),
                dns_names: Vec::new(),
            },
        },
        trixo: TrixoQuestionnaire {
            primary_national_jurisdiction: "US".into(),
            primary_regulator: "FinCEN".into(),
            other_jurisdictions: Vec::new(),
            financial_transfers_permitted: "yes".into(),
            has_required_regulatory_program: "yes".into(),
            conducts_customer_kyc: true,
            kyc_threshold: 1000.0,
            kyc_threshold_currency: "USD".into(),
            must_comply_travel_rule: true,
            applicable_regulations: vec!["FATF Recommendation 16".into()],
            compliance_threshold: 3000.0,
            compliance_threshold_currency: "USD".into(),
            must_safeguard_pii: true,
            safeguards_pii: true,
        },
        state: None,
    }
}

use super::*;
use shared::{
    domain::{StepRecord, StepStatus},
    fixtures::complete_draft,
};

fn org(name: &str) -> OrganizationId {
    OrganizationId::from(name)
}

fn record(network: Network, id: &str) -> SubmissionRecord {
    SubmissionRecord {
        network,
        id: id.to_string(),
        status: "PENDING_REVIEW".into(),
        message: "registration received".into(),
        submitted_at: Utc::now(),
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("gds_wizard_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("storage.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn missing_draft_loads_as_fresh_form() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let acme = org("acme");
    assert!(storage.load_draft(&acme).await.expect("load").is_none());
    assert_eq!(
        storage.load_draft_or_default(&acme).await.expect("load"),
        RegistrationDraft::new_form()
    );
}

#[tokio::test]
async fn upsert_section_only_changes_that_section() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let acme = org("acme");
    let complete = complete_draft();

    storage
        .upsert_section(&acme, StepKey::Basic, &complete, None)
        .await
        .expect("basic");
    let stored = storage
        .upsert_section(&acme, StepKey::Contacts, &complete, None)
        .await
        .expect("contacts");

    assert_eq!(stored.business, complete.business);
    assert_eq!(stored.contacts, complete.contacts);
    let fresh = RegistrationDraft::new_form();
    assert!(stored.section_eq(StepKey::Legal, &fresh));
    assert!(stored.section_eq(StepKey::Trixo, &fresh));
    assert_eq!(stored.state, fresh.state);
    assert_eq!(storage.load_draft(&acme).await.expect("load"), Some(stored));
}

#[tokio::test]
async fn repeated_upsert_is_idempotent() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let acme = org("acme");
    let complete = complete_draft();

    let first = storage
        .upsert_section(&acme, StepKey::Trisa, &complete, None)
        .await
        .expect("first");
    let second = storage
        .upsert_section(&acme, StepKey::Trisa, &complete, None)
        .await
        .expect("second");
    assert_eq!(first, second);
}

#[tokio::test]
async fn upsert_keeps_previous_form_state_unless_a_new_one_is_sent() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let acme = org("acme");
    let complete = complete_draft();
    let state = FormState {
        current: StepKey::Legal,
        ready_to_submit: false,
        steps: vec![StepRecord {
            key: StepKey::Basic,
            status: StepStatus::Complete,
        }],
    };

    storage
        .upsert_section(&acme, StepKey::Basic, &complete, Some(state.clone()))
        .await
        .expect("with state");
    let stored = storage
        .upsert_section(&acme, StepKey::Legal, &complete, None)
        .await
        .expect("without state");
    assert_eq!(stored.state, Some(state));
}

#[tokio::test]
async fn replace_and_reset_drafts_per_organization() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let acme = org("acme");
    let globex = org("globex");
    let complete = complete_draft();

    storage.replace_draft(&acme, &complete).await.expect("acme");
    storage.replace_draft(&globex, &complete).await.expect("globex");

    assert!(storage
        .reset_draft(&acme, StepScope::Step(StepKey::Trixo))
        .await
        .expect("reset trixo"));
    let acme_draft = storage.load_draft(&acme).await.expect("load").expect("acme draft");
    assert!(acme_draft.section_eq(StepKey::Trixo, &RegistrationDraft::default_for_wizard()));
    assert_eq!(acme_draft.trisa, complete.trisa);

    assert!(storage.reset_draft(&acme, StepScope::All).await.expect("reset all"));
    assert!(storage.load_draft(&acme).await.expect("load").is_none());
    assert!(!storage.reset_draft(&acme, StepScope::All).await.expect("reset again"));
    assert!(!storage
        .reset_draft(&acme, StepScope::Step(StepKey::Basic))
        .await
        .expect("reset step of missing draft"));

    assert_eq!(
        storage.load_draft(&globex).await.expect("load"),
        Some(complete)
    );
    let drafts = storage.list_drafts().await.expect("list");
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].org_id, globex);
}

#[tokio::test]
async fn second_submission_for_a_network_is_refused() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let acme = org("acme");
    let first = record(Network::Testnet, "req-1");

    assert!(storage.insert_submission(&acme, &first).await.expect("first"));
    assert!(!storage
        .insert_submission(&acme, &record(Network::Testnet, "req-2"))
        .await
        .expect("second"));
    assert!(storage
        .insert_submission(&acme, &record(Network::Mainnet, "req-3"))
        .await
        .expect("mainnet"));

    let stored = storage
        .load_submission(&acme, Network::Testnet)
        .await
        .expect("load")
        .expect("testnet record");
    assert_eq!(stored.id, "req-1");
    assert_eq!(stored.status, first.status);
    assert_eq!(
        stored.submitted_at.timestamp(),
        first.submitted_at.timestamp()
    );

    let all = storage.list_submissions(Some(&acme)).await.expect("list");
    assert_eq!(all.len(), 2);
    assert!(storage
        .list_submissions(Some(&org("globex")))
        .await
        .expect("list other")
        .is_empty());
}

use std::sync::Arc;

use shared::{
    domain::{FormState, RegistrationDraft, StepKey, StepScope},
    protocol::StepReply,
    validation::{validate_step, ValidationReport},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::gateway::{DraftGateway, GatewayError};

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Stored remotely. Carries local issues merged with the server-confirmed ones.
    Saved(ValidationReport),
    /// Blocking issues were found locally; nothing was sent.
    Rejected(ValidationReport),
}

impl SaveOutcome {
    pub fn issues(&self) -> &ValidationReport {
        match self {
            SaveOutcome::Saved(issues) | SaveOutcome::Rejected(issues) => issues,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved(_))
    }
}

#[derive(Debug)]
struct SectionState {
    /// Last server-confirmed values.
    baseline: RegistrationDraft,
    working: RegistrationDraft,
    issues: ValidationReport,
}

/// Form state of a single wizard section. Clones share the same section.
#[derive(Clone)]
pub struct SectionController {
    step: StepKey,
    gateway: Arc<dyn DraftGateway>,
    state: Arc<Mutex<SectionState>>,
    save_lock: Arc<Mutex<()>>,
}

fn section_defaults(step: StepKey) -> RegistrationDraft {
    RegistrationDraft::default_for_wizard().truncate(StepScope::Step(step))
}

impl SectionController {
    pub fn new(step: StepKey, gateway: Arc<dyn DraftGateway>) -> Self {
        let defaults = section_defaults(step);
        Self {
            step,
            gateway,
            state: Arc::new(Mutex::new(SectionState {
                baseline: defaults.clone(),
                working: defaults,
                issues: ValidationReport::new(),
            })),
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn step(&self) -> StepKey {
        self.step
    }

    /// Reads the section from the remote draft and makes it both baseline and working copy.
    pub async fn load(&self) -> Result<StepReply, GatewayError> {
        let reply = self.gateway.fetch_step(StepScope::Step(self.step)).await?;
        self.hydrate(&reply.form, reply.report()).await;
        Ok(reply)
    }

    /// Like [`load`](Self::load), from a draft that was already fetched. An empty section
    /// falls back to the wizard defaults.
    pub async fn hydrate(&self, form: &RegistrationDraft, issues: ValidationReport) {
        let section = if form.section_is_empty(self.step) {
            section_defaults(self.step)
        } else {
            form.truncate(StepScope::Step(self.step))
        };
        let mut state = self.state.lock().await;
        state.baseline = section.clone();
        state.working = section;
        state.issues = issues.for_step(self.step);
        debug!(step = %self.step, "section hydrated");
    }

    /// Applies a local edit to the working copy and returns whether the section is now dirty.
    pub async fn on_field_change(&self, edit: impl FnOnce(&mut RegistrationDraft)) -> bool {
        let mut state = self.state.lock().await;
        edit(&mut state.working);
        !state.working.section_eq(self.step, &state.baseline)
    }

    /// Replaces the working section with the one held by `draft`.
    pub async fn set_section(&self, draft: &RegistrationDraft) -> bool {
        let step = self.step;
        self.on_field_change(|working| working.merge_section(step, draft))
            .await
    }

    pub async fn is_dirty(&self) -> bool {
        let state = self.state.lock().await;
        !state.working.section_eq(self.step, &state.baseline)
    }

    pub async fn working(&self) -> RegistrationDraft {
        self.state.lock().await.working.clone()
    }

    pub async fn baseline(&self) -> RegistrationDraft {
        self.state.lock().await.baseline.clone()
    }

    pub async fn issues(&self) -> ValidationReport {
        self.state.lock().await.issues.clone()
    }

    /// Runs the local rules over the working copy.
    pub async fn validate(&self) -> ValidationReport {
        let mut state = self.state.lock().await;
        let report = validate_step(&state.working, self.step);
        state.issues = report.clone();
        report
    }

    /// Persists the working copy. Saves of the same section run one at a time; a second
    /// caller waits for the first to finish. On failure the working copy is left as it was.
    pub async fn save(&self, form_state: Option<FormState>) -> Result<SaveOutcome, GatewayError> {
        let _in_flight = self.save_lock.lock().await;

        let mut payload = {
            let state = self.state.lock().await;
            state.working.truncate(StepScope::Step(self.step))
        };
        payload.state = form_state;

        let mut issues = validate_step(&payload, self.step);
        if issues.has_blocking() {
            debug!(step = %self.step, issues = issues.len(), "save refused by local rules");
            self.state.lock().await.issues = issues.clone();
            return Ok(SaveOutcome::Rejected(issues));
        }

        let reply = match self
            .gateway
            .upsert_step(StepScope::Step(self.step), &payload)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                warn!(step = %self.step, error = %err, "section save failed");
                return Err(err);
            }
        };
        issues.merge(reply.report().for_step(self.step));

        let mut state = self.state.lock().await;
        state.baseline.merge_section(self.step, &reply.form);
        state.issues = issues.clone();
        info!(step = %self.step, issues = issues.len(), "section saved");
        Ok(SaveOutcome::Saved(issues))
    }
}

#[cfg(test)]
#[path = "tests/section_tests.rs"]
mod tests;

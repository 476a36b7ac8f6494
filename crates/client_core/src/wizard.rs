use std::sync::Arc;

use shared::{
    domain::{FormState, Network, RegistrationDraft, StepKey, StepScope, StepStatus},
    protocol::{RegistrationStatus, StepReply, SubmissionRecord},
    validation::{validate_step, ValidationReport},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
    cache::CachedDraftGateway,
    gateway::{DraftGateway, GatewayError, HttpDraftGateway},
    section::{SaveOutcome, SectionController},
    stepper::{Stepper, StepperAction},
    submission::{SubmissionCoordinator, SubmissionError, SubmissionReceipt, SubmissionState},
};

#[derive(Debug, Error)]
pub enum WizardError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("step {requested} cannot be opened yet; the furthest visited step is {max_reached}")]
    JumpRefused {
        requested: StepKey,
        max_reached: StepKey,
    },
    #[error("{0} has no form section")]
    NotAForm(StepKey),
}

#[derive(Debug)]
pub enum BlockReason {
    Invalid(ValidationReport),
    Transport(GatewayError),
}

#[derive(Debug)]
pub enum NextOutcome {
    Advanced {
        to: StepKey,
        issues: ValidationReport,
    },
    Blocked(BlockReason),
    /// Already on the review step.
    AtLastStep,
}

pub struct PreviousOutcome {
    pub step: StepKey,
    /// Save of the section that was left, still running. Dropping it does not cancel the save.
    pub pending_save: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone)]
pub enum WizardEvent {
    StepChanged { from: StepKey, to: StepKey },
    Saved { step: StepKey, issues: ValidationReport },
    SaveRejected { step: StepKey, issues: ValidationReport },
    SaveFailed { step: StepKey, error: String },
    DraftReplaced,
    DraftReset,
    Submitted(SubmissionRecord),
    SubmissionFailed { network: Network, error: String },
}

/// Session state of the registration wizard: where the user is, each section's form,
/// and the submissions made so far.
pub struct RegistrationWizard {
    gateway: Arc<dyn DraftGateway>,
    stepper: Mutex<Stepper>,
    sections: Vec<SectionController>,
    submissions: SubmissionCoordinator,
    events: broadcast::Sender<WizardEvent>,
}

fn status_for(issues: &ValidationReport) -> StepStatus {
    if issues.is_clean() {
        StepStatus::Complete
    } else {
        StepStatus::InProgress
    }
}

impl RegistrationWizard {
    pub fn new(gateway: Arc<dyn DraftGateway>) -> Self {
        let sections = StepKey::FORM_STEPS
            .into_iter()
            .map(|step| SectionController::new(step, gateway.clone()))
            .collect();
        let (events, _) = broadcast::channel(256);
        Self {
            submissions: SubmissionCoordinator::new(gateway.clone()),
            gateway,
            stepper: Mutex::new(Stepper::new()),
            sections,
            events,
        }
    }

    /// Wizard talking to a registration server over HTTP, with reads cached.
    pub fn connect(server_url: &str, token: impl Into<String>) -> Result<Self, url::ParseError> {
        let http = HttpDraftGateway::new(server_url, token)?;
        Ok(Self::new(Arc::new(CachedDraftGateway::new(http))))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WizardEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: WizardEvent) {
        let _ = self.events.send(event);
    }

    pub fn gateway(&self) -> &Arc<dyn DraftGateway> {
        &self.gateway
    }

    pub fn section(&self, step: StepKey) -> Option<&SectionController> {
        self.sections.iter().find(|section| section.step() == step)
    }

    fn form_section(&self, step: StepKey) -> Result<&SectionController, WizardError> {
        self.section(step).ok_or(WizardError::NotAForm(step))
    }

    pub async fn stepper(&self) -> Stepper {
        self.stepper.lock().await.clone()
    }

    pub async fn current_step(&self) -> StepKey {
        self.stepper.lock().await.current_step()
    }

    pub async fn submission_state(&self, network: Network) -> SubmissionState {
        self.submissions.state(network).await
    }

    /// Loads the stored draft, restores the saved stepper position and picks up
    /// submissions the server already recorded.
    pub async fn resume(&self) -> Result<(), WizardError> {
        let reply = self.gateway.fetch_step(StepScope::All).await?;
        self.apply_remote_draft(&reply).await;
        let status = self.gateway.registration_status().await?;
        self.submissions.sync_status(&status).await;
        let step = self.current_step().await;
        info!(%step, "registration wizard resumed");
        Ok(())
    }

    async fn apply_remote_draft(&self, reply: &StepReply) {
        let report = reply.report();
        for section in &self.sections {
            section.hydrate(&reply.form, report.clone()).await;
        }
        let form_state = reply.form.state.clone().unwrap_or_else(FormState::initial);
        let mut stepper = self.stepper.lock().await;
        stepper.apply(StepperAction::Restore(form_state));
        // A section that already passes every rule counts as complete, whatever state was saved.
        for step in StepKey::FORM_STEPS {
            if validate_step(&reply.form, step).is_clean() {
                stepper.apply(StepperAction::SetStatus {
                    step,
                    status: StepStatus::Complete,
                });
            }
        }
        if stepper.is_at_last_step() {
            let ready = stepper.all_forms_complete();
            stepper.apply(StepperAction::SetReadyToSubmit(ready));
        }
    }

    /// Local edit of one section. A completed step drops back to in progress.
    pub async fn on_field_change(
        &self,
        step: StepKey,
        edit: impl FnOnce(&mut RegistrationDraft),
    ) -> Result<bool, WizardError> {
        let dirty = self.form_section(step)?.on_field_change(edit).await;
        if dirty {
            self.stepper
                .lock()
                .await
                .apply(StepperAction::MarkEdited(step));
        }
        Ok(dirty)
    }

    /// Saves the current section if needed and moves one step forward. Blocking issues
    /// and failed saves keep the wizard where it is, with local edits intact.
    pub async fn go_next(&self) -> Result<NextOutcome, WizardError> {
        let from = self.current_step().await;
        if !from.is_form() {
            return Ok(NextOutcome::AtLastStep);
        }
        let section = self.form_section(from)?;

        let local = section.validate().await;
        if local.has_blocking() {
            self.record_issues(from, local.clone()).await;
            return Ok(NextOutcome::Blocked(BlockReason::Invalid(local)));
        }

        let issues = if section.is_dirty().await {
            let form_state = self.prospective_state(from, &local, true).await;
            match section.save(Some(form_state)).await {
                Ok(SaveOutcome::Saved(issues)) => {
                    self.emit(WizardEvent::Saved {
                        step: from,
                        issues: issues.clone(),
                    });
                    issues
                }
                Ok(SaveOutcome::Rejected(issues)) => {
                    self.record_issues(from, issues.clone()).await;
                    return Ok(NextOutcome::Blocked(BlockReason::Invalid(issues)));
                }
                Err(err) => {
                    self.emit(WizardEvent::SaveFailed {
                        step: from,
                        error: err.to_string(),
                    });
                    return Ok(NextOutcome::Blocked(BlockReason::Transport(err)));
                }
            }
        } else {
            local
        };

        if issues.has_blocking() {
            self.record_issues(from, issues.clone()).await;
            return Ok(NextOutcome::Blocked(BlockReason::Invalid(issues)));
        }

        let snapshot = section.working().await.truncate(StepScope::Step(from));
        let to = {
            let mut stepper = self.stepper.lock().await;
            stepper.apply(StepperAction::SetIssues {
                step: from,
                issues: issues.clone(),
            });
            stepper.apply(StepperAction::SetStatus {
                step: from,
                status: status_for(&issues),
            });
            stepper.apply(StepperAction::SetFormSnapshot {
                step: from,
                form: snapshot,
            });
            stepper.apply(StepperAction::Advance);
            if stepper.is_at_last_step() {
                let ready = stepper.all_forms_complete();
                stepper.apply(StepperAction::SetReadyToSubmit(ready));
            }
            stepper.current_step()
        };
        self.emit(WizardEvent::StepChanged { from, to });
        Ok(NextOutcome::Advanced { to, issues })
    }

    /// Moves one step back without waiting on anything. A dirty section is saved in the
    /// background and its status reflects that save straight away.
    pub async fn go_previous(&self) -> PreviousOutcome {
        let from = self.current_step().await;
        if from.previous().is_none() {
            return PreviousOutcome {
                step: from,
                pending_save: None,
            };
        }

        let mut pending_save = None;
        if let Some(section) = self.section(from) {
            if section.is_dirty().await {
                let local = section.validate().await;
                let form_state = self.prospective_state(from, &local, false).await;
                {
                    let mut stepper = self.stepper.lock().await;
                    stepper.apply(StepperAction::SetStatus {
                        step: from,
                        status: status_for(&local),
                    });
                    stepper.apply(StepperAction::SetIssues {
                        step: from,
                        issues: local,
                    });
                }
                pending_save = Some(self.spawn_save(section.clone(), form_state));
            }
        }

        let to = {
            let mut stepper = self.stepper.lock().await;
            stepper.apply(StepperAction::Retreat);
            stepper.current_step()
        };
        self.emit(WizardEvent::StepChanged { from, to });
        PreviousOutcome {
            step: to,
            pending_save,
        }
    }

    fn spawn_save(&self, section: SectionController, form_state: FormState) -> JoinHandle<()> {
        let events = self.events.clone();
        tokio::spawn(async move {
            let step = section.step();
            let event = match section.save(Some(form_state)).await {
                Ok(SaveOutcome::Saved(issues)) => WizardEvent::Saved { step, issues },
                Ok(SaveOutcome::Rejected(issues)) => WizardEvent::SaveRejected { step, issues },
                Err(err) => WizardEvent::SaveFailed {
                    step,
                    error: err.to_string(),
                },
            };
            let _ = events.send(event);
        })
    }

    /// Stepper state as it will be once `from` is left, sent along with the section.
    async fn prospective_state(
        &self,
        from: StepKey,
        issues: &ValidationReport,
        forward: bool,
    ) -> FormState {
        let mut stepper = self.stepper.lock().await.clone();
        stepper.apply(StepperAction::SetStatus {
            step: from,
            status: status_for(issues),
        });
        stepper.apply(if forward {
            StepperAction::Advance
        } else {
            StepperAction::Retreat
        });
        stepper.form_state()
    }

    async fn record_issues(&self, step: StepKey, issues: ValidationReport) {
        self.stepper
            .lock()
            .await
            .apply(StepperAction::SetIssues { step, issues });
    }

    pub async fn jump_to_step(&self, step: StepKey) -> Result<StepKey, WizardError> {
        let from = {
            let mut stepper = self.stepper.lock().await;
            if !stepper.can_jump_to(step) {
                return Err(WizardError::JumpRefused {
                    requested: step,
                    max_reached: stepper.max_reached(),
                });
            }
            let from = stepper.current_step();
            stepper.apply(StepperAction::SetCurrentStep(step));
            let ready = step == StepKey::Review && stepper.all_forms_complete();
            stepper.apply(StepperAction::SetReadyToSubmit(ready));
            from
        };
        self.emit(WizardEvent::StepChanged { from, to: step });
        Ok(step)
    }

    /// Throws the stored draft away and starts over from the first step.
    pub async fn clear_and_reset(&self) -> Result<(), WizardError> {
        let reply = self.gateway.reset_draft(None).await?;
        for section in &self.sections {
            section.hydrate(&reply.form, ValidationReport::new()).await;
        }
        self.stepper.lock().await.apply(StepperAction::Clear);
        self.emit(WizardEvent::DraftReset);
        info!("registration draft cleared");
        Ok(())
    }

    /// Replaces the stored draft with an exported one and resumes from it.
    pub async fn upload_draft(&self, bytes: &[u8]) -> Result<(), WizardError> {
        let reply = self.gateway.upload_full_draft(bytes).await?;
        self.apply_remote_draft(&reply).await;
        self.emit(WizardEvent::DraftReplaced);
        Ok(())
    }

    /// Draft assembled from every section's server-confirmed values.
    pub async fn confirmed_draft(&self) -> RegistrationDraft {
        let mut draft = RegistrationDraft::default_for_wizard();
        for section in &self.sections {
            draft.merge_section(section.step(), &section.baseline().await);
        }
        draft.state = Some(self.stepper.lock().await.form_state());
        draft
    }

    pub async fn submit(&self, network: Network) -> Result<SubmissionReceipt, WizardError> {
        let draft = self.confirmed_draft().await;
        let review_reached = self.stepper.lock().await.has_reached_review();
        let receipt = match self
            .submissions
            .submit(network, &draft, review_reached)
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                self.emit(WizardEvent::SubmissionFailed {
                    network,
                    error: err.to_string(),
                });
                return Err(err.into());
            }
        };

        // Later edits belong to a new revision, so every section restarts from the stored draft.
        for section in &self.sections {
            if let Err(err) = section.load().await {
                warn!(step = %section.step(), error = %err, "could not reload section after submission");
            }
        }
        self.emit(WizardEvent::Submitted(receipt.record.clone()));
        Ok(receipt)
    }

    pub async fn registration_status(&self) -> Result<RegistrationStatus, WizardError> {
        let status = self.gateway.registration_status().await?;
        self.submissions.sync_status(&status).await;
        Ok(status)
    }
}

#[cfg(test)]
#[path = "tests/wizard_tests.rs"]
mod tests;

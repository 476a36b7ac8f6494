//! Wizard position and per-step progress, driven only through [`StepperAction`]s.

use shared::{
    domain::{FormState, RegistrationDraft, StepKey, StepRecord, StepStatus},
    validation::ValidationReport,
};

/// Number of the review step, the last one in the wizard.
pub const LAST_STEP: u8 = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct StepState {
    pub key: StepKey,
    pub status: StepStatus,
    pub issues: ValidationReport,
    /// Section values as they were when the step was last left.
    pub snapshot: Option<RegistrationDraft>,
}

impl StepState {
    fn new(key: StepKey) -> Self {
        Self {
            key,
            status: StepStatus::NotStarted,
            issues: ValidationReport::new(),
            snapshot: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepperAction {
    SetCurrentStep(StepKey),
    Advance,
    Retreat,
    /// Ignored unless it moves the step forward.
    SetStatus { step: StepKey, status: StepStatus },
    SetIssues { step: StepKey, issues: ValidationReport },
    SetFormSnapshot { step: StepKey, form: RegistrationDraft },
    /// The user changed a step: a complete step goes back to in progress.
    MarkEdited(StepKey),
    SetReadyToSubmit(bool),
    Restore(FormState),
    Clear,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stepper {
    current_step: StepKey,
    steps: Vec<StepState>,
    max_reached: StepKey,
    last_step: Option<StepKey>,
    has_reached_review: bool,
    ready_to_submit: bool,
}

impl Default for Stepper {
    fn default() -> Self {
        Self::new()
    }
}

fn rank(status: StepStatus) -> u8 {
    match status {
        StepStatus::NotStarted => 0,
        StepStatus::InProgress => 1,
        StepStatus::Complete => 2,
    }
}

impl Stepper {
    pub fn new() -> Self {
        let mut stepper = Self {
            current_step: StepKey::Basic,
            steps: StepKey::ALL.into_iter().map(StepState::new).collect(),
            max_reached: StepKey::Basic,
            last_step: None,
            has_reached_review: false,
            ready_to_submit: false,
        };
        stepper.enter(StepKey::Basic);
        stepper
    }

    pub fn apply(&mut self, action: StepperAction) {
        match action {
            StepperAction::SetCurrentStep(step) => self.move_to(step),
            StepperAction::Advance => {
                if let Some(next) = self.current_step.next() {
                    self.move_to(next);
                }
            }
            StepperAction::Retreat => {
                if let Some(previous) = self.current_step.previous() {
                    self.move_to(previous);
                }
            }
            StepperAction::SetStatus { step, status } => {
                let state = self.step_mut(step);
                if rank(status) > rank(state.status) {
                    state.status = status;
                }
            }
            StepperAction::SetIssues { step, issues } => self.step_mut(step).issues = issues,
            StepperAction::SetFormSnapshot { step, form } => {
                self.step_mut(step).snapshot = Some(form)
            }
            StepperAction::MarkEdited(step) => {
                let state = self.step_mut(step);
                if state.status == StepStatus::Complete {
                    state.status = StepStatus::InProgress;
                }
            }
            StepperAction::SetReadyToSubmit(ready) => self.ready_to_submit = ready,
            StepperAction::Restore(form_state) => self.restore(form_state),
            StepperAction::Clear => *self = Self::new(),
        }
    }

    fn step_mut(&mut self, step: StepKey) -> &mut StepState {
        &mut self.steps[usize::from(step.number() - 1)]
    }

    fn enter(&mut self, step: StepKey) {
        let state = self.step_mut(step);
        if state.status == StepStatus::NotStarted {
            state.status = StepStatus::InProgress;
        }
        if step > self.max_reached {
            self.max_reached = step;
        }
        if step == StepKey::Review {
            self.has_reached_review = true;
        }
    }

    fn move_to(&mut self, step: StepKey) {
        if step != self.current_step {
            self.last_step = Some(self.current_step);
        }
        self.current_step = step;
        self.enter(step);
    }

    fn restore(&mut self, form_state: FormState) {
        let mut restored = Self {
            current_step: form_state.current,
            steps: StepKey::ALL.into_iter().map(StepState::new).collect(),
            max_reached: StepKey::Basic,
            last_step: None,
            has_reached_review: false,
            ready_to_submit: form_state.ready_to_submit,
        };
        for record in form_state.steps {
            restored.step_mut(record.key).status = record.status;
            if record.status != StepStatus::NotStarted && record.key > restored.max_reached {
                restored.max_reached = record.key;
            }
        }
        restored.enter(form_state.current);
        restored.has_reached_review = restored.max_reached == StepKey::Review;
        *self = restored;
    }

    pub fn current_step(&self) -> StepKey {
        self.current_step
    }

    pub fn steps(&self) -> &[StepState] {
        &self.steps
    }

    pub fn step(&self, step: StepKey) -> &StepState {
        &self.steps[usize::from(step.number() - 1)]
    }

    pub fn status(&self, step: StepKey) -> StepStatus {
        self.step(step).status
    }

    pub fn max_reached(&self) -> StepKey {
        self.max_reached
    }

    /// Step the wizard most recently moved away from.
    pub fn last_step(&self) -> Option<StepKey> {
        self.last_step
    }

    pub fn has_reached_review(&self) -> bool {
        self.has_reached_review
    }

    pub fn ready_to_submit(&self) -> bool {
        self.ready_to_submit
    }

    pub fn is_at_last_step(&self) -> bool {
        self.current_step.number() == LAST_STEP
    }

    pub fn all_forms_complete(&self) -> bool {
        StepKey::FORM_STEPS
            .into_iter()
            .all(|step| self.status(step) == StepStatus::Complete)
    }

    /// Visited steps are always reachable; review also opens once every form step is complete.
    pub fn can_jump_to(&self, step: StepKey) -> bool {
        step <= self.max_reached || (step == StepKey::Review && self.all_forms_complete())
    }

    /// Snapshot persisted with the draft so a later session resumes here.
    pub fn form_state(&self) -> FormState {
        FormState {
            current: self.current_step,
            ready_to_submit: self.ready_to_submit,
            steps: self
                .steps
                .iter()
                .filter(|state| state.status != StepStatus::NotStarted)
                .map(|state| StepRecord {
                    key: state.key,
                    status: state.status,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
#[path = "tests/stepper_tests.rs"]
mod tests;

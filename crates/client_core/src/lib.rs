//! Client side of the certificate registration wizard.
//!
//! [`RegistrationWizard`] owns the step sequencer, one [`SectionController`] per form
//! section and the [`SubmissionCoordinator`], all talking to the registration server
//! through a [`DraftGateway`].

pub mod cache;
pub mod gateway;
pub mod section;
pub mod stepper;
pub mod submission;
mod wizard;

pub use cache::{CacheState, CachedDraftGateway, DraftCache};
pub use gateway::{prepare_upload, DraftGateway, GatewayError, HttpDraftGateway};
pub use section::{SaveOutcome, SectionController};
pub use stepper::{StepState, Stepper, StepperAction, LAST_STEP};
pub use submission::{
    OneTimeCredential, SubmissionCoordinator, SubmissionError, SubmissionReceipt,
    SubmissionState,
};
pub use wizard::{
    BlockReason, NextOutcome, PreviousOutcome, RegistrationWizard, WizardError, WizardEvent,
};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

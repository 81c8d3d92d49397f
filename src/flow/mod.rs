//! The cancellation wizard: steps, reasons, routing and the controller.

pub mod controller;
pub mod feature;
pub mod reason;
pub mod router;
pub mod routes;
pub mod snapshot;
pub mod step;

pub use controller::{Notification, StepInput, Transition, WizardController, WizardSession};
pub use feature::Feature;
pub use router::{StepRouter, TerminalPolicy};
pub use routes::{WizardRouteState, wizard_routes};
pub use snapshot::{SnapshotPatch, SubmissionSnapshot};
pub use step::{StepKind, StepName, SubmissionStatus};

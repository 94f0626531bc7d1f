/// Run lifecycle
pub mod run;

/// Orchestrator
pub mod orchestrator;

/// Input and output DTOs
pub mod inputs;

/// Workflow wiring from config
pub mod services;

pub use inputs::{FailureOutput, ManualReportInput, ReportOutput, UploadPrescriptionInput, UploadPrescriptionOutput};
pub use orchestrator::{Failure, FailureKind, Workflow, WorkflowInput, GENERIC_FAILURE_MESSAGE};
pub use run::{new_run_id, validate_run_id, Run, RunPath, RunStatus};

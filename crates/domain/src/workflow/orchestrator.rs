use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::run::{new_run_id, Run, RunPath, RunStatus};
use crate::{
    errors::Error,
    extraction::{ImageExtractor, PrescriptionImage},
    medicines::MedicineNameSet,
    reports::{CompiledReport, ReportCompiler, ReportStore},
    research::LinkResearcher,
};

pub const GENERIC_FAILURE_MESSAGE: &str =
    "An error occurred while generating the report. Please try again.";

/// What a run was triggered with
#[derive(Debug)]
pub enum WorkflowInput {
    /// `None` when the form was submitted without a file
    Image(Option<PrescriptionImage>),
    Manual(String),
}

impl WorkflowInput {
    pub fn path(&self) -> RunPath {
        match self {
            Self::Image(_) => RunPath::Image,
            Self::Manual(_) => RunPath::Manual,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Input,
    ExternalService,
    Io,
    Internal,
}

/// Error surfaced to callers of the workflow.
///
/// Input failures keep their message since it tells the user what to fix.
/// Everything else carries a generic message; details go to the logs.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct Failure {
    pub run_id: String,
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn from_error(run_id: impl Into<String>, err: &Error) -> Self {
        let (kind, message) = match err {
            Error::Input { message } => (FailureKind::Input, message.clone()),
            Error::ExternalService { .. } => (FailureKind::ExternalService, GENERIC_FAILURE_MESSAGE.to_string()),
            Error::Io { .. } => (FailureKind::Io, GENERIC_FAILURE_MESSAGE.to_string()),
            _ => (FailureKind::Internal, GENERIC_FAILURE_MESSAGE.to_string()),
        };
        Self {
            run_id: run_id.into(),
            kind,
            message,
        }
    }
}

/// Runs extraction, research and compilation for one trigger at a time
pub struct Workflow {
    extractor: ImageExtractor,
    researcher: LinkResearcher,
    compiler: ReportCompiler,
}

impl Workflow {
    pub fn new(extractor: ImageExtractor, researcher: LinkResearcher, compiler: ReportCompiler) -> Self {
        Self {
            extractor,
            researcher,
            compiler,
        }
    }

    pub fn reports(&self) -> &Arc<dyn ReportStore> {
        self.compiler.store()
    }

    pub async fn from_image(&self, image: Option<PrescriptionImage>) -> Result<CompiledReport, Failure> {
        self.execute(new_run_id(), WorkflowInput::Image(image)).await
    }

    pub async fn manual(&self, medicine_names: &str) -> Result<CompiledReport, Failure> {
        self.execute(new_run_id(), WorkflowInput::Manual(medicine_names.to_string()))
            .await
    }

    /// Runs the workflow under a caller-chosen run id, such as the one an
    /// upload was keyed by
    pub async fn execute(&self, run_id: impl Into<String>, input: WorkflowInput) -> Result<CompiledReport, Failure> {
        let run_id = run_id.into();
        let mut run = Run::with_id(run_id.as_str(), input.path()).map_err(|e| Failure::from_error(&run_id, &e))?;

        info!(run_id = %run.id, path = %run.path, "Workflow started");

        match self.drive(&mut run, input).await {
            Ok(report) => {
                info!(run_id = %run.id, status = %run.status, location = %report.location, "Workflow finished");
                Ok(report)
            }
            Err(err) => {
                let stage = run.status;
                run.fail();
                match &err {
                    Error::Input { .. } => {
                        warn!(run_id = %run.id, stage = %stage, error = %err, "Workflow rejected input")
                    }
                    _ => error!(run_id = %run.id, stage = %stage, error = %err, "Workflow failed"),
                }
                Err(Failure::from_error(&run.id, &err))
            }
        }
    }

    async fn drive(&self, run: &mut Run, input: WorkflowInput) -> Result<CompiledReport, Error> {
        let medicine_names = match input {
            WorkflowInput::Image(image) => {
                let image = image.ok_or_else(|| Error::input("no prescription uploaded"))?;
                run.advance(RunStatus::ExtractingNames)?;

                let text = self.extractor.extract(&image).await?;
                if MedicineNameSet::parse(&text).is_empty() {
                    return Err(Error::input(
                        "no medicine names could be read from the prescription",
                    ));
                }
                text
            }
            WorkflowInput::Manual(text) => {
                if MedicineNameSet::parse(&text).is_empty() {
                    return Err(Error::input("no medicines entered"));
                }
                text
            }
        };

        run.advance(RunStatus::Researching)?;
        let findings = self.researcher.research(&medicine_names).await?;

        run.advance(RunStatus::Compiling)?;
        let report = self.compiler.compile(&run.id, &findings).await?;

        run.advance(RunStatus::Done)?;
        Ok(report)
    }
}

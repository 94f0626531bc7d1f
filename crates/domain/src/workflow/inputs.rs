use serde::{Deserialize, Serialize};

use super::orchestrator::{Failure, FailureKind};
use crate::reports::CompiledReport;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManualReportInput {
    /// Comma, semicolon or newline separated medicine names
    pub medicines: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadPrescriptionInput {
    pub file_name: String,
    pub content_type: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadPrescriptionOutput {
    pub run_id: String,
    pub upload_url: String,
    pub key: String,
    pub expires_in_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportOutput {
    pub run_id: String,
    pub report: String,
    pub download_url: String,
    pub medicine_count: usize,
    pub missing_count: usize,
}

impl ReportOutput {
    pub fn new(report: CompiledReport) -> Self {
        Self {
            download_url: format!("/reports/{}", report.run_id),
            run_id: report.run_id,
            report: report.content,
            medicine_count: report.medicine_count,
            missing_count: report.missing_count,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailureOutput {
    pub run_id: String,
    pub kind: FailureKind,
    pub error: String,
}

impl From<Failure> for FailureOutput {
    fn from(failure: Failure) -> Self {
        Self {
            run_id: failure.run_id,
            kind: failure.kind,
            error: failure.message,
        }
    }
}

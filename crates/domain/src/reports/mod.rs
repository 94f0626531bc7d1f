/// ReportCompiler and markdown rendering
pub mod compiler;

/// Report artifact storage
pub mod store;

pub use compiler::{render, CompiledReport, ReportCompiler};
pub use store::{FsReportStore, ReportStore, S3ReportStore};

//! Prescription to purchase-links domain

/// Environment configuration
pub mod config;

/// Domain errors
pub mod errors;

/// Medicine names and parsing
pub mod medicines;

/// Prescription image reading
pub mod extraction;

/// Purchase link research
pub mod research;

/// Report rendering and storage
pub mod reports;

/// Workflow runs and orchestration
pub mod workflow;

/// Visitor log
pub mod visitors;

pub use config::Config;
pub use errors::Error;
pub use medicines::{Medicine, MedicineNameSet};
pub use workflow::{Failure, FailureKind, Workflow, WorkflowInput};

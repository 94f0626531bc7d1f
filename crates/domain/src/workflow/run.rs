use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use ulid::Ulid;

use crate::errors::Error;

/// Workflow run status
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Triggered, nothing called yet
    #[default]
    Idle,
    /// Waiting on the vision service
    ExtractingNames,
    /// Waiting on the search tools
    Researching,
    /// Rendering and storing the report
    Compiling,
    Done,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ExtractingNames => "extracting_names",
            Self::Researching => "researching",
            Self::Compiling => "compiling",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Which trigger started the run
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RunPath {
    Image,
    Manual,
}

impl fmt::Display for RunPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

/// One workflow invocation
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct Run {
    pub id: String,
    pub path: RunPath,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn new_run_id() -> String {
    Ulid::new().to_string()
}

/// Run ids double as storage keys, so only ULIDs are accepted
pub fn validate_run_id(id: &str) -> Result<(), Error> {
    Ulid::from_string(id)
        .map(|_| ())
        .map_err(|_| Error::input(format!("invalid run id '{}'", id)))
}

impl Run {
    pub fn new(path: RunPath) -> Self {
        let now = Utc::now();
        Self {
            id: new_run_id(),
            path,
            status: RunStatus::Idle,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(id: impl Into<String>, path: RunPath) -> Result<Self, Error> {
        let id = id.into();
        validate_run_id(&id)?;
        Ok(Self { id, ..Self::new(path) })
    }

    pub fn advance(&mut self, to: RunStatus) -> Result<(), Error> {
        self.validate_transition(to)?;

        info!(run_id = %self.id, path = %self.path, from = %self.status, to = %to, "Run advanced");
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Moves any unfinished run to `Failed`; finished runs are left alone
    pub fn fail(&mut self) {
        if !self.status.is_terminal() {
            self.status = RunStatus::Failed;
            self.updated_at = Utc::now();
        }
    }

    fn validate_transition(&self, to: RunStatus) -> Result<(), Error> {
        use RunStatus::*;

        let allowed = match (self.path, self.status, to) {
            (_, from, Failed) => !from.is_terminal(),
            (RunPath::Image, Idle, ExtractingNames) => true,
            (RunPath::Image, ExtractingNames, Researching) => true,
            (RunPath::Manual, Idle, Researching) => true,
            (_, Researching, Compiling) => true,
            (_, Compiling, Done) => true,
            _ => false,
        };

        if !allowed {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_path_walks_every_stage() {
        let mut run = Run::new(RunPath::Image);
        for to in [
            RunStatus::ExtractingNames,
            RunStatus::Researching,
            RunStatus::Compiling,
            RunStatus::Done,
        ] {
            run.advance(to).unwrap();
        }
        assert_eq!(run.status, RunStatus::Done);
    }

    #[test]
    fn manual_path_skips_extraction() {
        let mut run = Run::new(RunPath::Manual);
        let err = run.advance(RunStatus::ExtractingNames).unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));

        run.advance(RunStatus::Researching).unwrap();
        run.advance(RunStatus::Compiling).unwrap();
        run.advance(RunStatus::Done).unwrap();
    }

    #[test]
    fn image_path_cannot_skip_extraction() {
        let mut run = Run::new(RunPath::Image);
        assert!(run.advance(RunStatus::Researching).is_err());
        assert!(run.advance(RunStatus::Done).is_err());
        assert_eq!(run.status, RunStatus::Idle);
    }

    #[test]
    fn fail_from_any_unfinished_state() {
        let mut run = Run::new(RunPath::Image);
        run.advance(RunStatus::ExtractingNames).unwrap();
        run.fail();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.advance(RunStatus::Researching).is_err());
    }

    #[test]
    fn done_runs_stay_done() {
        let mut run = Run::new(RunPath::Manual);
        run.advance(RunStatus::Researching).unwrap();
        run.advance(RunStatus::Compiling).unwrap();
        run.advance(RunStatus::Done).unwrap();

        run.fail();
        assert_eq!(run.status, RunStatus::Done);
        assert!(run.advance(RunStatus::Failed).is_err());
    }

    #[test]
    fn run_ids_are_ulids() {
        let run = Run::new(RunPath::Manual);
        assert!(validate_run_id(&run.id).is_ok());
        assert!(Run::with_id("not-a-ulid", RunPath::Image).is_err());
        assert!(validate_run_id("../etc").is_err());

        let id = new_run_id();
        assert_eq!(Run::with_id(id.clone(), RunPath::Image).unwrap().id, id);
    }
}

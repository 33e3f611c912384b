use thiserror::Error;

use crate::domain::architecture::ProjectId;
use crate::domain::deployment::{ProjectStatus, RunId, RunStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid run transition from {from:?} to {to:?}")]
    InvalidRunTransition { from: RunStatus, to: RunStatus },
    #[error("run {0} is already terminal")]
    RunAlreadyTerminal(RunId),
    #[error("project {project_id} is busy ({status:?}); wait for the current run to finish")]
    ProjectBusy { project_id: ProjectId, status: ProjectStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Stable machine-readable class used in command output envelopes.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::ProjectBusy { .. }) => "project_busy",
            Self::Domain(_) => "domain",
            Self::Persistence(_) => "persistence",
            Self::Integration(_) => "integration",
            Self::Configuration(_) => "configuration",
        }
    }
}

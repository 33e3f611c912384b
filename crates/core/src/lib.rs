pub mod config;
pub mod domain;
pub mod errors;
pub mod naming;
pub mod safety;
pub mod tracker;
pub mod validation;

pub use domain::architecture::{
    ArchitectureGraph, ArchitectureVersion, GraphEdge, GraphNode, IacBundle, ProjectId,
};
pub use domain::deployment::{
    DeploymentAction, DeploymentRun, ProjectStatus, RunId, RunStatus,
};
pub use domain::state::{DeployedResource, DeployedState};
pub use errors::{ApplicationError, DomainError};
pub use safety::SafetyFinding;
pub use tracker::DeploymentTracker;
pub use validation::{GraphValidator, IssueKind, ValidationIssue};

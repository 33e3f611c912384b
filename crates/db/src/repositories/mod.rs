use async_trait::async_trait;
use thiserror::Error;

use stratus_core::domain::architecture::{
    ArchitectureGraph, ArchitectureVersion, IacBundle, ProjectId,
};
use stratus_core::domain::deployment::{DeploymentRun, ProjectStatus, RunId};

pub mod architecture;
pub mod deployment;
pub mod memory;
pub mod project;

pub use architecture::SqlArchitectureRepository;
pub use deployment::SqlDeploymentRunRepository;
pub use memory::{
    InMemoryArchitectureRepository, InMemoryDeploymentRunRepository,
    InMemoryProjectStatusRepository,
};
pub use project::SqlProjectStatusRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
}

/// Versioned architecture snapshots. There is no update path: every save appends.
#[async_trait]
pub trait ArchitectureRepository: Send + Sync {
    /// Stores the next version for the project, starting at 1.
    async fn save_next(
        &self,
        project_id: &ProjectId,
        graph: &ArchitectureGraph,
        bundle: &IacBundle,
        summary: &str,
    ) -> Result<ArchitectureVersion, RepositoryError>;

    async fn latest(
        &self,
        project_id: &ProjectId,
    ) -> Result<Option<ArchitectureVersion>, RepositoryError>;

    async fn get(
        &self,
        project_id: &ProjectId,
        version: u32,
    ) -> Result<Option<ArchitectureVersion>, RepositoryError>;
}

#[async_trait]
pub trait DeploymentRunRepository: Send + Sync {
    async fn save(&self, run: &DeploymentRun) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &RunId) -> Result<Option<DeploymentRun>, RepositoryError>;
    /// Newest first.
    async fn list_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<DeploymentRun>, RepositoryError>;
}

#[async_trait]
pub trait ProjectStatusRepository: Send + Sync {
    async fn get(&self, project_id: &ProjectId) -> Result<Option<ProjectStatus>, RepositoryError>;
    async fn set(&self, project_id: &ProjectId, status: ProjectStatus)
        -> Result<(), RepositoryError>;
}

pub(crate) fn decode<E: std::fmt::Display>(error: E) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

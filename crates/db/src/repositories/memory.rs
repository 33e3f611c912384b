use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use stratus_core::domain::architecture::{
    ArchitectureGraph, ArchitectureVersion, IacBundle, ProjectId,
};
use stratus_core::domain::deployment::{DeploymentRun, ProjectStatus, RunId};

use super::{
    ArchitectureRepository, DeploymentRunRepository, ProjectStatusRepository, RepositoryError,
};

#[derive(Default)]
pub struct InMemoryArchitectureRepository {
    versions: RwLock<HashMap<String, Vec<ArchitectureVersion>>>,
}

#[async_trait::async_trait]
impl ArchitectureRepository for InMemoryArchitectureRepository {
    async fn save_next(
        &self,
        project_id: &ProjectId,
        graph: &ArchitectureGraph,
        bundle: &IacBundle,
        summary: &str,
    ) -> Result<ArchitectureVersion, RepositoryError> {
        let mut versions = self.versions.write().await;
        let history = versions.entry(project_id.0.clone()).or_default();
        let version = ArchitectureVersion {
            project_id: project_id.clone(),
            version: history.last().map_or(1, |latest| latest.version + 1),
            graph: graph.clone(),
            bundle: bundle.clone(),
            summary: summary.to_string(),
            created_at: Utc::now(),
        };
        history.push(version.clone());
        Ok(version)
    }

    async fn latest(
        &self,
        project_id: &ProjectId,
    ) -> Result<Option<ArchitectureVersion>, RepositoryError> {
        let versions = self.versions.read().await;
        Ok(versions.get(&project_id.0).and_then(|history| history.last()).cloned())
    }

    async fn get(
        &self,
        project_id: &ProjectId,
        version: u32,
    ) -> Result<Option<ArchitectureVersion>, RepositoryError> {
        let versions = self.versions.read().await;
        Ok(versions
            .get(&project_id.0)
            .and_then(|history| history.iter().find(|entry| entry.version == version))
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryDeploymentRunRepository {
    runs: RwLock<Vec<DeploymentRun>>,
}

#[async_trait::async_trait]
impl DeploymentRunRepository for InMemoryDeploymentRunRepository {
    async fn save(&self, run: &DeploymentRun) -> Result<(), RepositoryError> {
        let mut runs = self.runs.write().await;
        match runs.iter_mut().find(|existing| existing.id == run.id) {
            Some(existing) => *existing = run.clone(),
            None => runs.push(run.clone()),
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &RunId) -> Result<Option<DeploymentRun>, RepositoryError> {
        let runs = self.runs.read().await;
        Ok(runs.iter().find(|run| &run.id == id).cloned())
    }

    async fn list_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<DeploymentRun>, RepositoryError> {
        let runs = self.runs.read().await;
        Ok(runs.iter().rev().filter(|run| &run.project_id == project_id).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryProjectStatusRepository {
    statuses: RwLock<HashMap<String, ProjectStatus>>,
}

#[async_trait::async_trait]
impl ProjectStatusRepository for InMemoryProjectStatusRepository {
    async fn get(&self, project_id: &ProjectId) -> Result<Option<ProjectStatus>, RepositoryError> {
        let statuses = self.statuses.read().await;
        Ok(statuses.get(&project_id.0).copied())
    }

    async fn set(
        &self,
        project_id: &ProjectId,
        status: ProjectStatus,
    ) -> Result<(), RepositoryError> {
        let mut statuses = self.statuses.write().await;
        statuses.insert(project_id.0.clone(), status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use stratus_core::domain::architecture::{ArchitectureGraph, IacBundle, ProjectId};
    use stratus_core::domain::deployment::{DeploymentAction, ProjectStatus};
    use stratus_core::DeploymentTracker;

    use crate::repositories::{
        ArchitectureRepository, DeploymentRunRepository, InMemoryArchitectureRepository,
        InMemoryDeploymentRunRepository, InMemoryProjectStatusRepository, ProjectStatusRepository,
    };

    #[tokio::test]
    async fn in_memory_architecture_versions_increment() {
        let repo = InMemoryArchitectureRepository::default();
        let project = ProjectId("shop".to_string());
        let graph = ArchitectureGraph::default();
        let bundle = IacBundle::new();

        let first = repo.save_next(&project, &graph, &bundle, "one").await.expect("save");
        let second = repo.save_next(&project, &graph, &bundle, "two").await.expect("save");

        assert_eq!((first.version, second.version), (1, 2));
        assert_eq!(repo.latest(&project).await.expect("latest").map(|v| v.version), Some(2));
        assert_eq!(repo.get(&project, 1).await.expect("get").map(|v| v.summary), Some("one".into()));
    }

    #[tokio::test]
    async fn in_memory_runs_update_in_place_and_list_newest_first() {
        let repo = InMemoryDeploymentRunRepository::default();
        let tracker = DeploymentTracker::new();
        let project = ProjectId("shop".to_string());
        let mut first = tracker.create_run(project.clone(), 1, DeploymentAction::Apply);
        let second = tracker.create_run(project.clone(), 1, DeploymentAction::Destroy);

        repo.save(&first).await.expect("save");
        repo.save(&second).await.expect("save");
        tracker.start(&mut first).expect("start");
        repo.save(&first).await.expect("update");

        let history = repo.list_for_project(&project).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert!(history[1].started_at.is_some());
    }

    #[tokio::test]
    async fn in_memory_project_status_round_trip() {
        let repo = InMemoryProjectStatusRepository::default();
        let project = ProjectId("shop".to_string());
        repo.set(&project, ProjectStatus::Destroying).await.expect("set");
        assert_eq!(repo.get(&project).await.expect("get"), Some(ProjectStatus::Destroying));
    }
}

//! Deployment run state machine.
//!
//! A run moves `pending -> running -> {success | failed | destroyed}` and may also fail
//! straight from `pending` when the workspace cannot be prepared. Terminal runs are
//! immutable and `completed_at` is stamped exactly once.

use chrono::Utc;
use uuid::Uuid;

use crate::domain::architecture::ProjectId;
use crate::domain::deployment::{
    DeploymentAction, DeploymentRun, ProjectStatus, RunId, RunStatus,
};
use crate::errors::DomainError;

#[derive(Clone, Debug, Default)]
pub struct DeploymentTracker;

impl DeploymentTracker {
    pub fn new() -> Self {
        Self
    }

    pub fn create_run(
        &self,
        project_id: ProjectId,
        architecture_version: u32,
        action: DeploymentAction,
    ) -> DeploymentRun {
        DeploymentRun {
            id: RunId(Uuid::new_v4().to_string()),
            project_id,
            architecture_version,
            action,
            status: RunStatus::Pending,
            logs: None,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Rejects a new run while another one is still in flight for the same project.
    pub fn ensure_idle(
        &self,
        project_id: &ProjectId,
        current: Option<ProjectStatus>,
    ) -> Result<(), DomainError> {
        match current {
            Some(status) if status.is_busy() => {
                Err(DomainError::ProjectBusy { project_id: project_id.clone(), status })
            }
            _ => Ok(()),
        }
    }

    /// Project status while a run for `action` is executing.
    pub fn in_flight_status(&self, action: DeploymentAction) -> ProjectStatus {
        match action {
            DeploymentAction::Destroy => ProjectStatus::Destroying,
            DeploymentAction::Plan | DeploymentAction::Apply => ProjectStatus::Deploying,
        }
    }

    pub fn start(&self, run: &mut DeploymentRun) -> Result<(), DomainError> {
        self.transition(run, RunStatus::Running)?;
        run.started_at = Some(Utc::now());
        Ok(())
    }

    /// Records a zero exit. Destroy runs end `destroyed`, plan and apply end `success`.
    pub fn succeed(
        &self,
        run: &mut DeploymentRun,
        logs: impl Into<String>,
    ) -> Result<ProjectStatus, DomainError> {
        let next = match run.action {
            DeploymentAction::Destroy => RunStatus::Destroyed,
            DeploymentAction::Plan | DeploymentAction::Apply => RunStatus::Success,
        };
        self.transition(run, next)?;
        run.logs = Some(logs.into());
        run.completed_at = Some(Utc::now());
        Ok(project_status_after(run.action, next))
    }

    pub fn fail(
        &self,
        run: &mut DeploymentRun,
        logs: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Result<ProjectStatus, DomainError> {
        self.transition(run, RunStatus::Failed)?;
        run.logs = Some(logs.into());
        run.error_message = Some(error_message.into());
        run.completed_at = Some(Utc::now());
        Ok(ProjectStatus::Failed)
    }

    fn transition(&self, run: &mut DeploymentRun, next: RunStatus) -> Result<(), DomainError> {
        if run.status.is_terminal() {
            return Err(DomainError::RunAlreadyTerminal(run.id.clone()));
        }
        if !can_transition(run.status, next) {
            return Err(DomainError::InvalidRunTransition { from: run.status, to: next });
        }

        tracing::debug!(
            event_name = "deployment.run.transition",
            run_id = %run.id,
            from = run.status.as_str(),
            to = next.as_str(),
            "run transition"
        );
        run.status = next;
        Ok(())
    }
}

fn can_transition(from: RunStatus, to: RunStatus) -> bool {
    matches!(
        (from, to),
        (RunStatus::Pending, RunStatus::Running)
            | (RunStatus::Pending, RunStatus::Failed)
            | (RunStatus::Running, RunStatus::Success)
            | (RunStatus::Running, RunStatus::Destroyed)
            | (RunStatus::Running, RunStatus::Failed)
    )
}

fn project_status_after(action: DeploymentAction, status: RunStatus) -> ProjectStatus {
    match (action, status) {
        (_, RunStatus::Failed) => ProjectStatus::Failed,
        (DeploymentAction::Apply, _) => ProjectStatus::Deployed,
        (DeploymentAction::Destroy, _) => ProjectStatus::Destroyed,
        (DeploymentAction::Plan, _) => ProjectStatus::Ready,
    }
}

#[cfg(test)]
mod tests {
    use super::DeploymentTracker;
    use crate::domain::architecture::ProjectId;
    use crate::domain::deployment::{DeploymentAction, ProjectStatus, RunStatus};
    use crate::errors::DomainError;

    fn project() -> ProjectId {
        ProjectId("demo".to_string())
    }

    #[test]
    fn apply_run_happy_path_marks_project_deployed() {
        let tracker = DeploymentTracker::new();
        let mut run = tracker.create_run(project(), 3, DeploymentAction::Apply);
        assert_eq!(run.status, RunStatus::Pending);

        tracker.start(&mut run).expect("start");
        assert!(run.started_at.is_some());

        let project_status = tracker.succeed(&mut run, "Apply complete!").expect("succeed");
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(project_status, ProjectStatus::Deployed);
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn destroy_success_ends_destroyed() {
        let tracker = DeploymentTracker::new();
        let mut run = tracker.create_run(project(), 1, DeploymentAction::Destroy);
        tracker.start(&mut run).expect("start");

        let project_status = tracker.succeed(&mut run, "Destroy complete!").expect("succeed");
        assert_eq!(run.status, RunStatus::Destroyed);
        assert_eq!(project_status, ProjectStatus::Destroyed);
    }

    #[test]
    fn plan_success_leaves_project_ready() {
        let tracker = DeploymentTracker::new();
        let mut run = tracker.create_run(project(), 1, DeploymentAction::Plan);
        tracker.start(&mut run).expect("start");
        assert_eq!(tracker.succeed(&mut run, "").expect("succeed"), ProjectStatus::Ready);
    }

    #[test]
    fn terminal_runs_are_immutable() {
        let tracker = DeploymentTracker::new();
        let mut run = tracker.create_run(project(), 1, DeploymentAction::Apply);
        tracker.start(&mut run).expect("start");
        tracker.fail(&mut run, "boom", "terraform apply failed (exit 1)").expect("fail");
        let completed_at = run.completed_at;

        let error = tracker.succeed(&mut run, "late").expect_err("terminal run must reject");
        assert!(matches!(error, DomainError::RunAlreadyTerminal(_)));
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.completed_at, completed_at);
        assert_eq!(run.logs.as_deref(), Some("boom"));
    }

    #[test]
    fn pending_run_can_fail_but_not_succeed() {
        let tracker = DeploymentTracker::new();
        let mut run = tracker.create_run(project(), 1, DeploymentAction::Apply);

        let error = tracker.succeed(&mut run, "").expect_err("success requires running");
        assert_eq!(
            error,
            DomainError::InvalidRunTransition { from: RunStatus::Pending, to: RunStatus::Success }
        );

        tracker.fail(&mut run, "", "workspace preparation failed").expect("fail from pending");
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.started_at.is_none());
    }

    #[test]
    fn busy_projects_reject_new_runs() {
        let tracker = DeploymentTracker::new();
        assert!(tracker.ensure_idle(&project(), Some(ProjectStatus::Destroying)).is_err());
        assert!(tracker.ensure_idle(&project(), Some(ProjectStatus::Failed)).is_ok());
        assert!(tracker.ensure_idle(&project(), None).is_ok());
        assert_eq!(tracker.in_flight_status(DeploymentAction::Plan), ProjectStatus::Deploying);
    }
}

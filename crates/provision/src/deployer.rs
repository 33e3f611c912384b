//! Runs one provisioning attempt end to end and records it.
//!
//! Every run that gets created ends terminal: workspace problems, non-zero exits and
//! runner errors all become a `failed` run with the reason on it. Only the busy gate,
//! a missing architecture, and persistence failures are returned as errors, and a
//! persistence failure after the run exists still settles the run and the project
//! status on a best-effort basis so the project never stays `deploying`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stratus_core::domain::architecture::{ArchitectureVersion, ProjectId};
use stratus_core::domain::deployment::{DeploymentAction, DeploymentRun, ProjectStatus};
use stratus_core::errors::{ApplicationError, DomainError};
use stratus_core::tracker::DeploymentTracker;
use stratus_db::repositories::{
    ArchitectureRepository, DeploymentRunRepository, ProjectStatusRepository, RepositoryError,
};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::executor::{ExecutorError, LineStream, TerraformCommand, TerraformRunner};
use crate::workspace::{WorkspaceError, WorkspaceManager};

/// Separates init output from action output in batch logs.
pub fn log_separator() -> String {
    "=".repeat(60)
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("project `{0}` has no architecture to deploy")]
    NoArchitecture(ProjectId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<DeployError> for ApplicationError {
    fn from(error: DeployError) -> Self {
        match error {
            DeployError::Domain(domain) => Self::Domain(domain),
            DeployError::NoArchitecture(project_id) => {
                Self::Configuration(format!("project `{project_id}` has no architecture to deploy"))
            }
            DeployError::Repository(repository) => Self::Persistence(repository.to_string()),
        }
    }
}

enum Outcome {
    Succeeded { logs: String },
    Failed { logs: String, error: String },
}

pub struct Deployer {
    runner: Arc<dyn TerraformRunner>,
    workspaces: WorkspaceManager,
    architectures: Arc<dyn ArchitectureRepository>,
    runs: Arc<dyn DeploymentRunRepository>,
    statuses: Arc<dyn ProjectStatusRepository>,
    tracker: DeploymentTracker,
}

impl Deployer {
    pub fn new(
        runner: Arc<dyn TerraformRunner>,
        workspaces: WorkspaceManager,
        architectures: Arc<dyn ArchitectureRepository>,
        runs: Arc<dyn DeploymentRunRepository>,
        statuses: Arc<dyn ProjectStatusRepository>,
    ) -> Self {
        Self { runner, workspaces, architectures, runs, statuses, tracker: DeploymentTracker::new() }
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Batch mode: init, then the action, each run to completion.
    pub async fn deploy(
        &self,
        project_id: &ProjectId,
        action: DeploymentAction,
    ) -> Result<DeploymentRun, DeployError> {
        let (mut run, version) = self.begin(project_id, action).await?;

        let outcome = match self.prepare(&version).await {
            Ok(workspace) => {
                let started = self.mark_running(&mut run).await;
                if let Err(error) = started {
                    return Err(self.abandon(run, error, ProjectStatus::Failed).await);
                }
                self.execute_batch(action, &workspace).await.unwrap_or_else(internal_failure)
            }
            Err(error) => preparation_failure(error),
        };

        self.finish(run, outcome).await
    }

    /// Streaming mode: every output line is sent to `sink` as it arrives and recorded
    /// on the run. The run completes even when the receiver goes away.
    pub async fn deploy_streaming(
        &self,
        project_id: &ProjectId,
        action: DeploymentAction,
        sink: mpsc::Sender<String>,
    ) -> Result<DeploymentRun, DeployError> {
        let (mut run, version) = self.begin(project_id, action).await?;
        let _ = sink.send(format!("Starting deployment (id={})...", run.id)).await;

        let outcome = match self.prepare(&version).await {
            Ok(workspace) => {
                let started = self.mark_running(&mut run).await;
                if let Err(error) = started {
                    return Err(self.abandon(run, error, ProjectStatus::Failed).await);
                }
                let mut recorded = Vec::new();
                match self.execute_stream(action, &workspace, &sink, &mut recorded).await {
                    Ok(outcome) => outcome,
                    Err(error) => {
                        recorded.push(format!("Internal error: {error}"));
                        Outcome::Failed {
                            logs: recorded.join("\n"),
                            error: format!("Internal error: {error}"),
                        }
                    }
                }
            }
            Err(error) => preparation_failure(error),
        };

        let closing = match &outcome {
            Outcome::Succeeded { .. } => "Deployment successful.".to_string(),
            Outcome::Failed { error, .. } => format!("Deployment failed: {error}"),
        };
        let _ = sink.send(closing).await;

        self.finish(run, outcome).await
    }

    async fn begin(
        &self,
        project_id: &ProjectId,
        action: DeploymentAction,
    ) -> Result<(DeploymentRun, ArchitectureVersion), DeployError> {
        let current = self.statuses.get(project_id).await?;
        if let Err(error) = self.tracker.ensure_idle(project_id, current) {
            tracing::warn!(
                event_name = "deployment.run.rejected",
                project_id = %project_id,
                action = action.as_str(),
                error = %error,
                "project already has a run in flight"
            );
            return Err(error.into());
        }

        let version = self
            .architectures
            .latest(project_id)
            .await?
            .ok_or_else(|| DeployError::NoArchitecture(project_id.clone()))?;

        let run = self.tracker.create_run(project_id.clone(), version.version, action);
        self.runs.save(&run).await?;
        let marked = self.statuses.set(project_id, self.tracker.in_flight_status(action)).await;
        if let Err(error) = marked {
            return Err(self.abandon(run, error.into(), ProjectStatus::Failed).await);
        }

        tracing::info!(
            event_name = "deployment.run.created",
            project_id = %project_id,
            run_id = %run.id,
            action = action.as_str(),
            architecture_version = version.version,
            "deployment run created"
        );
        Ok((run, version))
    }

    async fn prepare(&self, version: &ArchitectureVersion) -> Result<PathBuf, WorkspaceError> {
        self.workspaces.write_bundle(&version.project_id, &version.bundle).await
    }

    async fn mark_running(&self, run: &mut DeploymentRun) -> Result<(), DeployError> {
        self.tracker.start(run)?;
        self.runs.save(run).await?;
        Ok(())
    }

    async fn execute_batch(
        &self,
        action: DeploymentAction,
        workspace: &Path,
    ) -> Result<Outcome, ExecutorError> {
        let init = self.runner.init(workspace).await?;
        if !init.success() {
            return Ok(Outcome::Failed {
                logs: init.output,
                error: "terraform init failed".to_string(),
            });
        }

        let result = self.runner.run(TerraformCommand::from(action), workspace).await?;
        let logs = format!("{}\n{}\n{}", init.output, log_separator(), result.output);
        if result.success() {
            Ok(Outcome::Succeeded { logs })
        } else {
            Ok(Outcome::Failed {
                logs,
                error: format!("terraform {} failed (exit {})", action.as_str(), result.exit_code),
            })
        }
    }

    async fn execute_stream(
        &self,
        action: DeploymentAction,
        workspace: &Path,
        sink: &mpsc::Sender<String>,
        recorded: &mut Vec<String>,
    ) -> Result<Outcome, ExecutorError> {
        let _ = sink.send(format!("Running terraform init in {}...", workspace.display())).await;
        let init = self.runner.stream(TerraformCommand::Init, workspace).await?;
        if forward(init, sink, recorded).await.is_some() {
            return Ok(Outcome::Failed {
                logs: recorded.join("\n"),
                error: "terraform init failed".to_string(),
            });
        }

        recorded.push(log_separator());
        let _ = sink.send(format!("Running terraform {}...", action.as_str())).await;
        let stream = self.runner.stream(TerraformCommand::from(action), workspace).await?;
        let failure = forward(stream, sink, recorded).await;

        let logs = recorded.join("\n");
        Ok(match failure {
            None => Outcome::Succeeded { logs },
            Some(exit_code) => Outcome::Failed {
                logs,
                error: format!("terraform {} failed (exit {exit_code})", action.as_str()),
            },
        })
    }

    async fn finish(
        &self,
        mut run: DeploymentRun,
        outcome: Outcome,
    ) -> Result<DeploymentRun, DeployError> {
        let settled = match outcome {
            Outcome::Succeeded { logs } => self.tracker.succeed(&mut run, logs),
            Outcome::Failed { logs, error } => self.tracker.fail(&mut run, logs, error),
        };
        let project_status = match settled {
            Ok(status) => status,
            Err(error) => return Err(self.abandon(run, error.into(), ProjectStatus::Failed).await),
        };
        let saved = self.runs.save(&run).await;
        if let Err(error) = saved {
            return Err(self.abandon(run, error.into(), project_status).await);
        }
        let marked = self.statuses.set(&run.project_id, project_status).await;
        if let Err(error) = marked {
            return Err(self.abandon(run, error.into(), project_status).await);
        }

        if project_status == ProjectStatus::Failed {
            tracing::warn!(
                event_name = "deployment.run.failed",
                project_id = %run.project_id,
                run_id = %run.id,
                action = run.action.as_str(),
                error = run.error_message.as_deref().unwrap_or_default(),
                "deployment run failed"
            );
        } else {
            tracing::info!(
                event_name = "deployment.run.completed",
                project_id = %run.project_id,
                run_id = %run.id,
                action = run.action.as_str(),
                status = run.status.as_str(),
                project_status = project_status.as_str(),
                "deployment run completed"
            );
        }
        Ok(run)
    }

    /// Settles a run after `error` interrupted it: a run that is not yet terminal is
    /// failed, the run is saved again, and the project leaves its in-flight status.
    /// `settled` is the project status to use when the run record is stored; if the
    /// save fails too the project falls back to `failed`. Returns `error` unchanged.
    async fn abandon(
        &self,
        mut run: DeploymentRun,
        error: DeployError,
        settled: ProjectStatus,
    ) -> DeployError {
        let mut project_status = settled;
        if !run.status.is_terminal() {
            let message = format!("Internal error: {error}");
            match self.tracker.fail(&mut run, message.clone(), message) {
                Ok(status) => project_status = status,
                Err(transition) => tracing::warn!(
                    event_name = "deployment.run.abandon_transition_failed",
                    run_id = %run.id,
                    error = %transition,
                    "could not fail interrupted run"
                ),
            }
        }

        if let Err(save_error) = self.runs.save(&run).await {
            tracing::warn!(
                event_name = "deployment.run.abandon_save_failed",
                project_id = %run.project_id,
                run_id = %run.id,
                error = %save_error,
                "could not store interrupted run"
            );
            project_status = ProjectStatus::Failed;
        }
        if let Err(status_error) = self.statuses.set(&run.project_id, project_status).await {
            tracing::error!(
                event_name = "deployment.run.abandon_status_failed",
                project_id = %run.project_id,
                run_id = %run.id,
                error = %status_error,
                "could not reset project status"
            );
        }

        tracing::error!(
            event_name = "deployment.run.abandoned",
            project_id = %run.project_id,
            run_id = %run.id,
            action = run.action.as_str(),
            run_status = run.status.as_str(),
            project_status = project_status.as_str(),
            error = %error,
            "deployment run interrupted by a persistence error"
        );
        error
    }
}

fn preparation_failure(error: WorkspaceError) -> Outcome {
    Outcome::Failed {
        logs: String::new(),
        error: format!("workspace preparation failed: {error}"),
    }
}

fn internal_failure(error: ExecutorError) -> Outcome {
    let message = format!("Internal error: {error}");
    Outcome::Failed { logs: message.clone(), error: message }
}

/// Drains `stream` into `sink` and `recorded`. Returns the exit code when the process
/// exited non-zero; the marker line is only forwarded for display.
async fn forward(
    mut stream: LineStream,
    sink: &mpsc::Sender<String>,
    recorded: &mut Vec<String>,
) -> Option<i32> {
    while let Some(line) = stream.next_line().await {
        let _ = sink.send(line.clone()).await;
        recorded.push(line);
    }
    match stream.exit_code() {
        Some(0) => None,
        Some(code) => Some(code),
        None => Some(-1),
    }
}

use chrono::{DateTime, Utc};
use sqlx::Row;

use stratus_core::domain::architecture::ProjectId;
use stratus_core::domain::deployment::{DeploymentAction, DeploymentRun, RunId, RunStatus};

use super::{decode, DeploymentRunRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDeploymentRunRepository {
    pool: DbPool,
}

impl SqlDeploymentRunRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, project_id, architecture_version, action, status, logs, error_message,
            started_at, completed_at, created_at
     FROM deployment_runs";

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)).map_err(decode)
}

fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> Result<DeploymentRun, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode)?;
    let project_id: String = row.try_get("project_id").map_err(decode)?;
    let architecture_version: i64 = row.try_get("architecture_version").map_err(decode)?;
    let action_str: String = row.try_get("action").map_err(decode)?;
    let status_str: String = row.try_get("status").map_err(decode)?;
    let logs: Option<String> = row.try_get("logs").map_err(decode)?;
    let error_message: Option<String> = row.try_get("error_message").map_err(decode)?;
    let started_at: Option<String> = row.try_get("started_at").map_err(decode)?;
    let completed_at: Option<String> = row.try_get("completed_at").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;

    let action = DeploymentAction::parse(&action_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown action `{action_str}`")))?;
    let status = RunStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown run status `{status_str}`")))?;

    Ok(DeploymentRun {
        id: RunId(id),
        project_id: ProjectId(project_id),
        architecture_version: u32::try_from(architecture_version).map_err(decode)?,
        action,
        status,
        logs,
        error_message,
        started_at: started_at.as_deref().map(parse_timestamp).transpose()?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl DeploymentRunRepository for SqlDeploymentRunRepository {
    async fn save(&self, run: &DeploymentRun) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO deployment_runs (id, project_id, architecture_version, action, status,
                                          logs, error_message, started_at, completed_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 logs = excluded.logs,
                 error_message = excluded.error_message,
                 started_at = excluded.started_at,
                 completed_at = excluded.completed_at",
        )
        .bind(&run.id.0)
        .bind(&run.project_id.0)
        .bind(i64::from(run.architecture_version))
        .bind(run.action.as_str())
        .bind(run.status.as_str())
        .bind(&run.logs)
        .bind(&run.error_message)
        .bind(run.started_at.map(|dt| dt.to_rfc3339()))
        .bind(run.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(run.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &RunId) -> Result<Option<DeploymentRun>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_run).transpose()
    }

    async fn list_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<DeploymentRun>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE project_id = ? ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(&project_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_run).collect::<Result<Vec<_>, _>>()
    }
}

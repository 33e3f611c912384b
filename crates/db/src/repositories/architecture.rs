use chrono::{DateTime, Utc};
use sqlx::Row;

use stratus_core::domain::architecture::{
    ArchitectureGraph, ArchitectureVersion, IacBundle, ProjectId,
};

use super::{decode, ArchitectureRepository, RepositoryError};
use crate::DbPool;

pub struct SqlArchitectureRepository {
    pool: DbPool,
}

impl SqlArchitectureRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str =
    "SELECT project_id, version, graph_json, files_json, summary, created_at
     FROM architecture_versions";

fn row_to_version(row: &sqlx::sqlite::SqliteRow) -> Result<ArchitectureVersion, RepositoryError> {
    let project_id: String = row.try_get("project_id").map_err(decode)?;
    let version: i64 = row.try_get("version").map_err(decode)?;
    let graph_json: String = row.try_get("graph_json").map_err(decode)?;
    let files_json: String = row.try_get("files_json").map_err(decode)?;
    let summary: String = row.try_get("summary").map_err(decode)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode)?;

    let graph: ArchitectureGraph = serde_json::from_str(&graph_json).map_err(decode)?;
    let bundle: IacBundle = serde_json::from_str(&files_json).map_err(decode)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(decode)?;

    Ok(ArchitectureVersion {
        project_id: ProjectId(project_id),
        version: u32::try_from(version).map_err(decode)?,
        graph,
        bundle,
        summary,
        created_at,
    })
}

#[async_trait::async_trait]
impl ArchitectureRepository for SqlArchitectureRepository {
    async fn save_next(
        &self,
        project_id: &ProjectId,
        graph: &ArchitectureGraph,
        bundle: &IacBundle,
        summary: &str,
    ) -> Result<ArchitectureVersion, RepositoryError> {
        let graph_json =
            serde_json::to_string(graph).map_err(|e| RepositoryError::Encode(e.to_string()))?;
        let files_json =
            serde_json::to_string(bundle).map_err(|e| RepositoryError::Encode(e.to_string()))?;
        let created_at = Utc::now();

        // Single statement so two writers cannot claim the same version.
        let row = sqlx::query(
            "INSERT INTO architecture_versions
                 (project_id, version, graph_json, files_json, summary, created_at)
             SELECT ?, COALESCE(MAX(version), 0) + 1, ?, ?, ?, ?
             FROM architecture_versions WHERE project_id = ?
             RETURNING version",
        )
        .bind(&project_id.0)
        .bind(&graph_json)
        .bind(&files_json)
        .bind(summary)
        .bind(created_at.to_rfc3339())
        .bind(&project_id.0)
        .fetch_one(&self.pool)
        .await?;
        let version: i64 = row.try_get("version").map_err(decode)?;

        tracing::debug!(
            event_name = "db.architecture.saved",
            project_id = %project_id,
            version,
            "architecture version saved"
        );

        Ok(ArchitectureVersion {
            project_id: project_id.clone(),
            version: u32::try_from(version).map_err(decode)?,
            graph: graph.clone(),
            bundle: bundle.clone(),
            summary: summary.to_string(),
            created_at,
        })
    }

    async fn latest(
        &self,
        project_id: &ProjectId,
    ) -> Result<Option<ArchitectureVersion>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE project_id = ? ORDER BY version DESC LIMIT 1"
        ))
        .bind(&project_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_version).transpose()
    }

    async fn get(
        &self,
        project_id: &ProjectId,
        version: u32,
    ) -> Result<Option<ArchitectureVersion>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE project_id = ? AND version = ?"))
            .bind(&project_id.0)
            .bind(i64::from(version))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_version).transpose()
    }
}

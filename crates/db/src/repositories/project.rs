use chrono::Utc;
use sqlx::Row;

use stratus_core::domain::architecture::ProjectId;
use stratus_core::domain::deployment::ProjectStatus;

use super::{decode, ProjectStatusRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProjectStatusRepository {
    pool: DbPool,
}

impl SqlProjectStatusRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProjectStatusRepository for SqlProjectStatusRepository {
    async fn get(&self, project_id: &ProjectId) -> Result<Option<ProjectStatus>, RepositoryError> {
        let row = sqlx::query("SELECT status FROM project_status WHERE project_id = ?")
            .bind(&project_id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.try_get("status").map_err(decode)?;
        ProjectStatus::parse(&status)
            .map(Some)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown project status `{status}`")))
    }

    async fn set(
        &self,
        project_id: &ProjectId,
        status: ProjectStatus,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO project_status (project_id, status, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(project_id) DO UPDATE SET
                 status = excluded.status,
                 updated_at = excluded.updated_at",
        )
        .bind(&project_id.0)
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use stratus_core::domain::architecture::ProjectId;
    use stratus_core::domain::deployment::ProjectStatus;

    use super::SqlProjectStatusRepository;
    use crate::repositories::ProjectStatusRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn status_upserts_and_reads_back() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlProjectStatusRepository::new(pool);
        let project = ProjectId("shop".to_string());

        assert_eq!(repo.get(&project).await.expect("get"), None);

        repo.set(&project, ProjectStatus::Deploying).await.expect("set deploying");
        repo.set(&project, ProjectStatus::Deployed).await.expect("set deployed");
        assert_eq!(repo.get(&project).await.expect("get"), Some(ProjectStatus::Deployed));
    }
}

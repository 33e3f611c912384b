use stratus_core::domain::architecture::{ArchitectureGraph, GraphNode, IacBundle, ProjectId};
use stratus_core::domain::deployment::{DeploymentAction, ProjectStatus, RunStatus};
use stratus_core::DeploymentTracker;
use stratus_db::repositories::{
    SqlArchitectureRepository, SqlDeploymentRunRepository, SqlProjectStatusRepository,
};
use stratus_db::{
    connect_with_settings, migrations, ArchitectureRepository, DeploymentRunRepository,
    ProjectStatusRepository,
};

type ContractResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

fn sample_graph() -> ArchitectureGraph {
    ArchitectureGraph {
        nodes: vec![GraphNode {
            id: "jobs".to_string(),
            node_type: "aws_sqs".to_string(),
            label: "Jobs".to_string(),
            config: Default::default(),
        }],
        edges: Vec::new(),
    }
}

#[tokio::test]
async fn file_backed_database_survives_reconnect() -> ContractResult {
    let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("stratus.db").display());
    let project = ProjectId("queue-app".to_string());
    let mut bundle = IacBundle::new();
    bundle.insert("messaging.tf", "resource \"aws_sqs_queue\" \"jobs\" {}\n");

    let run_id = {
        let pool = connect_with_settings(&url, 2, 30).await.map_err(|e| e.to_string())?;
        migrations::run_pending(&pool).await.map_err(|e| e.to_string())?;

        let architectures = SqlArchitectureRepository::new(pool.clone());
        let saved = architectures
            .save_next(&project, &sample_graph(), &bundle, "queue only")
            .await
            .map_err(|e| e.to_string())?;
        require_eq!(saved.version, 1);

        let tracker = DeploymentTracker::new();
        let runs = SqlDeploymentRunRepository::new(pool.clone());
        let mut run = tracker.create_run(project.clone(), saved.version, DeploymentAction::Apply);
        tracker.start(&mut run).map_err(|e| e.to_string())?;
        tracker
            .fail(&mut run, "Error: no credentials", "terraform apply failed (exit 1)")
            .map_err(|e| e.to_string())?;
        runs.save(&run).await.map_err(|e| e.to_string())?;

        SqlProjectStatusRepository::new(pool.clone())
            .set(&project, ProjectStatus::Failed)
            .await
            .map_err(|e| e.to_string())?;
        pool.close().await;
        run.id
    };

    let pool = connect_with_settings(&url, 2, 30).await.map_err(|e| e.to_string())?;
    migrations::run_pending(&pool).await.map_err(|e| e.to_string())?;

    let latest = SqlArchitectureRepository::new(pool.clone())
        .latest(&project)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("latest architecture should exist")?;
    require_eq!(latest.bundle, bundle);
    require_eq!(latest.graph, sample_graph());

    let history = SqlDeploymentRunRepository::new(pool.clone())
        .list_for_project(&project)
        .await
        .map_err(|e| e.to_string())?;
    require_eq!(history.len(), 1);
    require_eq!(history[0].id, run_id);
    require_eq!(history[0].status, RunStatus::Failed);
    require!(
        history[0].error_message.as_deref() == Some("terraform apply failed (exit 1)"),
        "error message should survive reconnect, got {:?}",
        history[0].error_message
    );

    let status = SqlProjectStatusRepository::new(pool)
        .get(&project)
        .await
        .map_err(|e| e.to_string())?;
    require_eq!(status, Some(ProjectStatus::Failed));
    Ok(())
}

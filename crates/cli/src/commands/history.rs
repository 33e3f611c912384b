use clap::Args;
use serde_json::{json, Value};
use stratus_db::{DeploymentRunRepository, ProjectStatusRepository};

use crate::commands::{
    block_on, into_result, load_config, parse_project_id, persistence, CommandResult, Failure,
    GlobalOptions, Store,
};

#[derive(Clone, Debug, Args)]
pub struct HistoryArgs {
    #[arg(long)]
    pub project: String,
}

pub fn run(options: &GlobalOptions, args: &HistoryArgs) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return into_result("history", failure),
    };

    let result = block_on(async {
        let project_id = parse_project_id(&args.project)?;
        let store = Store::open(&config).await?;
        let status = store.statuses.get(&project_id).await.map_err(persistence)?;
        let runs = store.runs.list_for_project(&project_id).await.map_err(persistence)?;
        store.close().await;
        Ok::<_, Failure>((status, runs))
    })
    .and_then(|inner| inner);

    match result {
        Ok((status, runs)) => {
            let entries = runs
                .iter()
                .map(|run| {
                    json!({
                        "run_id": run.id.0,
                        "action": run.action.as_str(),
                        "status": run.status.as_str(),
                        "architecture_version": run.architecture_version,
                        "error_message": run.error_message,
                        "created_at": run.created_at.to_rfc3339(),
                        "completed_at": run.completed_at.map(|at| at.to_rfc3339()),
                    })
                })
                .collect::<Vec<Value>>();
            CommandResult::success_with_data(
                "history",
                format!("{} runs", entries.len()),
                Some(json!({
                    "project_status": status.map(|status| status.as_str()),
                    "runs": entries,
                })),
            )
        }
        Err(failure) => into_result("history", failure),
    }
}

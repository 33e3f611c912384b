use clap::Args;
use serde_json::json;
use stratus_provision::{StateReader, WorkspaceManager};

use crate::commands::{
    block_on, into_result, load_config, parse_project_id, CommandResult, GlobalOptions,
};

#[derive(Clone, Debug, Args)]
pub struct StateArgs {
    #[arg(long)]
    pub project: String,
}

pub fn run(options: &GlobalOptions, args: &StateArgs) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return into_result("state", failure),
    };
    let project_id = match parse_project_id(&args.project) {
        Ok(project_id) => project_id,
        Err(failure) => return into_result("state", failure),
    };
    let workspace = match WorkspaceManager::from_config(&config.terraform).workspace_path(&project_id)
    {
        Ok(workspace) => workspace,
        Err(error) => return CommandResult::failure("state", "workspace", error.to_string(), 8),
    };

    let state = match block_on(StateReader::new().read_state(&workspace)) {
        Ok(state) => state,
        Err(failure) => return into_result("state", failure),
    };

    match state {
        Some(state) => CommandResult::success_with_data(
            "state",
            format!("{} deployed resources", state.resource_count()),
            Some(json!({ "deployed": true, "resources": state.resources, "outputs": state.outputs })),
        ),
        None => CommandResult::success_with_data(
            "state",
            "nothing deployed yet",
            Some(json!({ "deployed": false, "resources": [], "outputs": {} })),
        ),
    }
}

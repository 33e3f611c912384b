use std::sync::Arc;

use clap::Args;
use stratus_agent::{
    AgentRuntime, AgentSettings, CapabilityRegistry, EditRequest, LlmClient,
    OpenAiCompatibleClient,
};
use stratus_core::config::AppConfig;
use stratus_core::DeploymentTracker;
use stratus_db::{ArchitectureRepository, ProjectStatusRepository};

use crate::commands::synthesize::{llm_failure, publish};
use crate::commands::{
    block_on, into_result, load_config, parse_project_id, persistence, CommandResult, Failure,
    GlobalOptions, Store,
};

#[derive(Clone, Debug, Args)]
pub struct EditArgs {
    #[arg(long, help = "Project id with at least one saved architecture version")]
    pub project: String,
    #[arg(long, help = "Natural-language description of the change")]
    pub prompt: String,
    #[arg(long, help = "Provider region written into providers.tf (defaults to aws.region)")]
    pub region: Option<String>,
    #[arg(long, help = "Human-readable project name (defaults to the project id)")]
    pub name: Option<String>,
}

pub fn run(options: &GlobalOptions, args: &EditArgs) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return into_result("edit", failure),
    };
    let client = match OpenAiCompatibleClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(error) => return into_result("edit", llm_failure(error)),
    };

    match block_on(execute(&config, Arc::new(client), args)) {
        Ok(result) => result,
        Err(failure) => into_result("edit", failure),
    }
}

/// Edits the latest architecture with an explicit model client.
pub async fn execute(config: &AppConfig, llm: Arc<dyn LlmClient>, args: &EditArgs) -> CommandResult {
    match edit(config, llm, args).await {
        Ok(result) => result,
        Err(failure) => into_result("edit", failure),
    }
}

async fn edit(
    config: &AppConfig,
    llm: Arc<dyn LlmClient>,
    args: &EditArgs,
) -> Result<CommandResult, Failure> {
    let project_id = parse_project_id(&args.project)?;
    let store = Store::open(config).await?;

    let current = store.statuses.get(&project_id).await.map_err(persistence)?;
    DeploymentTracker::new()
        .ensure_idle(&project_id, current)
        .map_err(|error| ("project_busy", error.to_string(), 9))?;

    let Some(latest) = store.architectures.latest(&project_id).await.map_err(persistence)? else {
        store.close().await;
        return Err((
            "not_found",
            format!("project `{project_id}` has no architecture to edit; run synthesize first"),
            10,
        ));
    };

    tracing::info!(
        event_name = "cli.edit.start",
        project_id = %project_id,
        base_version = latest.version,
        "editing architecture"
    );

    let runtime = AgentRuntime::new(
        llm,
        CapabilityRegistry::with_builtins(),
        AgentSettings::from(&config.agent),
    );
    let request = EditRequest {
        prompt: args.prompt.clone(),
        region: args.region.clone().unwrap_or_else(|| config.aws.region.clone()),
        project_name: args.name.clone().unwrap_or_else(|| args.project.clone()),
        current: latest.graph,
    };
    let outcome = runtime.edit(&request).await.map_err(llm_failure)?;

    publish("edit", config, store, &project_id, outcome, Some(latest.version)).await
}

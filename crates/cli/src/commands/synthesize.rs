use std::sync::Arc;

use clap::Args;
use serde_json::json;
use stratus_agent::{
    AgentRuntime, AgentSettings, CapabilityRegistry, GuardrailDecision, GuardrailIntent,
    GuardrailPolicy, LlmClient, LlmError, OpenAiCompatibleClient, SynthesisOutcome,
    SynthesisRequest,
};
use stratus_core::config::AppConfig;
use stratus_core::domain::architecture::ProjectId;
use stratus_core::domain::deployment::ProjectStatus;
use stratus_core::safety::scan_bundle;
use stratus_core::DeploymentTracker;
use stratus_db::{ArchitectureRepository, ProjectStatusRepository};
use stratus_provision::WorkspaceManager;

use crate::commands::{
    block_on, into_result, load_config, parse_project_id, persistence, CommandResult, Failure,
    GlobalOptions, Store,
};

#[derive(Clone, Debug, Args)]
pub struct SynthesizeArgs {
    #[arg(long, help = "Project id; also the workspace directory name")]
    pub project: String,
    #[arg(long, help = "Natural-language description of the infrastructure")]
    pub prompt: String,
    #[arg(long, help = "Provider region written into providers.tf (defaults to aws.region)")]
    pub region: Option<String>,
    #[arg(long, help = "Human-readable project name (defaults to the project id)")]
    pub name: Option<String>,
}

pub fn run(options: &GlobalOptions, args: &SynthesizeArgs) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return into_result("synthesize", failure),
    };
    let client = match OpenAiCompatibleClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(error) => return into_result("synthesize", llm_failure(error)),
    };

    match block_on(execute(&config, Arc::new(client), args)) {
        Ok(result) => result,
        Err(failure) => into_result("synthesize", failure),
    }
}

/// Runs the agent with an explicit model client.
pub async fn execute(
    config: &AppConfig,
    llm: Arc<dyn LlmClient>,
    args: &SynthesizeArgs,
) -> CommandResult {
    match synthesize(config, llm, args).await {
        Ok(result) => result,
        Err(failure) => into_result("synthesize", failure),
    }
}

async fn synthesize(
    config: &AppConfig,
    llm: Arc<dyn LlmClient>,
    args: &SynthesizeArgs,
) -> Result<CommandResult, Failure> {
    let project_id = parse_project_id(&args.project)?;
    let store = Store::open(config).await?;

    let current = store.statuses.get(&project_id).await.map_err(persistence)?;
    DeploymentTracker::new()
        .ensure_idle(&project_id, current)
        .map_err(|error| ("project_busy", error.to_string(), 9))?;

    let runtime = AgentRuntime::new(
        llm,
        CapabilityRegistry::with_builtins(),
        AgentSettings::from(&config.agent),
    );
    let request = SynthesisRequest {
        prompt: args.prompt.clone(),
        region: args.region.clone().unwrap_or_else(|| config.aws.region.clone()),
        project_name: args.name.clone().unwrap_or_else(|| args.project.clone()),
    };
    let outcome = runtime.synthesize(&request).await.map_err(llm_failure)?;

    publish("synthesize", config, store, &project_id, outcome, None).await
}

/// Checks the outcome against the guardrail policy, then saves it as the next version,
/// writes the workspace, and marks the project ready. Shared by synthesize and edit.
pub(crate) async fn publish(
    command: &'static str,
    config: &AppConfig,
    store: Store,
    project_id: &ProjectId,
    outcome: SynthesisOutcome,
    previous_version: Option<u32>,
) -> Result<CommandResult, Failure> {
    let findings = scan_bundle(&outcome.bundle);
    let decision = GuardrailPolicy::new(config.validation.strict).evaluate(
        &GuardrailIntent::Provision {
            project_id: &project_id.0,
            issues: &outcome.issues,
            findings: &findings,
        },
    );
    if let GuardrailDecision::Deny { reason_code, user_message, fallback_path } = &decision {
        store.close().await;
        return Ok(CommandResult::failure_with_data(
            command,
            "guardrail_denied",
            user_message.clone(),
            7,
            Some(json!({
                "reason_code": reason_code,
                "fallback_path": fallback_path,
                "issues": outcome.issues,
                "findings": findings,
            })),
        ));
    }

    let version = store
        .architectures
        .save_next(project_id, &outcome.graph, &outcome.bundle, &outcome.summary)
        .await
        .map_err(persistence)?;
    let workspace = WorkspaceManager::from_config(&config.terraform)
        .write_bundle(project_id, &outcome.bundle)
        .await
        .map_err(|error| ("workspace", error.to_string(), 8))?;
    store.statuses.set(project_id, ProjectStatus::Ready).await.map_err(persistence)?;
    store.close().await;

    tracing::info!(
        event_name = "cli.architecture.saved",
        command,
        project_id = %project_id,
        version = version.version,
        previous_version,
        rounds = outcome.rounds,
        invocations = outcome.invocation_count,
        ceiling_reached = outcome.ceiling_reached,
        "architecture synthesized"
    );

    Ok(CommandResult::success_with_data(
        command,
        format!("saved architecture version {} for `{project_id}`", version.version),
        Some(json!({
            "project_id": project_id.0,
            "version": version.version,
            "previous_version": previous_version,
            "summary": outcome.summary,
            "rounds": outcome.rounds,
            "invocations": outcome.invocation_count,
            "ceiling_reached": outcome.ceiling_reached,
            "nodes": outcome.graph.nodes.len(),
            "edges": outcome.graph.edges.len(),
            "files": outcome.bundle.filenames(),
            "workspace": workspace.display().to_string(),
            "warnings": decision.user_message(),
            "issues": outcome.issues,
            "findings": findings,
        })),
    ))
}

pub(crate) fn llm_failure(error: LlmError) -> Failure {
    let class = match &error {
        LlmError::MissingApiKey => return ("config_validation", error.to_string(), 2),
        LlmError::Authentication { .. } => "llm_authentication",
        LlmError::Connectivity(_) => "llm_connectivity",
        LlmError::Api { .. } | LlmError::Malformed(_) => "llm_response",
    };
    (class, error.to_string(), 6)
}

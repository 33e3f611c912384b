use std::io::Write;
use std::sync::Arc;

use clap::Args;
use serde_json::json;
use stratus_core::config::AppConfig;
use stratus_core::domain::deployment::{DeploymentAction, DeploymentRun, RunStatus};
use stratus_provision::{
    DeployError, Deployer, TerraformExecutor, TerraformRunner, WorkspaceManager,
};
use tokio::sync::mpsc;

use crate::commands::{
    block_on, into_result, load_config, parse_project_id, CommandResult, Failure, GlobalOptions,
    Store,
};

#[derive(Clone, Debug, Args)]
pub struct DeployArgs {
    #[arg(long)]
    pub project: String,
    #[arg(long, value_parser = parse_action, help = "plan, apply, or destroy")]
    pub action: DeploymentAction,
    #[arg(long, help = "Print terraform output to stderr line by line while it runs")]
    pub stream: bool,
}

fn parse_action(value: &str) -> Result<DeploymentAction, String> {
    DeploymentAction::parse(value)
        .ok_or_else(|| format!("unknown action `{value}` (expected plan|apply|destroy)"))
}

pub fn run(options: &GlobalOptions, args: &DeployArgs) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return into_result("deploy", failure),
    };
    let runner = TerraformExecutor::from_config(&config.terraform, &config.aws);

    match block_on(execute(&config, Arc::new(runner), args)) {
        Ok(result) => result,
        Err(failure) => into_result("deploy", failure),
    }
}

/// Runs a deployment with an explicit runner.
pub async fn execute(
    config: &AppConfig,
    runner: Arc<dyn TerraformRunner>,
    args: &DeployArgs,
) -> CommandResult {
    match deploy(config, runner, args).await {
        Ok(result) => result,
        Err(failure) => into_result("deploy", failure),
    }
}

async fn deploy(
    config: &AppConfig,
    runner: Arc<dyn TerraformRunner>,
    args: &DeployArgs,
) -> Result<CommandResult, Failure> {
    let project_id = parse_project_id(&args.project)?;
    let store = Store::open(config).await?;
    let deployer = Deployer::new(
        runner,
        WorkspaceManager::from_config(&config.terraform),
        store.architectures.clone(),
        store.runs.clone(),
        store.statuses.clone(),
    );

    let result = if args.stream {
        let (sink, mut lines) = mpsc::channel::<String>(config.terraform.stream_buffer.max(1));
        let printer = tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                let mut stderr = std::io::stderr().lock();
                let _ = writeln!(stderr, "{line}");
            }
        });
        let result = deployer.deploy_streaming(&project_id, args.action, sink).await;
        let _ = printer.await;
        result
    } else {
        deployer.deploy(&project_id, args.action).await
    };
    store.close().await;

    let run = result.map_err(deploy_failure)?;
    Ok(summarize(&run))
}

fn deploy_failure(error: DeployError) -> Failure {
    match &error {
        DeployError::Domain(_) => ("project_busy", error.to_string(), 9),
        DeployError::NoArchitecture(_) => ("not_found", error.to_string(), 10),
        DeployError::Repository(_) => ("persistence", error.to_string(), 5),
    }
}

fn summarize(run: &DeploymentRun) -> CommandResult {
    let data = json!({
        "run_id": run.id.0,
        "project_id": run.project_id.0,
        "architecture_version": run.architecture_version,
        "action": run.action.as_str(),
        "status": run.status.as_str(),
        "error_message": run.error_message,
        "logs": run.logs,
    });

    match run.status {
        RunStatus::Failed => CommandResult::failure_with_data(
            "deploy",
            "provisioning",
            run.error_message.clone().unwrap_or_else(|| "deployment failed".to_string()),
            1,
            Some(data),
        ),
        _ => CommandResult::success_with_data(
            "deploy",
            format!("terraform {} finished: {}", run.action.as_str(), run.status.as_str()),
            Some(data),
        ),
    }
}

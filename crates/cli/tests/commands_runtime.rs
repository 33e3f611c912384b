use std::collections::VecDeque;
use std::env;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use serde_json::Value;
use stratus_agent::{ChatMessage, LlmClient, LlmError};
use stratus_cli::commands::deploy::{self, DeployArgs};
use stratus_cli::commands::edit::{self, EditArgs};
use stratus_cli::commands::history::{self, HistoryArgs};
use stratus_cli::commands::state::{self, StateArgs};
use stratus_cli::commands::synthesize::{self, SynthesizeArgs};
use stratus_cli::commands::{config, doctor, migrate, GlobalOptions};
use stratus_core::config::{AppConfig, ConfigOverrides};
use stratus_core::domain::architecture::ProjectId;
use stratus_core::domain::deployment::DeploymentAction;
use stratus_db::repositories::SqlArchitectureRepository;
use stratus_db::{connect_with_settings, ArchitectureRepository};
use stratus_provision::{
    CommandOutput, ExecutorError, LineStream, TerraformCommand, TerraformRunner,
};

const BUCKET_REPLY: &str = "```json\n[{\"name\":\"create_s3_bucket\",\"parameters\":{\"bucket_id\":\"assets\",\"label\":\"Assets\"}}]\n```";

struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
        })
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        Ok(self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| "Done.".to_string()))
    }
}

struct SucceedingRunner;

#[async_trait]
impl TerraformRunner for SucceedingRunner {
    async fn run(
        &self,
        command: TerraformCommand,
        _workspace: &Path,
    ) -> Result<CommandOutput, ExecutorError> {
        Ok(CommandOutput { exit_code: 0, output: format!("{} complete", command.as_str()) })
    }

    async fn stream(
        &self,
        command: TerraformCommand,
        _workspace: &Path,
    ) -> Result<LineStream, ExecutorError> {
        Ok(LineStream::replay(vec![format!("{} complete", command.as_str())], 0))
    }
}

fn options(dir: &Path) -> GlobalOptions {
    GlobalOptions {
        config_path: None,
        overrides: ConfigOverrides {
            database_url: Some(format!("sqlite://{}", dir.join("stratus.db").display())),
            workspaces_dir: Some(dir.join("workspaces")),
            ..ConfigOverrides::default()
        },
    }
}

fn app_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite://{}", dir.join("stratus.db").display());
    config.terraform.workspaces_dir = dir.join("workspaces");
    config
}

fn synthesize_args(prompt: &str) -> SynthesizeArgs {
    SynthesizeArgs {
        project: "shop".to_string(),
        prompt: prompt.to_string(),
        region: None,
        name: None,
    }
}

#[test]
fn migrate_returns_success_with_file_database() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = migrate::run(&options(dir.path()));
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert!(dir.path().join("stratus.db").exists());
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("STRATUS_DATABASE_URL", "postgres://localhost/stratus")], || {
        let result = migrate::run(&GlobalOptions::default());
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn synthesize_without_api_key_fails_before_touching_state() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = synthesize::run(&options(dir.path()), &synthesize_args("a bucket"));
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "synthesize");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(!dir.path().join("workspaces").exists());
    });
}

#[test]
fn synthesize_deploy_and_history_share_one_store() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = app_config(dir.path());
        let runtime = tokio::runtime::Runtime::new().expect("runtime");

        let synthesized = runtime.block_on(synthesize::execute(
            &config,
            ScriptedLlm::new(&[BUCKET_REPLY, "One private bucket for static assets."]),
            &synthesize_args("static assets in a bucket"),
        ));
        assert_eq!(synthesized.exit_code, 0, "synthesize failed: {}", synthesized.output);
        let payload = parse_payload(&synthesized.output);
        assert_eq!(payload["data"]["version"], 1);
        assert_eq!(payload["data"]["files"], serde_json::json!(["providers.tf", "storage.tf"]));
        assert!(dir.path().join("workspaces/shop/storage.tf").exists());

        let deployed = runtime.block_on(deploy::execute(
            &config,
            Arc::new(SucceedingRunner),
            &DeployArgs { project: "shop".to_string(), action: DeploymentAction::Apply, stream: false },
        ));
        assert_eq!(deployed.exit_code, 0, "deploy failed: {}", deployed.output);
        let payload = parse_payload(&deployed.output);
        assert_eq!(payload["data"]["status"], "success");
        assert_eq!(payload["data"]["architecture_version"], 1);
        drop(runtime);

        let listed = history::run(&options(dir.path()), &HistoryArgs { project: "shop".to_string() });
        assert_eq!(listed.exit_code, 0, "history failed: {}", listed.output);
        let payload = parse_payload(&listed.output);
        assert_eq!(payload["data"]["project_status"], "deployed");
        assert_eq!(payload["data"]["runs"].as_array().map(Vec::len), Some(1));
        assert_eq!(payload["data"]["runs"][0]["action"], "apply");
    });
}

const QUEUE_EDIT_GRAPH: &str = r#"{"nodes":[{"id":"assets","type":"aws_s3","label":"Assets"},
    {"id":"jobs","type":"aws_sqs","label":"Jobs"}],"edges":[]}"#;

const QUEUE_EDIT_REPLY: &str = r#"[{"name":"create_s3_bucket","parameters":{"bucket_id":"assets","label":"Assets"}},
    {"name":"create_sqs_queue","parameters":{"queue_id":"jobs","label":"Jobs"}}]"#;

fn edit_args(prompt: &str) -> EditArgs {
    EditArgs { project: "shop".to_string(), prompt: prompt.to_string(), region: None, name: None }
}

#[test]
fn edit_saves_next_version_and_keeps_the_previous_one() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = app_config(dir.path());
        let runtime = tokio::runtime::Runtime::new().expect("runtime");

        let synthesized = runtime.block_on(synthesize::execute(
            &config,
            ScriptedLlm::new(&[BUCKET_REPLY, "One private bucket."]),
            &synthesize_args("static assets in a bucket"),
        ));
        assert_eq!(synthesized.exit_code, 0, "synthesize failed: {}", synthesized.output);

        let edited = runtime.block_on(edit::execute(
            &config,
            ScriptedLlm::new(&[QUEUE_EDIT_GRAPH, QUEUE_EDIT_REPLY, "Added a jobs queue."]),
            &edit_args("add a queue for background jobs"),
        ));
        assert_eq!(edited.exit_code, 0, "edit failed: {}", edited.output);
        let payload = parse_payload(&edited.output);
        assert_eq!(payload["command"], "edit");
        assert_eq!(payload["data"]["version"], 2);
        assert_eq!(payload["data"]["previous_version"], 1);
        assert_eq!(
            payload["data"]["files"],
            serde_json::json!(["messaging.tf", "providers.tf", "storage.tf"])
        );
        assert!(dir.path().join("workspaces/shop/messaging.tf").exists());

        let (first, latest) = runtime.block_on(async {
            let pool = connect_with_settings(&config.database.url, 1, 5).await.expect("pool");
            let repository = SqlArchitectureRepository::new(pool.clone());
            let project = ProjectId("shop".to_string());
            let first = repository.get(&project, 1).await.expect("get v1").expect("v1 exists");
            let latest = repository.latest(&project).await.expect("latest").expect("v2 exists");
            pool.close().await;
            (first, latest)
        });
        assert_eq!(first.graph.nodes.len(), 1);
        assert!(first.bundle.get("messaging.tf").is_none());
        assert_eq!(latest.version, 2);
        assert!(latest.graph.node("jobs").is_some());
    });
}

#[test]
fn edit_without_architecture_is_not_found() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let result = runtime.block_on(edit::execute(
            &app_config(dir.path()),
            ScriptedLlm::new(&[QUEUE_EDIT_GRAPH]),
            &edit_args("add a queue"),
        ));

        assert_eq!(result.exit_code, 10);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "edit");
        assert_eq!(payload["error_class"], "not_found");
    });
}

#[test]
fn strict_validation_blocks_dangling_edges() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = app_config(dir.path());
        config.validation.strict = true;
        let reply = r#"[{"name":"create_sqs_queue","parameters":{"queue_id":"jobs","label":"Jobs"}},
            {"name":"connect_services","parameters":{"from_service_id":"worker","to_service_id":"jobs","relationship":"polls"}}]"#;

        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let result = runtime.block_on(synthesize::execute(
            &config,
            ScriptedLlm::new(&[reply, "Queue ready."]),
            &synthesize_args("a job queue"),
        ));

        assert_eq!(result.exit_code, 7);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "guardrail_denied");
        assert_eq!(payload["data"]["reason_code"], "graph_validation_issues");
        assert!(!dir.path().join("workspaces/shop").exists());
    });
}

#[test]
fn deploy_without_architecture_is_not_found() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let result = runtime.block_on(deploy::execute(
            &app_config(dir.path()),
            Arc::new(SucceedingRunner),
            &DeployArgs { project: "ghost".to_string(), action: DeploymentAction::Plan, stream: true },
        ));

        assert_eq!(result.exit_code, 10);
        assert_eq!(parse_payload(&result.output)["error_class"], "not_found");
    });
}

#[test]
fn state_without_state_file_reports_nothing_deployed() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = state::run(&options(dir.path()), &StateArgs { project: "shop".to_string() });
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["deployed"], false);
        assert_eq!(payload["data"]["resources"], serde_json::json!([]));
    });
}

#[test]
fn state_rejects_path_like_project_ids() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = state::run(&options(dir.path()), &StateArgs { project: "../etc".to_string() });
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_project");
    });
}

#[test]
fn config_output_redacts_secrets() {
    with_env(
        &[
            ("STRATUS_LLM_API_KEY", "sk-secret-value"),
            ("STRATUS_AWS_SECRET_ACCESS_KEY", "aws-secret-value"),
        ],
        || {
            let output = config::run(&GlobalOptions::default());
            assert!(output.contains("llm.api_key = sk-***"));
            assert!(output.contains("(source: env (STRATUS_LLM_API_KEY))"));
            assert!(!output.contains("secret-value"));
            assert!(output.contains("aws.region = us-east-1 (source: default)"));
        },
    );
}

#[test]
fn doctor_reports_every_check() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let report: Value =
            serde_json::from_str(&doctor::run(&options(dir.path()), true)).expect("doctor json");

        let names = report["checks"]
            .as_array()
            .map(|checks| checks.iter().filter_map(|check| check["name"].as_str()).collect::<Vec<_>>())
            .unwrap_or_default();
        assert_eq!(
            names,
            vec!["config_validation", "database_connectivity", "terraform_binary", "llm_credentials"]
        );
        assert_eq!(report["checks"][1]["status"], "pass");
        assert_eq!(report["checks"][3]["status"], "fail");
        assert_eq!(report["overall_status"], "fail");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "STRATUS_DATABASE_URL",
        "STRATUS_DATABASE_MAX_CONNECTIONS",
        "STRATUS_DATABASE_TIMEOUT_SECS",
        "STRATUS_LLM_API_KEY",
        "STRATUS_LLM_BASE_URL",
        "STRATUS_LLM_MODEL",
        "STRATUS_LLM_TIMEOUT_SECS",
        "STRATUS_AWS_REGION",
        "STRATUS_AWS_ACCESS_KEY_ID",
        "STRATUS_AWS_SECRET_ACCESS_KEY",
        "AWS_DEFAULT_REGION",
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
        "STRATUS_TERRAFORM_BINARY",
        "STRATUS_TERRAFORM_WORKSPACES_DIR",
        "STRATUS_TERRAFORM_TIMEOUT_SECS",
        "STRATUS_AGENT_MAX_ROUNDS",
        "STRATUS_AGENT_MAX_TOOLS",
        "STRATUS_VALIDATION_STRICT",
        "STRATUS_LOGGING_LEVEL",
        "STRATUS_LOGGING_FORMAT",
        "STRATUS_LOG_LEVEL",
        "STRATUS_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}

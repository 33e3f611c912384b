pub mod config;
pub mod deploy;
pub mod doctor;
pub mod edit;
pub mod history;
pub mod migrate;
pub mod state;
pub mod synthesize;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use stratus_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use stratus_core::domain::architecture::ProjectId;
use stratus_core::naming::is_valid_project_id;
use stratus_db::repositories::{
    SqlArchitectureRepository, SqlDeploymentRunRepository, SqlProjectStatusRepository,
};
use stratus_db::{connect_with_settings, migrations, DbPool};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::failure_with_data(command, error_class, message, exit_code, None)
    }

    pub fn failure_with_data(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Error class, message, and exit code of a failed command step.
pub(crate) type Failure = (&'static str, String, u8);

pub(crate) fn into_result(command: &str, failure: Failure) -> CommandResult {
    let (error_class, message, exit_code) = failure;
    CommandResult::failure(command, error_class, message, exit_code)
}

/// Flags shared by every subcommand.
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub config_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

impl GlobalOptions {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config_path.clone(),
            require_file: self.config_path.is_some(),
            overrides: self.overrides.clone(),
        }
    }
}

pub(crate) fn load_config(options: &GlobalOptions) -> Result<AppConfig, Failure> {
    AppConfig::load(options.load_options())
        .map_err(|error| ("config_validation", format!("configuration issue: {error}"), 2))
}

pub(crate) fn block_on<F: std::future::Future>(future: F) -> Result<F::Output, Failure> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|error| {
            ("runtime_init", format!("failed to initialize async runtime: {error}"), 3)
        })?;
    Ok(runtime.block_on(future))
}

pub(crate) fn parse_project_id(raw: &str) -> Result<ProjectId, Failure> {
    if is_valid_project_id(raw) {
        Ok(ProjectId(raw.to_string()))
    } else {
        Err((
            "invalid_project",
            format!("project id `{raw}` may only contain letters, digits, `-`, `_` and `.`"),
            2,
        ))
    }
}

/// The sqlx-backed repositories over one migrated pool.
pub(crate) struct Store {
    pub pool: DbPool,
    pub architectures: Arc<SqlArchitectureRepository>,
    pub runs: Arc<SqlDeploymentRunRepository>,
    pub statuses: Arc<SqlProjectStatusRepository>,
}

impl Store {
    pub async fn open(config: &AppConfig) -> Result<Self, Failure> {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        Ok(Self {
            architectures: Arc::new(SqlArchitectureRepository::new(pool.clone())),
            runs: Arc::new(SqlDeploymentRunRepository::new(pool.clone())),
            statuses: Arc::new(SqlProjectStatusRepository::new(pool.clone())),
            pool,
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

pub(crate) fn persistence(error: impl std::fmt::Display) -> Failure {
    ("persistence", error.to_string(), 5)
}

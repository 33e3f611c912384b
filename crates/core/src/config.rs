use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub aws: AwsConfig,
    pub terraform: TerraformConfig,
    pub agent: AgentConfig,
    pub validation: ValidationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

#[derive(Clone, Debug)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<SecretString>,
    pub secret_access_key: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct TerraformConfig {
    /// Explicit binary path. When unset the executor searches PATH and well-known locations.
    pub binary: Option<PathBuf>,
    pub workspaces_dir: PathBuf,
    pub timeout_secs: u64,
    pub stream_buffer: usize,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_rounds: u32,
    pub max_tools: usize,
    pub default_project_name: String,
}

#[derive(Clone, Debug)]
pub struct ValidationConfig {
    /// Block provisioning when the graph or the generated IaC has findings.
    pub strict: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_model: Option<String>,
    pub aws_region: Option<String>,
    pub workspaces_dir: Option<PathBuf>,
    pub terraform_binary: Option<PathBuf>,
    pub strict_validation: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://stratus.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o".to_string(),
                timeout_secs: 120,
                temperature: 0.2,
            },
            aws: AwsConfig {
                region: "us-east-1".to_string(),
                access_key_id: None,
                secret_access_key: None,
            },
            terraform: TerraformConfig {
                binary: None,
                workspaces_dir: PathBuf::from("./workspaces"),
                timeout_secs: 300,
                stream_buffer: 256,
            },
            agent: AgentConfig {
                max_rounds: 30,
                max_tools: 20,
                default_project_name: "stratus-project".to_string(),
            },
            validation: ValidationConfig { strict: false },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AwsConfig {
    /// Credentials are injected into child processes only when both halves are present.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(key), Some(secret)) => {
                let key = key.expose_secret();
                let secret = secret.expose_secret();
                (!key.trim().is_empty() && !secret.trim().is_empty()).then_some((key, secret))
            }
            _ => None,
        }
    }
}

impl LlmConfig {
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().map(|key| !key.expose_secret().trim().is_empty()).unwrap_or(false)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("stratus.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
        }

        if let Some(aws) = patch.aws {
            if let Some(region) = aws.region {
                self.aws.region = region;
            }
            if let Some(access_key_id) = aws.access_key_id {
                self.aws.access_key_id = Some(secret_value(access_key_id));
            }
            if let Some(secret_access_key) = aws.secret_access_key {
                self.aws.secret_access_key = Some(secret_value(secret_access_key));
            }
        }

        if let Some(terraform) = patch.terraform {
            if let Some(binary) = terraform.binary {
                self.terraform.binary = Some(binary);
            }
            if let Some(workspaces_dir) = terraform.workspaces_dir {
                self.terraform.workspaces_dir = workspaces_dir;
            }
            if let Some(timeout_secs) = terraform.timeout_secs {
                self.terraform.timeout_secs = timeout_secs;
            }
            if let Some(stream_buffer) = terraform.stream_buffer {
                self.terraform.stream_buffer = stream_buffer;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_rounds) = agent.max_rounds {
                self.agent.max_rounds = max_rounds;
            }
            if let Some(max_tools) = agent.max_tools {
                self.agent.max_tools = max_tools;
            }
            if let Some(default_project_name) = agent.default_project_name {
                self.agent.default_project_name = default_project_name;
            }
        }

        if let Some(validation) = patch.validation {
            if let Some(strict) = validation.strict {
                self.validation.strict = strict;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STRATUS_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("STRATUS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("STRATUS_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("STRATUS_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("STRATUS_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STRATUS_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("STRATUS_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("STRATUS_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("STRATUS_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("STRATUS_LLM_TIMEOUT_SECS", &value)?;
        }

        let region = read_env("STRATUS_AWS_REGION").or_else(|| read_env("AWS_DEFAULT_REGION"));
        if let Some(value) = region {
            self.aws.region = value;
        }
        let access_key =
            read_env("STRATUS_AWS_ACCESS_KEY_ID").or_else(|| read_env("AWS_ACCESS_KEY_ID"));
        if let Some(value) = access_key {
            self.aws.access_key_id = Some(secret_value(value));
        }
        let secret_key =
            read_env("STRATUS_AWS_SECRET_ACCESS_KEY").or_else(|| read_env("AWS_SECRET_ACCESS_KEY"));
        if let Some(value) = secret_key {
            self.aws.secret_access_key = Some(secret_value(value));
        }

        if let Some(value) = read_env("STRATUS_TERRAFORM_BINARY") {
            self.terraform.binary = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("STRATUS_TERRAFORM_WORKSPACES_DIR") {
            self.terraform.workspaces_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("STRATUS_TERRAFORM_TIMEOUT_SECS") {
            self.terraform.timeout_secs = parse_u64("STRATUS_TERRAFORM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STRATUS_AGENT_MAX_ROUNDS") {
            self.agent.max_rounds = parse_u32("STRATUS_AGENT_MAX_ROUNDS", &value)?;
        }
        if let Some(value) = read_env("STRATUS_AGENT_MAX_TOOLS") {
            self.agent.max_tools = parse_usize("STRATUS_AGENT_MAX_TOOLS", &value)?;
        }

        if let Some(value) = read_env("STRATUS_VALIDATION_STRICT") {
            self.validation.strict = parse_bool("STRATUS_VALIDATION_STRICT", &value)?;
        }

        let log_level =
            read_env("STRATUS_LOGGING_LEVEL").or_else(|| read_env("STRATUS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STRATUS_LOGGING_FORMAT").or_else(|| read_env("STRATUS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(aws_region) = overrides.aws_region {
            self.aws.region = aws_region;
        }
        if let Some(workspaces_dir) = overrides.workspaces_dir {
            self.terraform.workspaces_dir = workspaces_dir;
        }
        if let Some(binary) = overrides.terraform_binary {
            self.terraform.binary = Some(binary);
        }
        if let Some(strict) = overrides.strict_validation {
            self.validation.strict = strict;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_aws(&self.aws)?;
        validate_terraform(&self.terraform)?;
        validate_agent(&self.agent)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("stratus.toml"), PathBuf::from("config/stratus.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation("llm.timeout_secs must be in range 1..=600".to_string()));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    let base_url = llm.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation("llm.temperature must be in range 0.0..=2.0".to_string()));
    }

    Ok(())
}

fn validate_aws(aws: &AwsConfig) -> Result<(), ConfigError> {
    if aws.region.trim().is_empty() {
        return Err(ConfigError::Validation("aws.region must not be empty".to_string()));
    }
    Ok(())
}

fn validate_terraform(terraform: &TerraformConfig) -> Result<(), ConfigError> {
    if terraform.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "terraform.timeout_secs must be greater than zero".to_string(),
        ));
    }
    if terraform.stream_buffer == 0 {
        return Err(ConfigError::Validation(
            "terraform.stream_buffer must be greater than zero".to_string(),
        ));
    }
    if terraform.workspaces_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "terraform.workspaces_dir must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_rounds == 0 {
        return Err(ConfigError::Validation("agent.max_rounds must be greater than zero".to_string()));
    }
    if agent.max_tools == 0 {
        return Err(ConfigError::Validation("agent.max_tools must be greater than zero".to_string()));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    aws: Option<AwsPatch>,
    terraform: Option<TerraformPatch>,
    agent: Option<AgentPatch>,
    validation: Option<ValidationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct AwsPatch {
    region: Option<String>,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TerraformPatch {
    binary: Option<PathBuf>,
    workspaces_dir: Option<PathBuf>,
    timeout_secs: Option<u64>,
    stream_buffer: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_rounds: Option<u32>,
    max_tools: Option<usize>,
    default_project_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ValidationPatch {
    strict: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const AWS_VARS: [&str; 6] = [
        "AWS_DEFAULT_REGION",
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
        "STRATUS_AWS_REGION",
        "STRATUS_AWS_ACCESS_KEY_ID",
        "STRATUS_AWS_SECRET_ACCESS_KEY",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_documented_values() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&AWS_VARS);

        let config =
            AppConfig::load(LoadOptions::default()).map_err(|err| format!("load failed: {err}"))?;

        ensure(config.agent.max_rounds == 30, "default round ceiling should be 30")?;
        ensure(config.agent.max_tools == 20, "default tool cap should be 20")?;
        ensure(config.terraform.timeout_secs == 300, "default terraform timeout is 300s")?;
        ensure(config.aws.region == "us-east-1", "default region should be us-east-1")?;
        ensure(config.llm.model == "gpt-4o", "default model should be gpt-4o")?;
        ensure(!config.validation.strict, "validation should be warn-only by default")?;
        ensure(config.aws.credentials().is_none(), "no credentials configured by default")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&AWS_VARS);

        env::set_var("TEST_STRATUS_LLM_KEY", "sk-from-env");
        env::set_var("TEST_STRATUS_AWS_SECRET", "aws-secret-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("stratus.toml");
            fs::write(
                &path,
                r#"
[llm]
api_key = "${TEST_STRATUS_LLM_KEY}"

[aws]
access_key_id = "AKIAFILE"
secret_access_key = "${TEST_STRATUS_AWS_SECRET}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let key = config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string());
            ensure(key.as_deref() == Some("sk-from-env"), "api key should come from environment")?;
            ensure(
                config.aws.credentials() == Some(("AKIAFILE", "aws-secret-from-env")),
                "aws credentials should combine file and interpolated values",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_STRATUS_LLM_KEY", "TEST_STRATUS_AWS_SECRET"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        env::remove_var("TEST_STRATUS_UNSET_VAR");

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("stratus.toml");
        fs::write(&path, "[llm]\napi_key = \"${TEST_STRATUS_UNSET_VAR}\"\n")
            .map_err(|err| err.to_string())?;

        match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() }) {
            Err(ConfigError::MissingEnvInterpolation { var }) => {
                ensure(var == "TEST_STRATUS_UNSET_VAR", "error should name the missing variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected interpolation failure".to_string()),
        }
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STRATUS_LOG_LEVEL", "warn");
        env::set_var("STRATUS_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["STRATUS_LOG_LEVEL", "STRATUS_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&AWS_VARS);

        env::set_var("STRATUS_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("STRATUS_AWS_REGION", "eu-west-1");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("stratus.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[aws]
region = "ap-south-1"

[terraform]
workspaces_dir = "/srv/stratus/workspaces"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.aws.region == "eu-west-1", "env region should win over file")?;
            ensure(
                config.terraform.workspaces_dir == PathBuf::from("/srv/stratus/workspaces"),
                "file workspaces dir should win over defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["STRATUS_DATABASE_URL", "STRATUS_AWS_REGION"]);
        result
    }

    #[test]
    fn invalid_numeric_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        env::set_var("STRATUS_AGENT_MAX_ROUNDS", "many");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "STRATUS_AGENT_MAX_ROUNDS", "error should name the env key")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected override failure".to_string()),
        };

        clear_vars(&["STRATUS_AGENT_MAX_ROUNDS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STRATUS_AGENT_MAX_ROUNDS", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("agent.max_rounds")
            );
            ensure(has_message, "validation failure should mention agent.max_rounds")
        })();

        clear_vars(&["STRATUS_AGENT_MAX_ROUNDS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STRATUS_LLM_API_KEY", "sk-secret-value");
        env::set_var("STRATUS_AWS_SECRET_ACCESS_KEY", "aws-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                !debug.contains("aws-secret-value"),
                "debug output should not contain aws secret",
            )?;
            ensure(config.llm.has_api_key(), "api key should be registered")?;
            Ok(())
        })();

        clear_vars(&["STRATUS_LLM_API_KEY", "STRATUS_AWS_SECRET_ACCESS_KEY"]);
        result
    }
}

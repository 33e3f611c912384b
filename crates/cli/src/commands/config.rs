use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use stratus_core::config::AppConfig;
use toml::Value;

use crate::commands::GlobalOptions;

pub fn run(options: &GlobalOptions) -> String {
    let config = match AppConfig::load(options.load_options()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = options.config_path.clone().or_else(detect_config_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let overrides = &options.overrides;
    let fields: Vec<(&str, String, &str, bool)> = vec![
        ("database.url", config.database.url.clone(), "STRATUS_DATABASE_URL", overrides.database_url.is_some()),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "STRATUS_DATABASE_MAX_CONNECTIONS",
            false,
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "STRATUS_DATABASE_TIMEOUT_SECS",
            false,
        ),
        ("llm.base_url", config.llm.base_url.clone(), "STRATUS_LLM_BASE_URL", false),
        ("llm.model", config.llm.model.clone(), "STRATUS_LLM_MODEL", overrides.llm_model.is_some()),
        ("llm.api_key", redact_secret(config.llm.api_key.as_ref()), "STRATUS_LLM_API_KEY", false),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string(), "STRATUS_LLM_TIMEOUT_SECS", false),
        ("aws.region", config.aws.region.clone(), "STRATUS_AWS_REGION", overrides.aws_region.is_some()),
        (
            "aws.access_key_id",
            redact_secret(config.aws.access_key_id.as_ref()),
            "STRATUS_AWS_ACCESS_KEY_ID",
            false,
        ),
        (
            "aws.secret_access_key",
            redact_secret(config.aws.secret_access_key.as_ref()),
            "STRATUS_AWS_SECRET_ACCESS_KEY",
            false,
        ),
        (
            "terraform.binary",
            config
                .terraform
                .binary
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<search PATH>".to_string()),
            "STRATUS_TERRAFORM_BINARY",
            overrides.terraform_binary.is_some(),
        ),
        (
            "terraform.workspaces_dir",
            config.terraform.workspaces_dir.display().to_string(),
            "STRATUS_TERRAFORM_WORKSPACES_DIR",
            overrides.workspaces_dir.is_some(),
        ),
        (
            "terraform.timeout_secs",
            config.terraform.timeout_secs.to_string(),
            "STRATUS_TERRAFORM_TIMEOUT_SECS",
            false,
        ),
        ("agent.max_rounds", config.agent.max_rounds.to_string(), "STRATUS_AGENT_MAX_ROUNDS", false),
        ("agent.max_tools", config.agent.max_tools.to_string(), "STRATUS_AGENT_MAX_TOOLS", false),
        (
            "validation.strict",
            config.validation.strict.to_string(),
            "STRATUS_VALIDATION_STRICT",
            overrides.strict_validation.is_some(),
        ),
        ("logging.level", config.logging.level.clone(), "STRATUS_LOGGING_LEVEL", overrides.log_level.is_some()),
        ("logging.format", format!("{:?}", config.logging.format), "STRATUS_LOGGING_FORMAT", false),
    ];

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for (key, value, env_key, from_flag) in fields {
        let source = if from_flag {
            "flag".to_string()
        } else {
            field_source(key, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref())
        };
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("stratus.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/stratus.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps at most a short prefix of a secret so operators can tell keys apart.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        if prefix.len() <= 4 {
            return format!("{prefix}-***");
        }
    }

    "<redacted>".to_string()
}

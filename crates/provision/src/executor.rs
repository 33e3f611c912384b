//! Supervision of the external IaC binary.
//!
//! Batch calls run through `tokio::process` under a wall-clock timeout. Streaming calls
//! spawn the child with stdout and stderr sharing one pipe and hand it to a dedicated
//! reader thread, which feeds a bounded channel the async side drains line by line.

use std::ffi::OsString;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use stratus_core::config::{AwsConfig, TerraformConfig};
use stratus_core::domain::deployment::DeploymentAction;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub const ERROR_MARKER_PREFIX: &str = "[ERROR] Command failed with exit code";

#[cfg(windows)]
const BINARY_NAME: &str = "terraform.exe";
#[cfg(not(windows))]
const BINARY_NAME: &str = "terraform";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerraformCommand {
    Init,
    Plan,
    Apply,
    Destroy,
}

impl TerraformCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        }
    }

    /// Arguments always run non-interactively.
    pub fn args(&self) -> &'static [&'static str] {
        match self {
            Self::Init => &["init", "-no-color"],
            Self::Plan => &["plan", "-no-color", "-input=false"],
            Self::Apply => &["apply", "-auto-approve", "-no-color", "-input=false"],
            Self::Destroy => &["destroy", "-auto-approve", "-no-color", "-input=false"],
        }
    }
}

impl From<DeploymentAction> for TerraformCommand {
    fn from(action: DeploymentAction) -> Self {
        match action {
            DeploymentAction::Plan => Self::Plan,
            DeploymentAction::Apply => Self::Apply,
            DeploymentAction::Destroy => Self::Destroy,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// stdout, then stderr after a newline when there is any, trimmed.
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("terraform binary not found on PATH or in {searched}; install it or set terraform.binary")]
    BinaryNotFound { searched: String },
    #[error("refusing to run in unsafe workspace path `{0}`")]
    UnsafeWorkspacePath(String),
    #[error("workspace not found: {0}")]
    WorkspaceMissing(PathBuf),
    #[error("failed to start terraform: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("terraform {command} timed out after {limit_secs}s")]
    Timeout { command: &'static str, limit_secs: u64 },
    #[error("terraform I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The marker line appended to a stream whose process exited non-zero.
pub fn error_marker(exit_code: i32) -> String {
    format!("{ERROR_MARKER_PREFIX} {exit_code}")
}

/// Lines of a running command in emission order.
///
/// After the last output line the exit code is checked; a non-zero exit yields one
/// extra [`error_marker`] line before the stream ends.
pub struct LineStream {
    lines: mpsc::Receiver<Option<String>>,
    exit: Option<oneshot::Receiver<i32>>,
    exit_code: Option<i32>,
    done: bool,
}

impl LineStream {
    pub fn new(lines: mpsc::Receiver<Option<String>>, exit: oneshot::Receiver<i32>) -> Self {
        Self { lines, exit: Some(exit), exit_code: None, done: false }
    }

    /// A finished stream over fixed lines, for runners that do not spawn processes.
    pub fn replay(lines: Vec<String>, exit_code: i32) -> Self {
        let (line_tx, line_rx) = mpsc::channel(lines.len() + 1);
        for line in lines {
            let _ = line_tx.try_send(Some(line));
        }
        let _ = line_tx.try_send(None);
        let (exit_tx, exit_rx) = oneshot::channel();
        let _ = exit_tx.send(exit_code);
        Self::new(line_rx, exit_rx)
    }

    pub async fn next_line(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        match self.lines.recv().await {
            Some(Some(line)) => Some(line),
            Some(None) | None => {
                self.done = true;
                let code = match self.exit.take() {
                    Some(exit) => exit.await.unwrap_or(-1),
                    None => -1,
                };
                self.exit_code = Some(code);
                (code != 0).then(|| error_marker(code))
            }
        }
    }

    /// Known once the stream has been drained.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub async fn collect_lines(mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await {
            lines.push(line);
        }
        lines
    }
}

#[async_trait]
pub trait TerraformRunner: Send + Sync {
    async fn run(
        &self,
        command: TerraformCommand,
        workspace: &Path,
    ) -> Result<CommandOutput, ExecutorError>;

    async fn stream(
        &self,
        command: TerraformCommand,
        workspace: &Path,
    ) -> Result<LineStream, ExecutorError>;

    async fn init(&self, workspace: &Path) -> Result<CommandOutput, ExecutorError> {
        self.run(TerraformCommand::Init, workspace).await
    }

    async fn plan(&self, workspace: &Path) -> Result<CommandOutput, ExecutorError> {
        self.run(TerraformCommand::Plan, workspace).await
    }

    async fn apply(&self, workspace: &Path) -> Result<CommandOutput, ExecutorError> {
        self.run(TerraformCommand::Apply, workspace).await
    }

    async fn destroy(&self, workspace: &Path) -> Result<CommandOutput, ExecutorError> {
        self.run(TerraformCommand::Destroy, workspace).await
    }
}

/// Runs the real binary. The binary is located on each call, so a missing install
/// surfaces as [`ExecutorError::BinaryNotFound`] from the command that needed it.
#[derive(Clone, Debug)]
pub struct TerraformExecutor {
    binary: Option<PathBuf>,
    aws: AwsConfig,
    timeout: Duration,
    stream_buffer: usize,
}

impl TerraformExecutor {
    pub fn new(aws: AwsConfig) -> Self {
        Self { binary: None, aws, timeout: Duration::from_secs(300), stream_buffer: 256 }
    }

    pub fn from_config(terraform: &TerraformConfig, aws: &AwsConfig) -> Self {
        Self {
            binary: terraform.binary.clone(),
            aws: aws.clone(),
            timeout: Duration::from_secs(terraform.timeout_secs),
            stream_buffer: terraform.stream_buffer.max(1),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn resolve_binary(&self) -> Result<PathBuf, ExecutorError> {
        match &self.binary {
            Some(explicit) if explicit.is_file() => Ok(explicit.clone()),
            Some(explicit) => {
                Err(ExecutorError::BinaryNotFound { searched: explicit.display().to_string() })
            }
            None => locate_binary().ok_or_else(|| ExecutorError::BinaryNotFound {
                searched: fallback_dirs()
                    .iter()
                    .map(|dir| dir.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    /// Environment additions for the child: credentials, region, automation flag, and a
    /// search path rebuilt from the current process environment.
    pub fn child_env(&self) -> Vec<(&'static str, OsString)> {
        let mut env = Vec::new();
        if let Some((key_id, secret)) = self.aws.credentials() {
            env.push(("AWS_ACCESS_KEY_ID", OsString::from(key_id)));
            env.push(("AWS_SECRET_ACCESS_KEY", OsString::from(secret)));
        }
        env.push(("AWS_DEFAULT_REGION", OsString::from(&self.aws.region)));
        env.push(("TF_IN_AUTOMATION", OsString::from("1")));
        if let Some(path) = refreshed_search_path() {
            env.push(("PATH", path));
        }
        env
    }

    async fn prepare(
        &self,
        command: TerraformCommand,
        workspace: &Path,
    ) -> Result<(PathBuf, PathBuf), ExecutorError> {
        let binary = self.resolve_binary()?;
        let workspace = checked_workspace(workspace).await?;
        tracing::info!(
            event_name = "terraform.command.start",
            command = command.as_str(),
            workspace = %workspace.display(),
            "running terraform"
        );
        Ok((binary, workspace))
    }
}

#[async_trait]
impl TerraformRunner for TerraformExecutor {
    async fn run(
        &self,
        command: TerraformCommand,
        workspace: &Path,
    ) -> Result<CommandOutput, ExecutorError> {
        let (binary, workspace) = self.prepare(command, workspace).await?;

        let child = tokio::process::Command::new(&binary)
            .args(command.args())
            .current_dir(&workspace)
            .envs(self.child_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ExecutorError::Spawn)?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::warn!(
                    event_name = "terraform.command.timeout",
                    command = command.as_str(),
                    limit_secs = self.timeout.as_secs(),
                    "terraform timed out and was killed"
                );
                return Err(ExecutorError::Timeout {
                    command: command.as_str(),
                    limit_secs: self.timeout.as_secs(),
                });
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            combined.push('\n');
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            output: combined.trim().to_string(),
        };

        tracing::info!(
            event_name = "terraform.command.finished",
            command = command.as_str(),
            exit_code = result.exit_code,
            output_bytes = result.output.len(),
            "terraform finished"
        );
        Ok(result)
    }

    async fn stream(
        &self,
        command: TerraformCommand,
        workspace: &Path,
    ) -> Result<LineStream, ExecutorError> {
        let (binary, workspace) = self.prepare(command, workspace).await?;

        let (reader, writer) = std::io::pipe()?;
        let stderr_writer = writer.try_clone()?;
        let mut process = std::process::Command::new(&binary);
        process
            .args(command.args())
            .current_dir(&workspace)
            .envs(self.child_env())
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer);
        let mut child = process.spawn().map_err(ExecutorError::Spawn)?;
        // The builder still owns the write ends; the reader only sees EOF once they close.
        drop(process);

        let (line_tx, line_rx) = mpsc::channel(self.stream_buffer);
        let (exit_tx, exit_rx) = oneshot::channel();
        let label = command.as_str();

        std::thread::Builder::new()
            .name(format!("terraform-{label}"))
            .spawn(move || {
                let mut reader = BufReader::new(reader);
                let mut buffer = Vec::new();
                loop {
                    buffer.clear();
                    match reader.read_until(b'\n', &mut buffer) {
                        Ok(0) => break,
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&buffer)
                                .trim_end_matches(['\r', '\n'])
                                .to_string();
                            tracing::debug!(event_name = "terraform.stream.line", line = %line);
                            if line_tx.blocking_send(Some(line)).is_err() {
                                let _ = child.kill();
                                break;
                            }
                        }
                        Err(error) => {
                            tracing::warn!(
                                event_name = "terraform.stream.read_failed",
                                error = %error,
                                "stopped reading terraform output"
                            );
                            break;
                        }
                    }
                }
                let _ = line_tx.blocking_send(None);
                let code = child.wait().ok().and_then(|status| status.code()).unwrap_or(-1);
                tracing::info!(
                    event_name = "terraform.command.finished",
                    command = label,
                    exit_code = code,
                    "terraform stream finished"
                );
                let _ = exit_tx.send(code);
            })
            .map_err(ExecutorError::Spawn)?;

        Ok(LineStream::new(line_rx, exit_rx))
    }
}

async fn checked_workspace(workspace: &Path) -> Result<PathBuf, ExecutorError> {
    static SAFE_PATH: OnceLock<Option<Regex>> = OnceLock::new();

    let absolute = std::path::absolute(workspace)?;
    let rendered = absolute.to_string_lossy();
    let safe = SAFE_PATH
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9_\-/\\:.]+$").ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(&rendered));
    if !safe {
        return Err(ExecutorError::UnsafeWorkspacePath(rendered.into_owned()));
    }

    match tokio::fs::metadata(&absolute).await {
        Ok(meta) if meta.is_dir() => Ok(absolute),
        _ => Err(ExecutorError::WorkspaceMissing(absolute)),
    }
}

/// Searches PATH, then well-known install directories.
pub fn locate_binary() -> Option<PathBuf> {
    which::which(BINARY_NAME)
        .ok()
        .or_else(|| fallback_dirs().into_iter().map(|dir| dir.join(BINARY_NAME)).find(|path| path.is_file()))
}

fn fallback_dirs() -> Vec<PathBuf> {
    if cfg!(windows) {
        let mut dirs =
            vec![PathBuf::from(r"C:\Program Files\Terraform"), PathBuf::from(r"C:\terraform")];
        if let Some(local) = std::env::var_os("LOCALAPPDATA") {
            dirs.push(PathBuf::from(local).join("Programs").join("Terraform"));
        }
        dirs
    } else {
        let mut dirs = vec![
            PathBuf::from("/usr/local/bin"),
            PathBuf::from("/usr/bin"),
            PathBuf::from("/opt/homebrew/bin"),
        ];
        if let Some(home) = std::env::var_os("HOME") {
            dirs.push(PathBuf::from(home).join("bin"));
        }
        dirs
    }
}

/// The current PATH with any missing fallback directories appended.
fn refreshed_search_path() -> Option<OsString> {
    let mut entries = std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).collect::<Vec<_>>())
        .unwrap_or_default();
    for dir in fallback_dirs() {
        if dir.is_dir() && !entries.contains(&dir) {
            entries.push(dir);
        }
    }
    std::env::join_paths(entries).ok()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use stratus_core::config::AppConfig;
    use stratus_core::domain::deployment::DeploymentAction;

    use super::{
        checked_workspace, error_marker, ExecutorError, LineStream,
        TerraformCommand, TerraformExecutor,
    };

    #[test]
    fn command_flags_are_non_interactive() {
        assert_eq!(TerraformCommand::Init.args(), ["init", "-no-color"]);
        assert_eq!(
            TerraformCommand::from(DeploymentAction::Destroy).args(),
            ["destroy", "-auto-approve", "-no-color", "-input=false"]
        );
        assert_eq!(TerraformCommand::Plan.args(), ["plan", "-no-color", "-input=false"]);
    }

    #[test]
    fn marker_names_the_exit_code() {
        assert_eq!(error_marker(2), "[ERROR] Command failed with exit code 2");
    }

    #[tokio::test]
    async fn replayed_stream_appends_marker_on_failure() {
        let lines = LineStream::replay(vec!["a".to_string(), "b".to_string()], 3).collect_lines().await;
        assert_eq!(lines, vec!["a", "b", "[ERROR] Command failed with exit code 3"]);

        let mut ok = LineStream::replay(vec!["done".to_string()], 0);
        assert_eq!(ok.next_line().await.as_deref(), Some("done"));
        assert_eq!(ok.next_line().await, None);
        assert_eq!(ok.exit_code(), Some(0));
        assert_eq!(ok.next_line().await, None);
    }

    #[tokio::test]
    async fn crafted_paths_are_rejected_before_spawn() {
        let error = checked_workspace(Path::new("/tmp/work; rm -rf ~")).await.expect_err("unsafe");
        assert!(matches!(error, ExecutorError::UnsafeWorkspacePath(_)));

        let error = checked_workspace(Path::new("/definitely/not/here")).await.expect_err("missing");
        assert!(matches!(error, ExecutorError::WorkspaceMissing(_)));
    }

    #[test]
    fn missing_explicit_binary_is_reported_lazily() {
        let config = AppConfig::default();
        let executor = TerraformExecutor::from_config(&config.terraform, &config.aws)
            .with_binary("/nonexistent/terraform");
        assert!(matches!(executor.resolve_binary(), Err(ExecutorError::BinaryNotFound { .. })));
    }

    #[test]
    fn child_env_injects_region_and_automation_flag() {
        let config = AppConfig::default();
        let executor = TerraformExecutor::from_config(&config.terraform, &config.aws);
        let env = executor.child_env();

        assert!(env.iter().any(|(key, value)| *key == "AWS_DEFAULT_REGION" && value == "us-east-1"));
        assert!(env.iter().any(|(key, value)| *key == "TF_IN_AUTOMATION" && value == "1"));
        assert!(!env.iter().any(|(key, _)| *key == "AWS_ACCESS_KEY_ID"));
    }
}

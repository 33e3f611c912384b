//! Per-project workspace directories holding generated IaC.
//!
//! Regenerating a bundle replaces only the config files. The tool's own `.terraform/`
//! cache, its state file, and any archives already on disk are left alone so a redeploy
//! picks up where the last one stopped.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use stratus_core::config::TerraformConfig;
use stratus_core::domain::architecture::{IacBundle, ProjectId};
use stratus_core::naming::is_valid_project_id;
use thiserror::Error;

const CONFIG_EXTENSIONS: &[&str] = &["tf", "tfvars"];

const PLACEHOLDER_HANDLER: &str = r#"def handler(event, context):
    return {
        "statusCode": 200,
        "body": "Placeholder function deployed by stratus"
    }
"#;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("invalid project id `{0}`")]
    InvalidProjectId(String),
    #[error("workspace I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not build placeholder archive {name}: {reason}")]
    Archive { name: String, reason: String },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> WorkspaceError + '_ {
    move |source| WorkspaceError::Io { path: path.to_path_buf(), source }
}

#[derive(Clone, Debug)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &TerraformConfig) -> Self {
        Self::new(config.workspaces_dir.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workspace_path(&self, project_id: &ProjectId) -> Result<PathBuf, WorkspaceError> {
        if !is_valid_project_id(&project_id.0) {
            return Err(WorkspaceError::InvalidProjectId(project_id.0.clone()));
        }
        Ok(self.root.join(&project_id.0))
    }

    pub async fn workspace_exists(&self, project_id: &ProjectId) -> bool {
        match self.workspace_path(project_id) {
            Ok(path) => tokio::fs::metadata(&path).await.is_ok_and(|meta| meta.is_dir()),
            Err(_) => false,
        }
    }

    /// Replaces the workspace's config files with `bundle` and returns the directory.
    pub async fn write_bundle(
        &self,
        project_id: &ProjectId,
        bundle: &IacBundle,
    ) -> Result<PathBuf, WorkspaceError> {
        let workspace = self.workspace_path(project_id)?;
        tokio::fs::create_dir_all(&workspace).await.map_err(io_error(&workspace))?;

        for stale in config_files(&workspace).await? {
            let path = workspace.join(&stale);
            tokio::fs::remove_file(&path).await.map_err(io_error(&path))?;
        }

        let mut archives = BTreeSet::new();
        for (safe_name, content) in sanitized_files(project_id, bundle) {
            let content = apply_corrections(&content);
            archives.extend(referenced_archives(&content));

            let path = workspace.join(&safe_name);
            tokio::fs::write(&path, content.as_bytes()).await.map_err(io_error(&path))?;
            tracing::debug!(
                event_name = "workspace.file.written",
                project_id = %project_id,
                filename = %safe_name,
                bytes = content.len(),
                "wrote config file"
            );
        }

        for archive in archives {
            ensure_placeholder_archive(&workspace, &archive).await?;
        }

        tracing::info!(
            event_name = "workspace.bundle.written",
            project_id = %project_id,
            files = bundle.len(),
            workspace = %workspace.display(),
            "workspace prepared"
        );
        Ok(workspace)
    }

    /// Sorted config filenames currently in the workspace; empty when it does not exist.
    pub async fn list_files(&self, project_id: &ProjectId) -> Result<Vec<String>, WorkspaceError> {
        let workspace = self.workspace_path(project_id)?;
        if tokio::fs::metadata(&workspace).await.is_err() {
            return Ok(Vec::new());
        }
        config_files(&workspace).await
    }

    pub async fn delete_workspace(&self, project_id: &ProjectId) -> Result<(), WorkspaceError> {
        let workspace = self.workspace_path(project_id)?;
        match tokio::fs::remove_dir_all(&workspace).await {
            Ok(()) => {
                tracing::info!(
                    event_name = "workspace.deleted",
                    project_id = %project_id,
                    "workspace deleted"
                );
                Ok(())
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkspaceError::Io { path: workspace, source }),
        }
    }
}

async fn config_files(workspace: &Path) -> Result<Vec<String>, WorkspaceError> {
    let mut entries = tokio::fs::read_dir(workspace).await.map_err(io_error(workspace))?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error(workspace))? {
        let file_type = entry.file_type().await.map_err(io_error(workspace))?;
        if !file_type.is_file() {
            continue;
        }
        let path = entry.path();
        let is_config = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| CONFIG_EXTENSIONS.contains(&extension));
        if is_config {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Bundle files keyed by their on-disk name. Keys that sanitize to the same name are
/// joined in bundle order, the same way fragments for one file are merged.
fn sanitized_files(project_id: &ProjectId, bundle: &IacBundle) -> BTreeMap<String, String> {
    let mut files: BTreeMap<String, String> = BTreeMap::new();
    for (filename, content) in bundle.files() {
        let safe_name = sanitize_filename(filename);
        match files.get_mut(&safe_name) {
            Some(existing) => {
                tracing::warn!(
                    event_name = "workspace.file.name_collision",
                    project_id = %project_id,
                    filename = %filename,
                    merged_into = %safe_name,
                    "bundle filenames collide after sanitizing; merging contents"
                );
                existing.push('\n');
                existing.push_str(content);
            }
            None => {
                files.insert(safe_name, content.to_string());
            }
        }
    }
    files
}

/// Strips traversal, flattens separators, and forces a config extension.
pub fn sanitize_filename(name: &str) -> String {
    let mut safe = name.replace("..", "").replace(['/', '\\'], "_");
    if !safe.ends_with(".tf") && !safe.ends_with(".tfvars") {
        safe.push_str(".tf");
    }
    safe
}

/// Rewrites a bare API Gateway v2 route target into the `integrations/` form the provider expects.
pub fn apply_corrections(content: &str) -> Cow<'_, str> {
    static ROUTE_TARGET: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(pattern) = ROUTE_TARGET
        .get_or_init(|| Regex::new(r"(target\s*=\s*)(aws_apigatewayv2_integration\.\w+\.id)").ok())
    else {
        return Cow::Borrowed(content);
    };

    let corrected = pattern.replace_all(content, "${1}\"integrations/$${${2}}\"");
    if matches!(corrected, Cow::Owned(_)) {
        tracing::debug!(event_name = "workspace.file.corrected", "rewrote api gateway route target");
    }
    corrected
}

/// Archive filenames assigned with `filename = "<name>.zip"`.
pub fn referenced_archives(content: &str) -> Vec<String> {
    static ARCHIVE: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(pattern) =
        ARCHIVE.get_or_init(|| Regex::new(r#"filename\s*=\s*"([^"]+\.zip)""#).ok())
    else {
        return Vec::new();
    };
    pattern.captures_iter(content).map(|captures| captures[1].to_string()).collect()
}

async fn ensure_placeholder_archive(workspace: &Path, name: &str) -> Result<(), WorkspaceError> {
    if name.contains(['/', '\\']) || name.contains("..") {
        tracing::warn!(
            event_name = "workspace.archive.skipped",
            archive = %name,
            "archive reference points outside the workspace"
        );
        return Ok(());
    }

    let path = workspace.join(name);
    if tokio::fs::metadata(&path).await.is_ok() {
        return Ok(());
    }

    let bytes = placeholder_archive()
        .map_err(|reason| WorkspaceError::Archive { name: name.to_string(), reason })?;
    tokio::fs::write(&path, bytes).await.map_err(io_error(&path))?;
    tracing::info!(
        event_name = "workspace.archive.created",
        archive = %name,
        "created placeholder deployment archive"
    );
    Ok(())
}

fn placeholder_archive() -> Result<Vec<u8>, String> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    writer.start_file("index.py", options).map_err(|e| e.to_string())?;
    writer.write_all(PLACEHOLDER_HANDLER.as_bytes()).map_err(|e| e.to_string())?;
    let cursor = writer.finish().map_err(|e| e.to_string())?;
    Ok(cursor.into_inner())
}

//! Reads the IaC tool's own state file.
//!
//! A missing file means nothing has been deployed yet. A malformed file is logged and
//! treated the same way by [`StateReader::read_state`]; callers that need the failure use
//! [`StateReader::try_read_state`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use stratus_core::domain::state::{DeployedResource, DeployedState};
use thiserror::Error;

pub const STATE_FILE: &str = "terraform.tfstate";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state file {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

#[derive(Deserialize)]
struct RawState {
    #[serde(default)]
    resources: Vec<RawResource>,
    #[serde(default)]
    outputs: BTreeMap<String, RawOutput>,
}

#[derive(Deserialize)]
struct RawResource {
    #[serde(default, rename = "type")]
    resource_type: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    provider: String,
    #[serde(default)]
    instances: Vec<RawInstance>,
}

#[derive(Deserialize)]
struct RawInstance {
    #[serde(default)]
    attributes: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawOutput {
    #[serde(default)]
    value: Value,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StateReader;

impl StateReader {
    pub fn new() -> Self {
        Self
    }

    pub fn state_path(workspace: &Path) -> PathBuf {
        workspace.join(STATE_FILE)
    }

    pub async fn has_state(&self, workspace: &Path) -> bool {
        tokio::fs::metadata(Self::state_path(workspace)).await.is_ok_and(|meta| meta.is_file())
    }

    pub async fn read_state(&self, workspace: &Path) -> Option<DeployedState> {
        match self.try_read_state(workspace).await {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!(
                    event_name = "state.read.failed",
                    error = %error,
                    "ignoring unreadable state file"
                );
                None
            }
        }
    }

    pub async fn try_read_state(
        &self,
        workspace: &Path,
    ) -> Result<Option<DeployedState>, StateError> {
        let path = Self::state_path(workspace);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(event_name = "state.read.absent", path = %path.display());
                return Ok(None);
            }
            Err(source) => return Err(StateError::Io { path, source }),
        };

        let state = parse_state(&content)
            .map_err(|error| StateError::Malformed { path: path.clone(), reason: error.to_string() })?;
        tracing::info!(
            event_name = "state.read.loaded",
            path = %path.display(),
            resources = state.resource_count(),
            outputs = state.outputs.len(),
            "read deployed state"
        );
        Ok(Some(state))
    }

    pub async fn resource_count(&self, workspace: &Path) -> usize {
        self.read_state(workspace).await.map_or(0, |state| state.resource_count())
    }
}

/// One entry per resource instance; a `count` or `for_each` block yields several.
pub fn parse_state(content: &str) -> Result<DeployedState, serde_json::Error> {
    let raw: RawState = serde_json::from_str(content)?;

    let resources = raw
        .resources
        .into_iter()
        .flat_map(|resource| {
            let RawResource { resource_type, name, provider, instances } = resource;
            instances.into_iter().map(move |instance| DeployedResource {
                resource_type: resource_type.clone(),
                name: name.clone(),
                provider: provider.clone(),
                attributes: instance.attributes,
            })
        })
        .collect();
    let outputs = raw.outputs.into_iter().map(|(name, output)| (name, output.value)).collect();

    Ok(DeployedState { resources, outputs })
}

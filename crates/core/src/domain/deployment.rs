use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::architecture::ProjectId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentAction {
    Plan,
    Apply,
    Destroy,
}

impl DeploymentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plan" => Some(Self::Plan),
            "apply" => Some(Self::Apply),
            "destroy" => Some(Self::Destroy),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeploymentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Destroyed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Destroyed => "destroyed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "destroyed" => Some(Self::Destroyed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Destroyed)
    }
}

/// Coarse project status mirrored from the most recent run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Ready,
    Deploying,
    Deployed,
    Destroying,
    Destroyed,
    Failed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Ready => "ready",
            Self::Deploying => "deploying",
            Self::Deployed => "deployed",
            Self::Destroying => "destroying",
            Self::Destroyed => "destroyed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "ready" => Some(Self::Ready),
            "deploying" => Some(Self::Deploying),
            "deployed" => Some(Self::Deployed),
            "destroying" => Some(Self::Destroying),
            "destroyed" => Some(Self::Destroyed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Deploying | Self::Destroying)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRun {
    pub id: RunId,
    pub project_id: ProjectId,
    pub architecture_version: u32,
    pub action: DeploymentAction,
    pub status: RunStatus,
    pub logs: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{DeploymentAction, ProjectStatus, RunStatus};

    #[test]
    fn run_status_round_trips_from_storage_encoding() {
        let cases = [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Success,
            RunStatus::Failed,
            RunStatus::Destroyed,
        ];

        for status in cases {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("unknown"), None);
    }

    #[test]
    fn project_status_round_trips_from_storage_encoding() {
        let cases = [
            ProjectStatus::Draft,
            ProjectStatus::Ready,
            ProjectStatus::Deploying,
            ProjectStatus::Deployed,
            ProjectStatus::Destroying,
            ProjectStatus::Destroyed,
            ProjectStatus::Failed,
        ];

        for status in cases {
            assert_eq!(ProjectStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn action_parse_is_case_insensitive() {
        assert_eq!(DeploymentAction::parse(" Apply "), Some(DeploymentAction::Apply));
        assert_eq!(DeploymentAction::parse("refresh"), None);
    }

    #[test]
    fn only_in_flight_statuses_are_busy() {
        assert!(ProjectStatus::Deploying.is_busy());
        assert!(ProjectStatus::Destroying.is_busy());
        assert!(!ProjectStatus::Failed.is_busy());
        assert!(!ProjectStatus::Deployed.is_busy());
    }
}

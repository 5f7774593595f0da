//! Contract with the remote deployment, snapshot and player-auth services.

use crate::error::{LaunchError, RpcError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Starting,
    Running,
    Restarting,
    Stopping,
    Stopped,
    Error,
    #[default]
    #[serde(other)]
    Unknown,
}

impl DeploymentStatus {
    /// Starting or Running. Everything else is treated as gone.
    pub fn is_active(self) -> bool {
        matches!(self, DeploymentStatus::Starting | DeploymentStatus::Running)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentStatus::Starting => "Starting",
            DeploymentStatus::Running => "Running",
            DeploymentStatus::Restarting => "Restarting",
            DeploymentStatus::Stopping => "Stopping",
            DeploymentStatus::Stopped => "Stopped",
            DeploymentStatus::Error => "Error",
            DeploymentStatus::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFlag {
    pub worker_type: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub config_json: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deployment {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub project_name: String,
    pub region_code: String,
    pub assembly_id: String,
    pub runtime_version: String,
    pub launch_config: LaunchConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starting_snapshot_id: Option<String>,
    pub tag: Vec<String>,
    pub worker_flags: Vec<WorkerFlag>,
    pub status: DeploymentStatus,
}

impl Deployment {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag.iter().any(|t| t == tag)
    }

    pub fn add_tag(&mut self, tag: &str) {
        if !self.has_tag(tag) {
            self.tag.push(tag.to_string());
        }
    }

    #[cfg(test)]
    pub fn worker_flag(&self, worker_type: &str, key: &str) -> Option<&str> {
        self.worker_flags
            .iter()
            .find(|flag| flag.worker_type == worker_type && flag.key == key)
            .map(|flag| flag.value.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub project_name: String,
    pub deployment_name: String,
    pub checksum: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SnapshotUploadTarget {
    pub snapshot: Snapshot,
    pub upload_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DevelopmentAuthenticationToken {
    #[serde(default)]
    pub id: String,
    pub token_secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoppedStatusFilter {
    NotStoppedDeployments,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListDeploymentsRequest {
    pub project_name: String,
    pub deployment_stopped_status_filter: StoppedStatusFilter,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeploymentPage {
    pub deployments: Vec<Deployment>,
    pub next_page_token: Option<String>,
}

/// Name of a long-running operation on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OperationFailure {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OperationState {
    pub done: bool,
    pub response: Option<Deployment>,
    pub error: Option<OperationFailure>,
}

pub const DEV_AUTH_TOKEN_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Remote calls the launcher makes. One instance talks to one region's endpoint.
pub trait Platform {
    fn create_deployment(&self, deployment: &Deployment) -> Result<OperationHandle, RpcError>;

    fn get_operation(&self, handle: &OperationHandle) -> Result<OperationState, RpcError>;

    fn list_deployments(&self, request: &ListDeploymentsRequest) -> Result<DeploymentPage, RpcError>;

    fn stop_deployment(&self, project_name: &str, deployment_id: &str) -> Result<(), RpcError>;

    fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, RpcError>;

    fn upload_snapshot(&self, snapshot: &Snapshot) -> Result<SnapshotUploadTarget, RpcError>;

    fn confirm_upload(
        &self,
        project_name: &str,
        deployment_name: &str,
        snapshot_id: &str,
    ) -> Result<Snapshot, RpcError>;

    fn create_development_authentication_token(
        &self,
        project_name: &str,
        description: &str,
        lifetime: Duration,
    ) -> Result<DevelopmentAuthenticationToken, RpcError>;

    /// Out-of-band PUT of raw bytes to a pre-signed upload URL.
    fn put_content(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(&str, String)],
    ) -> Result<(), LaunchError>;
}

/// Builds a [`Platform`] client for a region code.
pub trait PlatformConnector {
    fn connect(&self, region: &str) -> anyhow::Result<Box<dyn Platform>>;
}

//! In-memory platform used by the unit tests.

use crate::error::{LaunchError, RpcCode, RpcError};
use crate::platform::{
    Deployment, DeploymentPage, DeploymentStatus, DevelopmentAuthenticationToken,
    ListDeploymentsRequest, OperationFailure, OperationHandle, OperationState, Platform,
    PlatformConnector, Snapshot, SnapshotUploadTarget,
};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateDeployment(Deployment),
    GetOperation(String),
    ListDeployments(ListDeploymentsRequest),
    StopDeployment {
        project_name: String,
        deployment_id: String,
    },
    UpdateDeployment(Deployment),
    UploadSnapshot(Snapshot),
    PutContent {
        url: String,
        body: Vec<u8>,
        headers: Vec<(String, String)>,
    },
    ConfirmUpload {
        project_name: String,
        deployment_name: String,
        snapshot_id: String,
    },
    CreateDevelopmentAuthenticationToken {
        project_name: String,
        description: String,
        lifetime: Duration,
    },
}

struct PendingOperation {
    deployment: Deployment,
    polls_remaining: u32,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    deployments: Vec<Deployment>,
    operations: HashMap<String, PendingOperation>,
    failing_deployments: HashSet<String>,
    polls_before_done: u32,
    next_id: u32,
    create_fault: Option<RpcError>,
    list_fault: Option<RpcError>,
    upload_fault: Option<RpcError>,
    stop_faults: HashMap<String, RpcError>,
    put_status: Option<u16>,
    repeated_page_token: Option<String>,
}

#[derive(Clone, Default)]
pub struct FakePlatform {
    state: Rc<RefCell<State>>,
}

pub fn deployment(id: &str, name: &str, status: DeploymentStatus, tags: &[&str]) -> Deployment {
    Deployment {
        id: id.to_string(),
        name: name.to_string(),
        project_name: "proj".to_string(),
        region_code: "EU".to_string(),
        status,
        tag: tags.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deployments(deployments: Vec<Deployment>) -> Self {
        let platform = Self::new();
        platform.state.borrow_mut().deployments = deployments;
        platform
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn stopped_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::StopDeployment { deployment_id, .. } => Some(deployment_id),
                _ => None,
            })
            .collect()
    }

    pub fn created(&self) -> Vec<Deployment> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::CreateDeployment(deployment) => Some(deployment),
                _ => None,
            })
            .collect()
    }

    pub fn updated(&self) -> Vec<Deployment> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::UpdateDeployment(deployment) => Some(deployment),
                _ => None,
            })
            .collect()
    }

    /// Operations for a deployment with this name resolve with no result.
    pub fn fail_creation_of(&self, deployment_name: &str) {
        self.state
            .borrow_mut()
            .failing_deployments
            .insert(deployment_name.to_string());
    }

    pub fn set_polls_before_done(&self, polls: u32) {
        self.state.borrow_mut().polls_before_done = polls;
    }

    pub fn fail_next_create(&self, error: RpcError) {
        self.state.borrow_mut().create_fault = Some(error);
    }

    pub fn fail_next_list(&self, error: RpcError) {
        self.state.borrow_mut().list_fault = Some(error);
    }

    pub fn fail_next_upload_snapshot(&self, error: RpcError) {
        self.state.borrow_mut().upload_fault = Some(error);
    }

    pub fn fail_stop_of(&self, deployment_id: &str, error: RpcError) {
        self.state
            .borrow_mut()
            .stop_faults
            .insert(deployment_id.to_string(), error);
    }

    /// Every listing page claims there is a next page behind `token`.
    pub fn repeat_page_token(&self, token: &str) {
        self.state.borrow_mut().repeated_page_token = Some(token.to_string());
    }

    pub fn fail_put_content(&self, status: u16) {
        self.state.borrow_mut().put_status = Some(status);
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl Platform for FakePlatform {
    fn create_deployment(&self, deployment: &Deployment) -> Result<OperationHandle, RpcError> {
        self.record(Call::CreateDeployment(deployment.clone()));
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.create_fault.take() {
            return Err(error);
        }

        state.next_id += 1;
        let name = format!("operations/{}", state.next_id);
        let mut created = deployment.clone();
        created.id = format!("{}-id", deployment.name);
        created.status = DeploymentStatus::Starting;
        let polls_remaining = state.polls_before_done;
        state.deployments.push(created.clone());
        state.operations.insert(
            name.clone(),
            PendingOperation {
                deployment: created,
                polls_remaining,
            },
        );
        Ok(OperationHandle { name })
    }

    fn get_operation(&self, handle: &OperationHandle) -> Result<OperationState, RpcError> {
        self.record(Call::GetOperation(handle.name.clone()));
        let mut state = self.state.borrow_mut();
        let failing = state.failing_deployments.clone();
        let operation = state
            .operations
            .get_mut(&handle.name)
            .ok_or_else(|| RpcError::new(RpcCode::NotFound, "no such operation"))?;

        if operation.polls_remaining > 0 {
            operation.polls_remaining -= 1;
            return Ok(OperationState::default());
        }

        if failing.contains(&operation.deployment.name) {
            return Ok(OperationState {
                done: true,
                response: None,
                error: Some(OperationFailure {
                    code: 13,
                    message: "deployment failed to start".to_string(),
                }),
            });
        }

        let mut deployment = operation.deployment.clone();
        deployment.status = DeploymentStatus::Running;
        Ok(OperationState {
            done: true,
            response: Some(deployment),
            error: None,
        })
    }

    fn list_deployments(&self, request: &ListDeploymentsRequest) -> Result<DeploymentPage, RpcError> {
        self.record(Call::ListDeployments(request.clone()));
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.list_fault.take() {
            return Err(error);
        }

        if let Some(token) = &state.repeated_page_token {
            let deployments = state
                .deployments
                .iter()
                .filter(|d| d.status != DeploymentStatus::Stopped)
                .cloned()
                .collect();
            return Ok(DeploymentPage {
                deployments,
                next_page_token: Some(token.clone()),
            });
        }

        let start: usize = request
            .page_token
            .as_deref()
            .and_then(|token| token.parse().ok())
            .unwrap_or(0);
        let page_size = request.page_size.max(1) as usize;
        let not_stopped: Vec<Deployment> = state
            .deployments
            .iter()
            .filter(|d| d.status != DeploymentStatus::Stopped)
            .cloned()
            .collect();
        let end = (start + page_size).min(not_stopped.len());
        let next_page_token = (end < not_stopped.len()).then(|| end.to_string());

        Ok(DeploymentPage {
            deployments: not_stopped[start.min(end)..end].to_vec(),
            next_page_token,
        })
    }

    fn stop_deployment(&self, project_name: &str, deployment_id: &str) -> Result<(), RpcError> {
        self.record(Call::StopDeployment {
            project_name: project_name.to_string(),
            deployment_id: deployment_id.to_string(),
        });
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.stop_faults.remove(deployment_id) {
            return Err(error);
        }

        match state.deployments.iter_mut().find(|d| d.id == deployment_id) {
            Some(deployment) => {
                deployment.status = DeploymentStatus::Stopped;
                Ok(())
            }
            None => Err(RpcError::new(RpcCode::NotFound, "deployment not found")),
        }
    }

    fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, RpcError> {
        self.record(Call::UpdateDeployment(deployment.clone()));
        let mut state = self.state.borrow_mut();
        match state.deployments.iter_mut().find(|d| d.id == deployment.id) {
            Some(existing) => {
                *existing = deployment.clone();
                Ok(deployment.clone())
            }
            None => Err(RpcError::new(RpcCode::NotFound, "deployment not found")),
        }
    }

    fn upload_snapshot(&self, snapshot: &Snapshot) -> Result<SnapshotUploadTarget, RpcError> {
        self.record(Call::UploadSnapshot(snapshot.clone()));
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.upload_fault.take() {
            return Err(error);
        }

        let uploads = state
            .calls
            .iter()
            .filter(|call| matches!(call, Call::UploadSnapshot(_)))
            .count();
        let mut registered = snapshot.clone();
        registered.id = format!("snapshot-{}", uploads);
        Ok(SnapshotUploadTarget {
            upload_url: format!("https://upload.example.com/{}", registered.id),
            snapshot: registered,
        })
    }

    fn confirm_upload(
        &self,
        project_name: &str,
        deployment_name: &str,
        snapshot_id: &str,
    ) -> Result<Snapshot, RpcError> {
        self.record(Call::ConfirmUpload {
            project_name: project_name.to_string(),
            deployment_name: deployment_name.to_string(),
            snapshot_id: snapshot_id.to_string(),
        });
        Ok(Snapshot {
            id: snapshot_id.to_string(),
            project_name: project_name.to_string(),
            deployment_name: deployment_name.to_string(),
            ..Default::default()
        })
    }

    fn create_development_authentication_token(
        &self,
        project_name: &str,
        description: &str,
        lifetime: Duration,
    ) -> Result<DevelopmentAuthenticationToken, RpcError> {
        self.record(Call::CreateDevelopmentAuthenticationToken {
            project_name: project_name.to_string(),
            description: description.to_string(),
            lifetime,
        });
        Ok(DevelopmentAuthenticationToken {
            id: "dat-1".to_string(),
            token_secret: "dat-secret".to_string(),
        })
    }

    fn put_content(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(&str, String)],
    ) -> Result<(), LaunchError> {
        self.record(Call::PutContent {
            url: url.to_string(),
            body,
            headers: headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        });
        match self.state.borrow().put_status {
            Some(status) => Err(LaunchError::SnapshotUpload {
                status,
                body: "denied".to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Hands out the same [`FakePlatform`] for every region and records which
/// regions were asked for.
#[derive(Default)]
pub struct FakeConnector {
    pub platform: FakePlatform,
    regions: RefCell<Vec<String>>,
}

impl FakeConnector {
    pub fn new(platform: FakePlatform) -> Self {
        Self {
            platform,
            regions: RefCell::new(Vec::new()),
        }
    }

    pub fn regions(&self) -> Vec<String> {
        self.regions.borrow().clone()
    }
}

impl PlatformConnector for FakeConnector {
    fn connect(&self, region: &str) -> anyhow::Result<Box<dyn Platform>> {
        self.regions.borrow_mut().push(region.to_string());
        Ok(Box::new(self.platform.clone()))
    }
}

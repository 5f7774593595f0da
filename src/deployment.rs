use crate::config::LauncherConfig;
use crate::error::{LaunchError, RpcCode, RpcError};
use crate::launch_config::{patch_launch_config, SchemaVariant, SimulatedPlayerPatch, COORDINATOR_WORKER};
use crate::operation::Operation;
use crate::platform::{
    Deployment, LaunchConfig, ListDeploymentsRequest, Platform, StoppedStatusFilter, WorkerFlag,
    DEV_AUTH_TOKEN_LIFETIME,
};
use crate::snapshot::upload_snapshot;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Every deployment this tool creates carries this tag; nothing else is touched.
pub const LAUNCHER_TAG: &str = "unreal_deployment_launcher";
pub const SIM_PLAYER_TAG: &str = "simulated_players";
/// Lets simulated players log in with tokens generated by anonymous auth.
pub const DEV_LOGIN_TAG: &str = "dev_login";
pub const TARGET_DEPLOYMENT_READY_FLAG: &str = "target_deployment_ready";

const DEV_AUTH_TOKEN_DESCRIPTION: &str = "DAT for simulated player deployment.";

pub struct MainDeploymentRequest<'r> {
    pub project: &'r str,
    pub assembly: &'r str,
    pub runtime_version: &'r str,
    pub name: &'r str,
    pub launch_config_path: &'r Path,
    pub snapshot_path: &'r Path,
    pub region: &'r str,
    pub with_simulated_players: bool,
    pub encrypt_snapshot_upload: bool,
}

pub struct SimulatedDeploymentRequest<'r> {
    pub project: &'r str,
    pub assembly: &'r str,
    pub runtime_version: &'r str,
    pub target_deployment: &'r str,
    pub name: &'r str,
    pub launch_config_path: &'r Path,
    pub region: &'r str,
    pub simulated_player_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// The platform does not know the deployment.
    UnknownDeployment,
    /// No active launcher deployment has the requested name.
    NotRunning,
}

/// Create, replace, link, stop and list launcher deployments of one region.
pub struct DeploymentManager<'a> {
    platform: &'a dyn Platform,
    config: &'a LauncherConfig,
}

impl<'a> DeploymentManager<'a> {
    pub fn new(platform: &'a dyn Platform, config: &'a LauncherConfig) -> Self {
        Self { platform, config }
    }

    /// Active (Starting or Running) deployments tagged by this launcher.
    pub fn list_launched_active(&self, project: &str) -> Result<Vec<Deployment>, RpcError> {
        let mut request = ListDeploymentsRequest {
            project_name: project.to_string(),
            deployment_stopped_status_filter: StoppedStatusFilter::NotStoppedDeployments,
            page_size: self.config.list_page_size,
            page_token: None,
        };

        let mut launched = Vec::new();
        let mut seen_tokens = HashSet::new();
        loop {
            let page = self.platform.list_deployments(&request)?;
            launched.extend(
                page.deployments
                    .into_iter()
                    .filter(|d| d.status.is_active() && d.has_tag(LAUNCHER_TAG)),
            );

            let token = match page.next_page_token {
                Some(token) if !token.is_empty() => token,
                _ => break,
            };
            if !seen_tokens.insert(token.clone()) {
                warn!(page_token = %token, "deployment listing repeated a page token, stopping");
                break;
            }
            request.page_token = Some(token);
        }
        Ok(launched)
    }

    pub fn find_active(&self, project: &str, name: &str) -> Result<Option<Deployment>, RpcError> {
        Ok(self
            .list_launched_active(project)?
            .into_iter()
            .find(|d| d.name == name))
    }

    pub fn deployment_exists(&self, project: &str, name: &str) -> Result<bool, RpcError> {
        Ok(self.find_active(project, name)?.is_some())
    }

    /// Stops the active deployment called `name` so the name can be reused.
    ///
    /// Check-then-act: another invocation could stop or create the same
    /// name between the list and the stop.
    pub fn replace_if_exists(&self, project: &str, name: &str) -> Result<StopOutcome, RpcError> {
        if !self.deployment_exists(project, name)? {
            return Ok(StopOutcome::NotRunning);
        }
        self.stop_by_name(project, name)
    }

    pub fn stop_by_name(&self, project: &str, name: &str) -> Result<StopOutcome, RpcError> {
        match self.find_active(project, name)? {
            Some(existing) => {
                info!("Stopping active deployment by name: {}", existing.name);
                self.stop(project, &existing.id)
            }
            None => {
                info!(
                    "Unable to stop the deployment {} because it can't be found or isn't running.",
                    name
                );
                Ok(StopOutcome::NotRunning)
            }
        }
    }

    /// Stops one deployment. Not-found is an outcome, every other fault is an error.
    pub fn stop(&self, project: &str, deployment_id: &str) -> Result<StopOutcome, RpcError> {
        info!("Stopping deployment with id {}", deployment_id);
        match self.platform.stop_deployment(project, deployment_id) {
            Ok(()) => Ok(StopOutcome::Stopped),
            Err(RpcError {
                code: RpcCode::NotFound,
                ..
            }) => Ok(StopOutcome::UnknownDeployment),
            Err(err) => Err(err),
        }
    }

    /// Uploads the snapshot and submits the main deployment.
    pub fn create_main(&self, request: &MainDeploymentRequest<'_>) -> Result<Operation<'a>, LaunchError> {
        let snapshot_id = upload_snapshot(
            self.platform,
            request.snapshot_path,
            request.project,
            request.name,
            request.encrypt_snapshot_upload,
        )?;

        let mut deployment = Deployment {
            name: request.name.to_string(),
            project_name: request.project.to_string(),
            region_code: request.region.to_string(),
            assembly_id: request.assembly.to_string(),
            runtime_version: request.runtime_version.to_string(),
            launch_config: LaunchConfig {
                config_json: fs::read_to_string(request.launch_config_path)?,
            },
            starting_snapshot_id: Some(snapshot_id.clone()),
            ..Default::default()
        };
        deployment.add_tag(LAUNCHER_TAG);
        if request.with_simulated_players {
            deployment.add_tag(DEV_LOGIN_TAG);
        }

        info!(
            "Creating the main deployment {} in project {} with snapshot ID {}. Link: {}",
            request.name,
            request.project,
            snapshot_id,
            self.config.overview_url(request.project, request.name)
        );

        let handle = self.platform.create_deployment(&deployment)?;
        Ok(Operation::new(self.platform, handle, self.config.poll_interval()))
    }

    /// Issues a development token, patches the launch configuration and
    /// submits the simulated-player deployment. It never gets a snapshot.
    pub fn create_simulated(
        &self,
        auth: &dyn Platform,
        request: &SimulatedDeploymentRequest<'_>,
    ) -> Result<Operation<'a>, LaunchError> {
        let token = auth.create_development_authentication_token(
            request.project,
            DEV_AUTH_TOKEN_DESCRIPTION,
            DEV_AUTH_TOKEN_LIFETIME,
        )?;
        debug!(token_id = %token.id, "issued development authentication token");

        let source = fs::read_to_string(request.launch_config_path)?;
        let patch = SimulatedPlayerPatch {
            coordinator_worker: COORDINATOR_WORKER,
            dev_auth_token: &token.token_secret,
            target_deployment: request.target_deployment,
            simulated_player_count: request.simulated_player_count,
        };
        let (config_json, _report) = patch_launch_config(
            &source,
            SchemaVariant::from_path(request.launch_config_path),
            &patch,
        )?;

        let mut deployment = Deployment {
            name: request.name.to_string(),
            project_name: request.project.to_string(),
            region_code: request.region.to_string(),
            assembly_id: request.assembly.to_string(),
            runtime_version: request.runtime_version.to_string(),
            launch_config: LaunchConfig { config_json },
            starting_snapshot_id: None,
            ..Default::default()
        };
        deployment.add_tag(LAUNCHER_TAG);
        deployment.add_tag(SIM_PLAYER_TAG);

        info!(
            "Creating the simulated player deployment {} in project {} with {} simulated players. Link: {}",
            request.name,
            request.project,
            request.simulated_player_count,
            self.config.overview_url(request.project, request.name)
        );

        let handle = self.platform.create_deployment(&deployment)?;
        Ok(Operation::new(self.platform, handle, self.config.poll_interval()))
    }

    /// Tells the running simulated-player deployment whether its target is
    /// live. `ready` is sent as given.
    pub fn finalize_linkage(&self, mut simulated: Deployment, ready: &str) -> Result<Deployment, RpcError> {
        simulated.worker_flags.push(WorkerFlag {
            worker_type: COORDINATOR_WORKER.to_string(),
            key: TARGET_DEPLOYMENT_READY_FLAG.to_string(),
            value: ready.to_string(),
        });
        self.platform.update_deployment(&simulated)
    }

    /// One `<deployment>` or `<simulated-player-deployment>` line per active
    /// launcher deployment.
    pub fn status_lines(&self, project: &str) -> Result<Vec<String>, RpcError> {
        Ok(self
            .list_launched_active(project)?
            .iter()
            .map(|deployment| self.status_line(project, deployment))
            .collect())
    }

    fn status_line(&self, project: &str, deployment: &Deployment) -> String {
        let kind = if deployment.has_tag(SIM_PLAYER_TAG) {
            "<simulated-player-deployment>"
        } else {
            "<deployment>"
        };
        let url = format!(
            "{}/{}",
            self.config.overview_url(project, &deployment.name),
            deployment.id
        );
        format!(
            "{} {} {} {} {} {}",
            kind, deployment.id, deployment.name, deployment.region_code, url, deployment.status
        )
    }
}

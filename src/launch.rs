use crate::config::LauncherConfig;
use crate::deployment::{DeploymentManager, MainDeploymentRequest, SimulatedDeploymentRequest};
use crate::error::LaunchError;
use crate::platform::PlatformConnector;
use crate::region::RegionResolver;
use anyhow::Result;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

pub struct SimulatedPlayerArgs {
    pub name: String,
    pub launch_json: PathBuf,
    pub region: String,
    pub player_count: u32,
}

pub struct CreateArgs {
    pub project: String,
    pub assembly: String,
    pub runtime_version: String,
    pub main_name: String,
    pub main_launch_json: PathBuf,
    pub main_snapshot: PathBuf,
    pub main_region: String,
    pub simulated: Option<SimulatedPlayerArgs>,
}

pub struct CreateSimArgs {
    pub project: String,
    pub assembly: String,
    pub runtime_version: String,
    pub target_name: String,
    pub simulated: SimulatedPlayerArgs,
    pub auto_connect: bool,
}

/// Launches the main deployment and, optionally, a simulated-player
/// deployment aimed at it.
///
/// Both creations are submitted before either is awaited. The main
/// deployment is always awaited first, and a failure there ends the run
/// without looking at the simulated-player operation.
pub fn create(
    connector: &dyn PlatformConnector,
    resolver: &RegionResolver,
    config: &LauncherConfig,
    args: &CreateArgs,
) -> Result<()> {
    let start = Instant::now();

    let platform = connector.connect(&args.main_region)?;
    let manager = DeploymentManager::new(platform.as_ref(), config);

    manager.replace_if_exists(&args.project, &args.main_name)?;

    let main_request = MainDeploymentRequest {
        project: &args.project,
        assembly: &args.assembly,
        runtime_version: &args.runtime_version,
        name: &args.main_name,
        launch_config_path: &args.main_launch_json,
        snapshot_path: &args.main_snapshot,
        region: &args.main_region,
        with_simulated_players: args.simulated.is_some(),
        encrypt_snapshot_upload: resolver.is_restricted(&args.main_region),
    };
    let main_operation = manager.create_main(&main_request)?;

    let simulated = match &args.simulated {
        Some(simulated) => simulated,
        None => {
            info!("Waiting for deployment to be ready...");
            if main_operation.wait_for_result()?.is_none() {
                return Err(LaunchError::CreationFailed("main").into());
            }
            println!("Successfully created the main deployment");
            info!("Deployment ready in {:?}s", start.elapsed().as_secs());
            return Ok(());
        }
    };

    manager.replace_if_exists(&args.project, &simulated.name)?;

    let auth_platform = connector.connect(&simulated.region)?;
    let sim_request = SimulatedDeploymentRequest {
        project: &args.project,
        assembly: &args.assembly,
        runtime_version: &args.runtime_version,
        target_deployment: &args.main_name,
        name: &simulated.name,
        launch_config_path: &simulated.launch_json,
        region: &simulated.region,
        simulated_player_count: simulated.player_count,
    };
    let sim_operation = manager.create_simulated(auth_platform.as_ref(), &sim_request)?;

    info!("Waiting for deployments to be ready...");
    if main_operation.wait_for_result()?.is_none() {
        return Err(LaunchError::CreationFailed("main").into());
    }
    println!("Successfully created the main deployment");

    let sim_deployment = sim_operation
        .wait_for_result()?
        .ok_or(LaunchError::CreationFailed("simulated player"))?;
    println!("Successfully created the simulated player deployment");

    manager.finalize_linkage(sim_deployment, "true")?;
    println!("Done! Simulated players will start to connect to your deployment");
    info!("Deployments ready in {:?}s", start.elapsed().as_secs());
    Ok(())
}

/// `createsim` sends the capitalised form, `create` sends `"true"`.
fn auto_connect_flag(auto_connect: bool) -> &'static str {
    if auto_connect {
        "True"
    } else {
        "False"
    }
}

/// Launches only a simulated-player deployment against an existing target.
pub fn create_sim(
    connector: &dyn PlatformConnector,
    config: &LauncherConfig,
    args: &CreateSimArgs,
) -> Result<()> {
    let simulated = &args.simulated;
    let platform = connector.connect(&simulated.region)?;
    let manager = DeploymentManager::new(platform.as_ref(), config);

    manager.replace_if_exists(&args.project, &simulated.name)?;

    let request = SimulatedDeploymentRequest {
        project: &args.project,
        assembly: &args.assembly,
        runtime_version: &args.runtime_version,
        target_deployment: &args.target_name,
        name: &simulated.name,
        launch_config_path: &simulated.launch_json,
        region: &simulated.region,
        simulated_player_count: simulated.player_count,
    };
    let operation = manager.create_simulated(platform.as_ref(), &request)?;

    info!("Waiting for the simulated player deployment to be ready...");
    let sim_deployment = operation
        .wait_for_result()?
        .ok_or(LaunchError::CreationFailed("simulated player"))?;
    println!("Successfully created the simulated player deployment");

    manager.finalize_linkage(sim_deployment, auto_connect_flag(args.auto_connect))?;
    println!("Done! Simulated players will start to connect to your deployment");
    Ok(())
}

use crate::config::LauncherConfig;
use crate::deployment::{DeploymentManager, StopOutcome};
use crate::platform::PlatformConnector;
use anyhow::Result;
use std::io::{self, Write};
use tracing::info;

pub const UNKNOWN_DEPLOYMENT: &str = "<error:unknown-deployment>";

/// Stops one deployment by id, or every active launcher deployment in the
/// project when no id is given.
///
/// An unknown deployment is reported and skipped; any other fault ends the
/// sweep.
pub fn stop(
    connector: &dyn PlatformConnector,
    config: &LauncherConfig,
    project: &str,
    region: &str,
    deployment_id: Option<&str>,
) -> Result<()> {
    stop_to(&mut io::stdout(), connector, config, project, region, deployment_id)
}

/// Like [`stop`], writing the unknown-deployment tokens to `out` as they occur.
fn stop_to(
    out: &mut dyn Write,
    connector: &dyn PlatformConnector,
    config: &LauncherConfig,
    project: &str,
    region: &str,
    deployment_id: Option<&str>,
) -> Result<()> {
    let platform = connector.connect(region)?;
    let manager = DeploymentManager::new(platform.as_ref(), config);

    let ids = match deployment_id {
        Some(id) => vec![id.to_string()],
        None => manager
            .list_launched_active(project)?
            .into_iter()
            .map(|deployment| deployment.id)
            .collect(),
    };

    if ids.is_empty() {
        info!("No active deployments to stop in project {}", project);
    }

    for id in &ids {
        if manager.stop(project, id)? == StopOutcome::UnknownDeployment {
            writeln!(out, "{}", UNKNOWN_DEPLOYMENT)?;
        }
    }
    Ok(())
}

use crate::config::LauncherConfig;
use crate::deployment::DeploymentManager;
use crate::platform::PlatformConnector;
use anyhow::Result;

/// Prints one status line per active deployment started by this launcher.
pub fn list(
    connector: &dyn PlatformConnector,
    config: &LauncherConfig,
    project: &str,
    region: &str,
) -> Result<()> {
    for line in status_lines(connector, config, project, region)? {
        println!("{}", line);
    }
    Ok(())
}

fn status_lines(
    connector: &dyn PlatformConnector,
    config: &LauncherConfig,
    project: &str,
    region: &str,
) -> Result<Vec<String>> {
    let platform = connector.connect(region)?;
    let manager = DeploymentManager::new(platform.as_ref(), config);
    Ok(manager.status_lines(project)?)
}

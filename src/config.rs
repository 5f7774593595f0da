use anyhow::{Context, Result};
use homedir::my_home;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{fs, time::Duration};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("https://{}:{}/v1alpha1", self.host, self.port)
    }
}

/// Settings read from `~/.config/deployment-launcher/launcher.yml`.
///
/// Every field is optional in the file; anything left out keeps the value
/// the public platform uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub default_endpoint: Endpoint,
    pub default_refresh_token_path: Option<PathBuf>,
    pub default_auth_token_url: String,
    pub restricted_region: String,
    pub restricted_endpoint: Endpoint,
    pub restricted_refresh_token_path: Option<PathBuf>,
    pub restricted_auth_token_url: String,
    pub console_url: String,
    pub poll_interval_secs: u64,
    pub list_page_size: u32,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            default_endpoint: Endpoint::new("platform.api.improbable.io", 443),
            default_refresh_token_path: None,
            default_auth_token_url: "https://auth.improbable.io/auth/v1/token".to_string(),
            restricted_region: "CN".to_string(),
            restricted_endpoint: Endpoint::new("platform.api.spatialoschina.com", 443),
            restricted_refresh_token_path: None,
            restricted_auth_token_url: "https://auth.spatialoschina.com/auth/v1/token".to_string(),
            console_url: "https://console.improbable.io".to_string(),
            poll_interval_secs: 2,
            list_page_size: 50,
        }
    }
}

impl LauncherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn overview_url(&self, project: &str, deployment_name: &str) -> String {
        format!(
            "{}/projects/{}/deployments/{}/overview",
            self.console_url.trim_end_matches('/'),
            project,
            deployment_name
        )
    }

    /// Token file used for every region except the restricted one.
    pub fn default_refresh_token_file(&self) -> Result<PathBuf> {
        match &self.default_refresh_token_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_oauth2_dir()?.join("oauth2_refresh_token")),
        }
    }

    pub fn restricted_refresh_token_file(&self) -> Result<PathBuf> {
        match &self.restricted_refresh_token_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_oauth2_dir()?.join("oauth2_refresh_token_cn-production")),
        }
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = my_home()?
        .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?
        .join(".config/deployment-launcher");

    Ok(config_dir)
}

fn get_oauth2_dir() -> Result<PathBuf> {
    let oauth2_dir = my_home()?
        .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?
        .join(".improbable/oauth2");

    Ok(oauth2_dir)
}

pub fn load_launcher_config() -> Result<LauncherConfig> {
    let config_path = get_config_dir()?.join("launcher.yml");
    load_launcher_config_from(&config_path)
}

/// A missing file means defaults; a malformed one is an error.
pub fn load_launcher_config_from(path: &Path) -> Result<LauncherConfig> {
    if !path.exists() {
        return Ok(LauncherConfig::default());
    }

    let config_data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read launcher config {}", path.display()))?;
    let config: LauncherConfig = serde_yaml::from_str(&config_data)
        .with_context(|| format!("Failed to parse launcher config {}", path.display()))?;
    Ok(config)
}

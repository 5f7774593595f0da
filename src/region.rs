use crate::config::{Endpoint, LauncherConfig};
use crate::error::LaunchError;
use std::fs;
use std::path::Path;
use tracing::debug;

/// OAuth2 refresh token plus the URL it is exchanged at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenCredential {
    pub refresh_token: String,
    pub token_url: String,
}

impl RefreshTokenCredential {
    pub fn from_file(path: &Path, token_url: &str) -> Result<Self, LaunchError> {
        let refresh_token = fs::read_to_string(path)
            .map_err(|_| LaunchError::MissingRefreshToken(path.to_path_buf()))?;
        Ok(Self {
            refresh_token: refresh_token.trim().to_string(),
            token_url: token_url.to_string(),
        })
    }
}

/// Where the platform clients for a region should connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiTarget {
    /// Global endpoint with ambient credentials.
    Default,
    Restricted {
        endpoint: Endpoint,
        credential: RefreshTokenCredential,
    },
}

/// Maps region codes to API targets.
///
/// Built once at startup. The restricted-region credential is read from
/// disk at construction, and only when that region is actually requested.
#[derive(Debug)]
pub struct RegionResolver {
    restricted_region: String,
    restricted: Option<(Endpoint, RefreshTokenCredential)>,
}

impl RegionResolver {
    pub fn new<'a>(
        config: &LauncherConfig,
        requested_regions: impl IntoIterator<Item = &'a str>,
    ) -> anyhow::Result<Self> {
        let needs_restricted = requested_regions
            .into_iter()
            .any(|region| region == config.restricted_region);

        let restricted = if needs_restricted {
            let token_path = config.restricted_refresh_token_file()?;
            debug!(path = %token_path.display(), "reading restricted region refresh token");
            let credential =
                RefreshTokenCredential::from_file(&token_path, &config.restricted_auth_token_url)?;
            Some((config.restricted_endpoint.clone(), credential))
        } else {
            None
        };

        Ok(Self {
            restricted_region: config.restricted_region.clone(),
            restricted,
        })
    }

    pub fn is_restricted(&self, region: &str) -> bool {
        region == self.restricted_region
    }

    pub fn resolve(&self, region: &str) -> ApiTarget {
        match &self.restricted {
            Some((endpoint, credential)) if self.is_restricted(region) => ApiTarget::Restricted {
                endpoint: endpoint.clone(),
                credential: credential.clone(),
            },
            _ => ApiTarget::Default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_token(dir: &Path, token: Option<&str>) -> LauncherConfig {
        let path = dir.join("oauth2_refresh_token_cn-production");
        if let Some(token) = token {
            fs::write(&path, token).unwrap();
        }
        LauncherConfig {
            restricted_refresh_token_path: Some(path),
            ..Default::default()
        }
    }

    #[test]
    fn restricted_region_gets_alternate_endpoint_and_credential() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_token(dir.path(), Some("secret-token\n"));

        let resolver = RegionResolver::new(&config, ["EU", "CN"]).unwrap();
        match resolver.resolve("CN") {
            ApiTarget::Restricted {
                endpoint,
                credential,
            } => {
                assert_eq!(endpoint, Endpoint::new("platform.api.spatialoschina.com", 443));
                assert_eq!(credential.refresh_token, "secret-token");
                assert_eq!(
                    credential.token_url,
                    "https://auth.spatialoschina.com/auth/v1/token"
                );
            }
            other => panic!("expected restricted target, got {:?}", other),
        }
        assert_eq!(resolver.resolve("EU"), ApiTarget::Default);
    }

    #[test]
    fn other_regions_use_default_without_reading_token() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_token(dir.path(), None);

        let resolver = RegionResolver::new(&config, ["EU", "US"]).unwrap();
        assert_eq!(resolver.resolve("US"), ApiTarget::Default);
        assert_eq!(resolver.resolve("AP"), ApiTarget::Default);
    }

    #[test]
    fn unreadable_token_is_fatal_when_restricted_region_requested() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_token(dir.path(), None);

        let err = RegionResolver::new(&config, ["CN"]).unwrap_err();
        assert!(err.to_string().contains("refresh token"));
    }

    #[test]
    fn region_codes_are_case_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_token(dir.path(), Some("t"));

        let resolver = RegionResolver::new(&config, ["CN"]).unwrap();
        assert_eq!(resolver.resolve("cn"), ApiTarget::Default);
    }
}

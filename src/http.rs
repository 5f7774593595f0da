//! JSON-over-HTTPS client for the platform API.

use crate::config::{Endpoint, LauncherConfig};
use crate::error::{LaunchError, RpcCode, RpcError};
use crate::platform::{
    Deployment, DeploymentPage, DevelopmentAuthenticationToken, ListDeploymentsRequest,
    OperationHandle, OperationState, Platform, PlatformConnector, Snapshot, SnapshotUploadTarget,
};
use crate::region::{ApiTarget, RefreshTokenCredential, RegionResolver};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct CreateDeploymentRequest<'a> {
    deployment: &'a Deployment,
}

#[derive(Debug, Serialize)]
struct UpdateDeploymentRequest<'a> {
    deployment: &'a Deployment,
}

#[derive(Debug, Serialize)]
struct UploadSnapshotRequest<'a> {
    snapshot: &'a Snapshot,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    snapshot: Snapshot,
}

#[derive(Debug, Serialize)]
struct ConfirmUploadRequest<'a> {
    deployment_name: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateDevelopmentAuthenticationTokenRequest<'a> {
    description: &'a str,
    lifetime: String,
}

pub struct HttpPlatform {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpPlatform {
    pub fn new(endpoint: &Endpoint, credential: Option<&RefreshTokenCredential>) -> Result<Self, LaunchError> {
        let client = Client::builder().build()?;
        let access_token = match credential {
            Some(credential) => Some(exchange_refresh_token(&client, credential)?),
            None => None,
        };

        Ok(Self {
            client,
            base_url: endpoint.base_url(),
            access_token,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn project_url(&self, project_name: &str) -> String {
        format!("{}/projects/{}", self.base_url, project_name)
    }
}

fn exchange_refresh_token(client: &Client, credential: &RefreshTokenCredential) -> Result<String, LaunchError> {
    debug!(token_url = %credential.token_url, "exchanging refresh token");
    let response = client
        .post(&credential.token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", credential.refresh_token.as_str()),
        ])
        .send()?;

    let token: AccessTokenResponse = read_response(response)?;
    Ok(token.access_token)
}

fn send(request: RequestBuilder) -> Result<Response, RpcError> {
    request.send().map_err(transport_error)
}

/// The request never got an HTTP answer.
fn transport_error(err: reqwest::Error) -> RpcError {
    RpcError::new(RpcCode::Unavailable, err.to_string())
}

fn read_response<T: DeserializeOwned>(response: Response) -> Result<T, RpcError> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status.as_u16(), response));
    }

    response
        .json()
        .map_err(|e| RpcError::new(RpcCode::Unknown, format!("invalid response body: {}", e)))
}

fn read_empty_response(response: Response) -> Result<(), RpcError> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status.as_u16(), response));
    }
    Ok(())
}

fn status_error(status: u16, response: Response) -> RpcError {
    let body = response.text().unwrap_or_default();
    rpc_error(status, &body)
}

/// Maps a failed HTTP answer to a platform fault. The detail is the body's
/// `message` field, or the raw body when there is none.
fn rpc_error(status: u16, body: &str) -> RpcError {
    let detail = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(error) if !error.message.is_empty() => error.message,
        _ => body.to_string(),
    };
    RpcError::new(RpcCode::from_http_status(status), detail)
}

impl Platform for HttpPlatform {
    fn create_deployment(&self, deployment: &Deployment) -> Result<OperationHandle, RpcError> {
        let url = format!("{}/deployments", self.project_url(&deployment.project_name));
        let request = self
            .client
            .post(url)
            .json(&CreateDeploymentRequest { deployment });
        read_response(send(self.authorized(request))?)
    }

    fn get_operation(&self, handle: &OperationHandle) -> Result<OperationState, RpcError> {
        let url = format!("{}/{}", self.base_url, handle.name);
        read_response(send(self.authorized(self.client.get(url)))?)
    }

    fn list_deployments(&self, request: &ListDeploymentsRequest) -> Result<DeploymentPage, RpcError> {
        let url = format!("{}/deployments", self.project_url(&request.project_name));
        let mut query = vec![
            ("view", "BASIC".to_string()),
            (
                "deployment_stopped_status_filter",
                "NOT_STOPPED_DEPLOYMENTS".to_string(),
            ),
            ("page_size", request.page_size.to_string()),
        ];
        if let Some(token) = &request.page_token {
            query.push(("page_token", token.clone()));
        }

        read_response(send(self.authorized(self.client.get(url).query(&query)))?)
    }

    fn stop_deployment(&self, project_name: &str, deployment_id: &str) -> Result<(), RpcError> {
        let url = format!(
            "{}/deployments/{}:stop",
            self.project_url(project_name),
            deployment_id
        );
        read_empty_response(send(self.authorized(self.client.post(url)))?)
    }

    fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, RpcError> {
        let url = format!(
            "{}/deployments/{}",
            self.project_url(&deployment.project_name),
            deployment.id
        );
        let request = self
            .client
            .patch(url)
            .json(&UpdateDeploymentRequest { deployment });
        read_response(send(self.authorized(request))?)
    }

    fn upload_snapshot(&self, snapshot: &Snapshot) -> Result<SnapshotUploadTarget, RpcError> {
        let url = format!("{}/snapshots:upload", self.project_url(&snapshot.project_name));
        let request = self.client.post(url).json(&UploadSnapshotRequest { snapshot });
        read_response(send(self.authorized(request))?)
    }

    fn confirm_upload(
        &self,
        project_name: &str,
        deployment_name: &str,
        snapshot_id: &str,
    ) -> Result<Snapshot, RpcError> {
        let url = format!(
            "{}/snapshots/{}:confirmUpload",
            self.project_url(project_name),
            snapshot_id
        );
        let request = self
            .client
            .post(url)
            .json(&ConfirmUploadRequest { deployment_name });
        let response: SnapshotResponse = read_response(send(self.authorized(request))?)?;
        Ok(response.snapshot)
    }

    fn create_development_authentication_token(
        &self,
        project_name: &str,
        description: &str,
        lifetime: Duration,
    ) -> Result<DevelopmentAuthenticationToken, RpcError> {
        let url = format!(
            "{}/developmentAuthenticationTokens",
            self.project_url(project_name)
        );
        let request = self
            .client
            .post(url)
            .json(&CreateDevelopmentAuthenticationTokenRequest {
                description,
                lifetime: format!("{}s", lifetime.as_secs()),
            });
        read_response(send(self.authorized(request))?)
    }

    fn put_content(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(&str, String)],
    ) -> Result<(), LaunchError> {
        let mut request = self.client.put(url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request.body(body).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LaunchError::SnapshotUpload {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Connects to each region's endpoint over HTTPS.
pub struct HttpConnector<'a> {
    config: &'a LauncherConfig,
    resolver: &'a RegionResolver,
}

impl<'a> HttpConnector<'a> {
    pub fn new(config: &'a LauncherConfig, resolver: &'a RegionResolver) -> Self {
        Self { config, resolver }
    }

    fn ambient_credential(&self) -> anyhow::Result<Option<RefreshTokenCredential>> {
        let token_path = self.config.default_refresh_token_file()?;
        if !token_path.exists() {
            warn!(
                path = %token_path.display(),
                "no refresh token found, sending unauthenticated requests"
            );
            return Ok(None);
        }

        let credential =
            RefreshTokenCredential::from_file(&token_path, &self.config.default_auth_token_url)?;
        Ok(Some(credential))
    }
}

impl PlatformConnector for HttpConnector<'_> {
    fn connect(&self, region: &str) -> anyhow::Result<Box<dyn Platform>> {
        let platform = match self.resolver.resolve(region) {
            ApiTarget::Restricted {
                endpoint,
                credential,
            } => HttpPlatform::new(&endpoint, Some(&credential))?,
            ApiTarget::Default => {
                let credential = self.ambient_credential()?;
                HttpPlatform::new(&self.config.default_endpoint, credential.as_ref())?
            }
        };
        Ok(Box::new(platform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_detail_comes_from_message_field() {
        let err = rpc_error(404, r#"{"code":5,"message":"project 'proj' not found"}"#);
        assert_eq!(err.code, RpcCode::NotFound);
        assert_eq!(err.detail, "project 'proj' not found");
    }

    #[test]
    fn empty_message_falls_back_to_raw_body() {
        let body = r#"{"code":8,"message":""}"#;
        let err = rpc_error(429, body);
        assert_eq!(err.code, RpcCode::ResourceExhausted);
        assert_eq!(err.detail, body);
    }

    #[test]
    fn non_json_body_is_kept_verbatim() {
        let err = rpc_error(503, "upstream connect error");
        assert_eq!(err.code, RpcCode::Unavailable);
        assert_eq!(err.detail, "upstream connect error");

        let err = rpc_error(401, "");
        assert_eq!(err.code, RpcCode::Unauthenticated);
        assert_eq!(err.detail, "");
    }

    #[test]
    fn unmapped_status_is_unknown() {
        let err = rpc_error(500, r#"{"message":"internal"}"#);
        assert_eq!(err.code, RpcCode::Unknown);
        assert_eq!(err.detail, "internal");
    }

    #[test]
    fn request_that_cannot_be_sent_is_unavailable() {
        let client = Client::new();
        let err = send(client.get("not a url")).unwrap_err();
        assert_eq!(err.code, RpcCode::Unavailable);
        assert!(!err.detail.is_empty());
    }

    #[test]
    fn base_url_and_project_paths() {
        let platform = HttpPlatform {
            client: Client::new(),
            base_url: Endpoint::new("platform.example.com", 443).base_url(),
            access_token: None,
        };
        assert_eq!(
            platform.project_url("proj"),
            "https://platform.example.com:443/v1alpha1/projects/proj"
        );
    }
}

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Status classes the platform reports for a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcCode {
    NotFound,
    ResourceExhausted,
    Unauthenticated,
    PermissionDenied,
    InvalidArgument,
    Unavailable,
    Unknown,
}

impl RpcCode {
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => RpcCode::InvalidArgument,
            401 => RpcCode::Unauthenticated,
            403 => RpcCode::PermissionDenied,
            404 => RpcCode::NotFound,
            429 => RpcCode::ResourceExhausted,
            503 => RpcCode::Unavailable,
            _ => RpcCode::Unknown,
        }
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RpcCode::NotFound => "not found",
            RpcCode::ResourceExhausted => "resource exhausted",
            RpcCode::Unauthenticated => "unauthenticated",
            RpcCode::PermissionDenied => "permission denied",
            RpcCode::InvalidArgument => "invalid argument",
            RpcCode::Unavailable => "unavailable",
            RpcCode::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A failed call against the platform API.
#[derive(Debug, Clone, Error)]
#[error("platform call failed ({code}): {detail}")]
pub struct RpcError {
    pub code: RpcCode,
    pub detail: String,
}

impl RpcError {
    pub fn new(code: RpcCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Unable to load {0}. Does the file exist?")]
    SnapshotNotFound(PathBuf),

    #[error("snapshot upload failed: HTTP {status} {body}")]
    SnapshotUpload { status: u16, body: String },

    #[error("malformed launch configuration: {0}")]
    LaunchConfig(#[from] serde_json::Error),

    #[error("unexpected launch configuration shape: {0}")]
    LaunchConfigShape(String),

    #[error("Failed to create the {0} deployment")]
    CreationFailed(&'static str),

    #[error("failed to read refresh token {0}")]
    MissingRefreshToken(PathBuf),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LaunchError {
    /// The remote status of this failure, if it came from the platform.
    pub fn rpc(&self) -> Option<&RpcError> {
        match self {
            LaunchError::Rpc(err) => Some(err),
            _ => None,
        }
    }
}

pub const UNAUTHENTICATED_HINT: &str = "Error: unauthenticated. Please run `spatial auth login`";

/// Finds the platform fault behind an `anyhow` chain, if there is one.
pub fn find_rpc_error(err: &anyhow::Error) -> Option<&RpcError> {
    err.chain().find_map(|cause| {
        cause
            .downcast_ref::<RpcError>()
            .or_else(|| cause.downcast_ref::<LaunchError>().and_then(LaunchError::rpc))
    })
}

/// Operator message for a failed `create`/`createsim` run.
pub fn launch_failure_message(err: &anyhow::Error, project: &str, assembly: &str) -> String {
    match find_rpc_error(err) {
        Some(rpc) => match rpc.code {
            RpcCode::NotFound => format!(
                "Unable to launch the deployment(s). This is likely because the project '{}' or assembly '{}' doesn't exist.",
                project, assembly
            ),
            RpcCode::ResourceExhausted => format!(
                "Unable to launch the deployment(s). Cloud cluster resources exhausted, Detail: '{}'",
                rpc.detail
            ),
            RpcCode::Unauthenticated => UNAUTHENTICATED_HINT.to_string(),
            RpcCode::PermissionDenied
            | RpcCode::InvalidArgument
            | RpcCode::Unavailable
            | RpcCode::Unknown => format!(
                "Unable to launch the deployment(s). Detail: '{}'",
                rpc.detail
            ),
        },
        None => format!("{:#}", err),
    }
}

/// Operator message for a failed `stop`/`list` run.
pub fn command_failure_message(err: &anyhow::Error) -> String {
    match find_rpc_error(err) {
        Some(rpc) if rpc.code == RpcCode::Unauthenticated => UNAUTHENTICATED_HINT.to_string(),
        Some(rpc) => format!("Encountered an unknown error: {}", rpc),
        None => format!("{:#}", err),
    }
}

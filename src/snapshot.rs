use crate::error::LaunchError;
use crate::platform::{Platform, Snapshot};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Base64 of the MD5 digest, as sent in `Content-MD5`.
pub fn content_checksum(bytes: &[u8]) -> String {
    STANDARD.encode(md5::compute(bytes).0)
}

/// Uploads a snapshot file and returns the confirmed snapshot id.
///
/// The file is read fully into memory, registered with the snapshot
/// service, PUT to the returned URL and then confirmed. Any failure aborts
/// the whole upload; nothing is retried.
pub fn upload_snapshot(
    platform: &dyn Platform,
    snapshot_path: &Path,
    project_name: &str,
    deployment_name: &str,
    restricted_region: bool,
) -> Result<String, LaunchError> {
    info!(
        "Uploading {} to project {}",
        snapshot_path.display(),
        project_name
    );

    let bytes = match fs::read(snapshot_path) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        _ => return Err(LaunchError::SnapshotNotFound(snapshot_path.to_path_buf())),
    };

    let pending = Snapshot {
        project_name: project_name.to_string(),
        deployment_name: deployment_name.to_string(),
        checksum: content_checksum(&bytes),
        size: bytes.len() as u64,
        ..Default::default()
    };

    let target = platform.upload_snapshot(&pending)?;
    let snapshot = target.snapshot;
    debug!(snapshot_id = %snapshot.id, size = snapshot.size, "registered snapshot upload");

    let mut headers = vec![
        ("Content-MD5", snapshot.checksum.clone()),
        ("Content-Length", snapshot.size.to_string()),
    ];
    if restricted_region {
        headers.push(("x-amz-server-side-encryption", "AES256".to_string()));
    }
    platform.put_content(&target.upload_url, bytes, &headers)?;

    let confirmed = platform.confirm_upload(
        &snapshot.project_name,
        &snapshot.deployment_name,
        &snapshot.id,
    )?;
    Ok(confirmed.id)
}

use super::secrets::{Secrets, MONGODB_CERTIFICATE_CONTENT};
use super::DeployError;
use crate::settings::MONGODB_CERTIFICATE;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::info;

static FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,254}$").expect("valid regex"));

/// The certificate name is secret-provided and joined onto the tree root, so
/// it must be a bare file name.
pub fn validate_file_name(name: &str) -> Result<(), DeployError> {
    if !FILE_NAME.is_match(name) {
        return Err(DeployError::InvalidSecret {
            name: MONGODB_CERTIFICATE,
            reason: "must be a bare file name",
        });
    }
    Ok(())
}

/// Write the data-store client certificate into `root`. File name and content
/// both come from secrets. Returns the written path.
pub async fn stage_certificate(root: &Path, secrets: &Secrets) -> Result<PathBuf, DeployError> {
    let name = secrets.require(MONGODB_CERTIFICATE)?;
    validate_file_name(name)?;
    let content = secrets.require_multiline(MONGODB_CERTIFICATE_CONTENT)?;

    let path = root.join(name);
    let mut body = content.to_string();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    tokio::fs::write(&path, body)
        .await
        .map_err(|source| DeployError::Write {
            path: path.clone(),
            source,
        })?;
    restrict_permissions(&path).await?;

    info!(path = %path.display(), "staged certificate");
    Ok(path)
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<(), DeployError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|source| DeployError::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<(), DeployError> {
    Ok(())
}

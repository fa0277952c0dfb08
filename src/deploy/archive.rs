use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;

/// Lambda rejects inline `ZipFile` uploads above this size.
pub const MAX_DIRECT_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Version-control metadata, at the root or nested.
const VCS_EXCLUDES: [&str; 4] = [".git", ".git/*", "*/.git", "*/.git/*"];

/// Ensure the `zip` binary is available on PATH by invoking `zip -v`.
pub async fn ensure_zip_available() -> Result<()> {
    let status = Command::new("zip")
        .arg("-v")
        .stdout(std::process::Stdio::null())
        .kill_on_drop(true)
        .status()
        .await;
    match status {
        Ok(s) if s.success() => Ok(()),
        Ok(s) => Err(anyhow!("zip not available (exit status {})", s)),
        Err(e) => Err(anyhow!("zip not available: {}", e)),
    }
}

/// `zip -x` patterns for a run: VCS metadata, the archive itself, then the
/// configured extras.
pub fn exclude_patterns(archive_file: &str, extra: &[String]) -> Vec<String> {
    VCS_EXCLUDES
        .iter()
        .map(|p| p.to_string())
        .chain(std::iter::once(archive_file.to_string()))
        .chain(extra.iter().cloned())
        .collect()
}

/// Zip the whole tree under `root` into `root/archive_file`. An archive left
/// over from an earlier run is replaced, never updated in place.
pub async fn create_archive(root: &Path, archive_file: &str, extra: &[String]) -> Result<PathBuf> {
    ensure_zip_available().await?;

    let archive_path = root.join(archive_file);
    if tokio::fs::try_exists(&archive_path).await.unwrap_or(false) {
        tokio::fs::remove_file(&archive_path)
            .await
            .with_context(|| format!("failed to remove stale {}", archive_path.display()))?;
    }

    let excludes = exclude_patterns(archive_file, extra);
    let status = Command::new("zip")
        .arg("-r")
        .arg("-q")
        .arg("-X")
        .arg(archive_file)
        .arg(".")
        .arg("-x")
        .args(&excludes)
        .current_dir(root)
        .kill_on_drop(true)
        .status()
        .await
        .with_context(|| format!("failed to spawn zip in {}", root.display()))?;

    if !status.success() {
        return Err(anyhow!(
            "zip exited with status {} for {}",
            status,
            root.display()
        ));
    }

    info!(archive = %archive_path.display(), "created deployment archive");
    Ok(archive_path)
}

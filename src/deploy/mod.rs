//! Packaging and deployment of the bot to a serverless function.
//!
//! The pipeline runs five steps in a fixed order and stops at the first
//! failure; nothing is retried and nothing is rolled back:
//! 1. render the settings artifact from secrets,
//! 2. stage the data-store certificate,
//! 3. authenticate to the cloud provider,
//! 4. zip the working tree,
//! 5. update the function's code with the archive.

pub mod archive;
pub mod certificate;
pub mod lambda;
pub mod secrets;
pub mod sigv4;

use crate::config::Config;
use crate::settings::Settings;
use lambda::{CloudProvider, FunctionCodeUpdate};
use secrets::{
    Secrets, AWS_ACCESS_KEY_ID, AWS_REGION, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN,
    LAMBDA_FUNCTION_NAME,
};
use sigv4::Credentials;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("secret {0} is not set")]
    MissingSecret(&'static str),
    #[error("secret {name} is malformed: {reason}")]
    InvalidSecret {
        name: &'static str,
        reason: &'static str,
    },
    #[error("failed to write {}: {}", .path.display(), .source)]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("authentication failed: {0:#}")]
    Authentication(anyhow::Error),
    #[error("packaging failed: {0:#}")]
    Archive(anyhow::Error),
    #[error("archive is {size} bytes; direct uploads are limited to {limit} bytes")]
    ArchiveTooLarge { size: u64, limit: u64 },
    #[error("function update failed: {0:#}")]
    Deploy(anyhow::Error),
}

/// What a pipeline run produced.
#[derive(Debug, Clone, Default)]
pub struct DeployReport {
    pub settings_path: PathBuf,
    pub certificate_path: PathBuf,
    pub archive_path: PathBuf,
    pub archive_size: u64,
    pub caller_arn: Option<String>,
    pub update: Option<FunctionCodeUpdate>,
}

/// Build the settings artifact from secrets. Fails on the first missing or
/// malformed secret, before anything is written.
pub fn render_settings(secrets: &Secrets) -> Result<Settings, DeployError> {
    for key in crate::settings::SECRET_KEYS {
        secrets.require(key)?;
    }
    Settings::from_lookup(|key| secrets.optional(key).map(str::to_string))
        .map_err(DeployError::MissingSecret)
}

pub async fn write_settings(path: &Path, settings: &Settings) -> Result<(), DeployError> {
    tokio::fs::write(path, settings.render())
        .await
        .map_err(|source| DeployError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path.display(), "wrote settings artifact");
    Ok(())
}

/// Region-scoped access-key credentials from secrets.
pub fn credentials_from(secrets: &Secrets) -> Result<(Credentials, String), DeployError> {
    let credentials = Credentials {
        access_key_id: secrets.require(AWS_ACCESS_KEY_ID)?.to_string(),
        secret_access_key: secrets.require(AWS_SECRET_ACCESS_KEY)?.to_string(),
        session_token: secrets.optional(AWS_SESSION_TOKEN).map(str::to_string),
    };
    let region = secrets.require(AWS_REGION)?;
    if !lambda::is_valid_region(region) {
        return Err(DeployError::InvalidSecret {
            name: AWS_REGION,
            reason: "not a supported AWS region",
        });
    }
    Ok((credentials, region.to_string()))
}

pub fn function_name_from(secrets: &Secrets) -> Result<String, DeployError> {
    let name = secrets.require(LAMBDA_FUNCTION_NAME)?;
    if !lambda::is_valid_function_name(name) {
        return Err(DeployError::InvalidSecret {
            name: LAMBDA_FUNCTION_NAME,
            reason: "must be a plain function name",
        });
    }
    Ok(name.to_string())
}

pub struct Pipeline<'a> {
    config: &'a Config,
    root: PathBuf,
    secrets: &'a Secrets,
    dry_run: bool,
    max_archive_bytes: u64,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, root: impl Into<PathBuf>, secrets: &'a Secrets) -> Self {
        Self {
            config,
            root: root.into(),
            secrets,
            dry_run: false,
            max_archive_bytes: archive::MAX_DIRECT_UPLOAD_BYTES,
        }
    }

    /// Skip the cloud steps (authentication and function update).
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Largest archive the update step will upload. Defaults to the inline
    /// upload limit of the function API.
    pub fn max_archive_bytes(mut self, limit: u64) -> Self {
        self.max_archive_bytes = limit;
        self
    }

    /// Run every step in order. `connect` turns the credentials into a cloud
    /// client; it is only called when the run reaches authentication.
    pub async fn run<C, F>(&self, connect: F) -> Result<DeployReport, DeployError>
    where
        C: CloudProvider,
        F: FnOnce(Credentials, String) -> anyhow::Result<C>,
    {
        let span = info_span!("deploy", run_id = %Uuid::new_v4(), dry_run = self.dry_run);
        self.run_steps(connect).instrument(span).await
    }

    async fn run_steps<C, F>(&self, connect: F) -> Result<DeployReport, DeployError>
    where
        C: CloudProvider,
        F: FnOnce(Credentials, String) -> anyhow::Result<C>,
    {
        let mut report = DeployReport::default();

        let settings = render_settings(self.secrets)?;
        report.settings_path = self.config.settings_path(&self.root);
        write_settings(&report.settings_path, &settings).await?;

        report.certificate_path = certificate::stage_certificate(&self.root, self.secrets).await?;

        let cloud = if self.dry_run {
            info!("dry run: skipping authentication");
            None
        } else {
            let (credentials, region) = credentials_from(self.secrets)?;
            let function_name = function_name_from(self.secrets)?;
            let cloud = connect(credentials, region).map_err(DeployError::Authentication)?;
            let identity = cloud
                .verify_identity()
                .await
                .map_err(DeployError::Authentication)?;
            info!(arn = %identity.arn, "authenticated");
            report.caller_arn = Some(identity.arn);
            Some((cloud, function_name))
        };

        let deploy = &self.config.deploy;
        report.archive_path = archive::create_archive(&self.root, &deploy.archive_file, &deploy.exclude)
            .await
            .map_err(DeployError::Archive)?;
        report.archive_size = tokio::fs::metadata(&report.archive_path)
            .await
            .map_err(|e| DeployError::Archive(e.into()))?
            .len();
        if report.archive_size > self.max_archive_bytes {
            return Err(DeployError::ArchiveTooLarge {
                size: report.archive_size,
                limit: self.max_archive_bytes,
            });
        }
        info!(size = report.archive_size, "archive ready");

        let Some((cloud, function_name)) = cloud else {
            info!("dry run: skipping function update");
            return Ok(report);
        };

        let bytes = tokio::fs::read(&report.archive_path)
            .await
            .map_err(|e| DeployError::Archive(e.into()))?;
        let update = cloud
            .update_function_code(&function_name, &bytes)
            .await
            .map_err(DeployError::Deploy)?;
        info!(
            function = %function_name,
            version = update.version.as_deref().unwrap_or("-"),
            code_sha256 = update.code_sha256.as_deref().unwrap_or("-"),
            "function code updated"
        );
        report.update = Some(update);
        Ok(report)
    }
}

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use jwst_galley::config;
use jwst_galley::deploy::lambda::AwsClient;
use jwst_galley::deploy::secrets::Secrets;
use jwst_galley::deploy::Pipeline;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Render settings from secrets, package the tree and update the Lambda function"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Root of the tree to package
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Write settings, certificate and archive but skip the cloud calls
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    jwst_galley::init_tracing("info");

    let args = Args::parse();
    let cfg = config::load_or_default(&args.config)?;
    let secrets = Secrets::from_env();

    let report = Pipeline::new(&cfg, &args.root, &secrets)
        .dry_run(args.dry_run)
        .run(AwsClient::new)
        .await?;

    info!(
        settings = %report.settings_path.display(),
        certificate = %report.certificate_path.display(),
        archive = %report.archive_path.display(),
        archive_size = report.archive_size,
        caller = report.caller_arn.as_deref().unwrap_or("-"),
        "deploy pipeline finished"
    );
    if let Some(update) = &report.update {
        println!(
            "{} updated: version={} sha256={} status={}",
            update.function_name,
            update.version.as_deref().unwrap_or("-"),
            update.code_sha256.as_deref().unwrap_or("-"),
            update.last_update_status.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

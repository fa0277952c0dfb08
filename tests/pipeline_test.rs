use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};

use jwst_galley::config::{App, Config, Deploy};
use jwst_galley::deploy::archive::ensure_zip_available;
use jwst_galley::deploy::lambda::{CallerIdentity, CloudProvider, FunctionCodeUpdate};
use jwst_galley::deploy::secrets::{
    Secrets, AWS_ACCESS_KEY_ID, AWS_REGION, AWS_SECRET_ACCESS_KEY, LAMBDA_FUNCTION_NAME,
    MONGODB_CERTIFICATE_CONTENT,
};
use jwst_galley::deploy::sigv4::Credentials;
use jwst_galley::deploy::{DeployError, Pipeline};
use jwst_galley::settings::{Settings, MONGODB_CERTIFICATE, SECRET_KEYS};

#[derive(Default)]
struct Calls {
    connected: Vec<(String, String)>,
    identity_checks: usize,
    updates: Vec<(String, usize)>,
}

#[derive(Clone)]
struct RecordingCloud {
    calls: Arc<Mutex<Calls>>,
    reject_credentials: bool,
}

#[async_trait]
impl CloudProvider for RecordingCloud {
    async fn verify_identity(&self) -> Result<CallerIdentity> {
        self.calls.lock().unwrap().identity_checks += 1;
        if self.reject_credentials {
            return Err(anyhow!("sts rejected credentials (403 Forbidden)"));
        }
        Ok(CallerIdentity {
            arn: "arn:aws:iam::123456789012:user/deployer".into(),
            account: Some("123456789012".into()),
        })
    }

    async fn update_function_code(
        &self,
        function_name: &str,
        archive: &[u8],
    ) -> Result<FunctionCodeUpdate> {
        self.calls
            .lock()
            .unwrap()
            .updates
            .push((function_name.to_string(), archive.len()));
        Ok(FunctionCodeUpdate {
            function_name: function_name.to_string(),
            code_sha256: Some("abc=".into()),
            code_size: Some(archive.len() as i64),
            version: Some("3".into()),
            last_update_status: Some("InProgress".into()),
        })
    }
}

fn config() -> Config {
    Config {
        app: App {
            data_dir: "data".into(),
            database_file: "Database.db".into(),
        },
        deploy: Deploy {
            exclude: vec!["target/*".into()],
            ..Deploy::default()
        },
    }
}

fn all_secrets() -> Secrets {
    let mut pairs: Vec<(String, String)> = SECRET_KEYS
        .iter()
        .map(|k| (k.to_string(), format!("value-{}", k.to_lowercase())))
        .collect();
    pairs.retain(|(k, _)| k != MONGODB_CERTIFICATE);
    pairs.extend([
        (MONGODB_CERTIFICATE.to_string(), "X509-cert.pem".to_string()),
        (
            MONGODB_CERTIFICATE_CONTENT.to_string(),
            "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n".to_string(),
        ),
        (AWS_ACCESS_KEY_ID.to_string(), "AKIDEXAMPLE".to_string()),
        (AWS_SECRET_ACCESS_KEY.to_string(), "secret".to_string()),
        (AWS_REGION.to_string(), "us-east-1".to_string()),
        (LAMBDA_FUNCTION_NAME.to_string(), "jwst-galley".to_string()),
    ]);
    Secrets::from_pairs(pairs)
}

fn recorder(reject_credentials: bool) -> (Arc<Mutex<Calls>>, RecordingCloud) {
    let calls = Arc::new(Mutex::new(Calls::default()));
    let cloud = RecordingCloud {
        calls: calls.clone(),
        reject_credentials,
    };
    (calls, cloud)
}

fn connector(
    calls: Arc<Mutex<Calls>>,
    cloud: RecordingCloud,
) -> impl FnOnce(Credentials, String) -> Result<RecordingCloud> {
    move |creds, region| {
        calls
            .lock()
            .unwrap()
            .connected
            .push((creds.access_key_id.clone(), region));
        Ok(cloud)
    }
}

async fn require_zip() {
    if let Err(e) = ensure_zip_available().await {
        panic!("packaging tests need the zip binary on PATH: {e:#}");
    }
}

/// Entry names stored in an archive, via `zip -sf`.
fn archive_entries(archive: &Path) -> Vec<String> {
    let out = std::process::Command::new("zip")
        .arg("-sf")
        .arg(archive)
        .output()
        .unwrap();
    assert!(out.status.success(), "zip -sf failed: {:?}", out);
    String::from_utf8_lossy(&out.stdout)
        .lines()
        .filter(|l| l.starts_with("  "))
        .map(|l| l.trim().to_string())
        .collect()
}

#[tokio::test]
async fn missing_secret_halts_before_any_write() {
    let td = tempfile::tempdir().unwrap();
    let cfg = config();
    let secrets = Secrets::from_pairs([(MONGODB_CERTIFICATE, "X509-cert.pem")]);
    let (calls, cloud) = recorder(false);

    let err = Pipeline::new(&cfg, td.path(), &secrets)
        .run(connector(calls.clone(), cloud))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::MissingSecret(_)));

    assert_eq!(std::fs::read_dir(td.path()).unwrap().count(), 0);
    assert!(calls.lock().unwrap().connected.is_empty());
}

#[tokio::test]
async fn rejected_credentials_halt_before_packaging() {
    let td = tempfile::tempdir().unwrap();
    let cfg = config();
    let secrets = all_secrets();
    let (calls, cloud) = recorder(true);

    let err = Pipeline::new(&cfg, td.path(), &secrets)
        .run(connector(calls.clone(), cloud))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Authentication(_)));

    // Settings and certificate were written; nothing after authentication ran.
    assert!(td.path().join("settings.conf").exists());
    assert!(td.path().join("X509-cert.pem").exists());
    assert!(!td.path().join("deployment.zip").exists());
    let calls = calls.lock().unwrap();
    assert_eq!(calls.identity_checks, 1);
    assert!(calls.updates.is_empty());
}

#[tokio::test]
async fn missing_cloud_secrets_halt_before_packaging() {
    let td = tempfile::tempdir().unwrap();
    let cfg = config();
    let secrets = Secrets::from_pairs(
        SECRET_KEYS
            .iter()
            .map(|k| (k.to_string(), "v".to_string()))
            .chain([(
                MONGODB_CERTIFICATE_CONTENT.to_string(),
                "pem".to_string(),
            )]),
    );
    let (calls, cloud) = recorder(false);

    let err = Pipeline::new(&cfg, td.path(), &secrets)
        .run(connector(calls.clone(), cloud))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::MissingSecret(AWS_ACCESS_KEY_ID)));
    assert!(!td.path().join("deployment.zip").exists());
    assert!(calls.lock().unwrap().connected.is_empty());
}

#[tokio::test]
async fn full_run_updates_function_with_archive() {
    require_zip().await;
    let td = tempfile::tempdir().unwrap();
    std::fs::write(td.path().join("bot.py"), "print('hello')\n").unwrap();
    std::fs::create_dir_all(td.path().join(".git/objects")).unwrap();
    std::fs::write(td.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
    std::fs::create_dir_all(td.path().join("vendor/lib/.git")).unwrap();
    std::fs::write(td.path().join("vendor/lib/.git/config"), "[core]\n").unwrap();
    std::fs::write(td.path().join("vendor/lib/mod.py"), "x = 1\n").unwrap();
    std::fs::create_dir_all(td.path().join("target/release")).unwrap();
    std::fs::write(td.path().join("target/release/galley"), "bin").unwrap();

    let cfg = config();
    let secrets = all_secrets();
    let (calls, cloud) = recorder(false);

    let report = Pipeline::new(&cfg, td.path(), &secrets)
        .run(connector(calls.clone(), cloud))
        .await
        .unwrap();

    let rendered = std::fs::read_to_string(&report.settings_path).unwrap();
    let settings = Settings::parse(&rendered).unwrap();
    assert_eq!(settings.app_name, "JWST Galley");
    assert_eq!(settings.log_level, "DEBUG");
    assert_eq!(settings.mongodb_certificate, "X509-cert.pem");

    assert_eq!(report.certificate_path, td.path().join("X509-cert.pem"));
    assert_eq!(report.archive_path, td.path().join("deployment.zip"));
    assert!(report.archive_size > 0);
    assert_eq!(
        report.caller_arn.as_deref(),
        Some("arn:aws:iam::123456789012:user/deployer")
    );
    assert_eq!(report.update.as_ref().unwrap().version.as_deref(), Some("3"));

    let names = archive_entries(&report.archive_path);
    assert!(names.iter().any(|n| n == "bot.py"));
    assert!(names.iter().any(|n| n == "settings.conf"));
    assert!(names.iter().any(|n| n == "X509-cert.pem"));
    assert!(!names.iter().any(|n| n.starts_with(".git") || n.contains("/.git")));
    assert!(!names.iter().any(|n| n.starts_with("target/")));
    assert!(!names.iter().any(|n| n == "deployment.zip"));

    let calls = calls.lock().unwrap();
    assert_eq!(
        calls.connected,
        vec![("AKIDEXAMPLE".to_string(), "us-east-1".to_string())]
    );
    assert_eq!(
        calls.updates,
        vec![("jwst-galley".to_string(), report.archive_size as usize)]
    );
}

#[tokio::test]
async fn dry_run_packages_without_cloud_calls() {
    require_zip().await;
    let td = tempfile::tempdir().unwrap();
    std::fs::write(td.path().join("bot.py"), "print('hello')\n").unwrap();
    std::fs::write(td.path().join("deployment.zip"), "stale").unwrap();

    let cfg = config();
    let secrets = Secrets::from_pairs(
        SECRET_KEYS
            .iter()
            .map(|k| (k.to_string(), "v".to_string()))
            .chain([(
                MONGODB_CERTIFICATE_CONTENT.to_string(),
                "pem".to_string(),
            )]),
    );
    let (calls, cloud) = recorder(false);

    let report = Pipeline::new(&cfg, td.path(), &secrets)
        .dry_run(true)
        .run(connector(calls.clone(), cloud))
        .await
        .unwrap();

    assert!(report.update.is_none());
    assert!(report.caller_arn.is_none());
    assert_ne!(std::fs::read(&report.archive_path).unwrap(), b"stale");
    let calls = calls.lock().unwrap();
    assert!(calls.connected.is_empty());
    assert!(calls.updates.is_empty());
}

#[tokio::test]
async fn oversized_archive_is_rejected_before_update() {
    require_zip().await;
    let td = tempfile::tempdir().unwrap();
    std::fs::write(td.path().join("bot.py"), "print('hello')\n".repeat(64)).unwrap();

    let cfg = config();
    let secrets = all_secrets();
    let (calls, cloud) = recorder(false);

    let err = Pipeline::new(&cfg, td.path(), &secrets)
        .max_archive_bytes(16)
        .run(connector(calls.clone(), cloud))
        .await
        .unwrap_err();
    match err {
        DeployError::ArchiveTooLarge { size, limit } => {
            assert_eq!(limit, 16);
            assert!(size > 16);
        }
        other => panic!("expected ArchiveTooLarge, got {other:?}"),
    }

    let calls = calls.lock().unwrap();
    assert_eq!(calls.identity_checks, 1);
    assert!(calls.updates.is_empty());
}

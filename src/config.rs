//! Configuration loader and validator for the catalog store and deploy tool.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Top-level `config.yaml` document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub deploy: Deploy,
}

/// Where the catalog database lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

/// Packaging settings for the deploy pipeline. Paths are relative to the
/// packaged tree's root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deploy {
    #[serde(default = "default_settings_file")]
    pub settings_file: String,
    #[serde(default = "default_archive_file")]
    pub archive_file: String,
    /// Extra `zip -x` patterns; version-control metadata is always excluded.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for Deploy {
    fn default() -> Self {
        Self {
            settings_file: default_settings_file(),
            archive_file: default_archive_file(),
            exclude: Vec::new(),
        }
    }
}

fn default_database_file() -> String {
    "Database.db".into()
}

fn default_settings_file() -> String {
    "settings.conf".into()
}

fn default_archive_file() -> String {
    "deployment.zip".into()
}

impl Config {
    /// Create `app.data_dir` so SQLite can create the database file in it.
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// SQLite URL for the catalog, unless `DATABASE_URL` overrides it.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            let path = Path::new(&self.app.data_dir).join(&self.app.database_file);
            format!("sqlite://{}", path.display())
        })
    }

    pub fn settings_path(&self, root: &Path) -> PathBuf {
        root.join(&self.deploy.settings_file)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Like [`load`], but falls back to [`example`] when the file does not exist.
pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
    if path.exists() {
        return load(Some(path));
    }
    let cfg: Config = serde_yaml::from_str(example())?;
    validate(&cfg)?;
    Ok(cfg)
}

fn is_bare_relative(p: &str) -> bool {
    let path = Path::new(p);
    !p.trim().is_empty()
        && path.is_relative()
        && !path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
}

/// Reject configs the store or the packager could not act on.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.database_file.trim().is_empty() {
        return Err(ConfigError::Invalid("app.database_file must be non-empty"));
    }

    if !is_bare_relative(&cfg.deploy.settings_file) {
        return Err(ConfigError::Invalid(
            "deploy.settings_file must be a relative path inside the tree",
        ));
    }
    if !is_bare_relative(&cfg.deploy.archive_file) {
        return Err(ConfigError::Invalid(
            "deploy.archive_file must be a relative path inside the tree",
        ));
    }
    if !cfg.deploy.archive_file.ends_with(".zip") {
        return Err(ConfigError::Invalid("deploy.archive_file must end with .zip"));
    }
    if cfg.deploy.exclude.iter().any(|p| p.trim().is_empty()) {
        return Err(ConfigError::Invalid("deploy.exclude entries must be non-empty"));
    }

    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  database_file: "Database.db"

deploy:
  settings_file: "settings.conf"
  archive_file: "deployment.zip"
  exclude:
    - "target/*"
"#
}

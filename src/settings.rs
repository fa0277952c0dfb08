//! The generated settings artifact: one `KEY = value` line per key, in a fixed
//! order. The deploy pipeline renders it from secrets; the bot reads it back.
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const APP_NAME: &str = "JWST Galley";
pub const LOG_LEVEL: &str = "DEBUG";

pub const MONGODB_CERTIFICATE: &str = "MONGODB_CERTIFICATE";
pub const MONGODB_COLLECTION: &str = "MONGODB_COLLECTION";
pub const MONGODB_DATABASE: &str = "MONGODB_DATABASE";
pub const MONGODB_URI: &str = "MONGODB_URI";
pub const TELEGRAM_ADMIN_ID: &str = "TELEGRAM_ADMIN_ID";
pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const TELEGRAM_CHANNEL_ID: &str = "TELEGRAM_CHANNEL_ID";
pub const TELEGRAM_CHANNEL_NAME: &str = "TELEGRAM_CHANNEL_NAME";
pub const APP_NAME_KEY: &str = "APP_NAME";
pub const LOG_LEVEL_KEY: &str = "LOG_LEVEL";

/// Keys in the order they are written.
pub const KEYS: [&str; 10] = [
    MONGODB_CERTIFICATE,
    MONGODB_COLLECTION,
    MONGODB_DATABASE,
    MONGODB_URI,
    TELEGRAM_ADMIN_ID,
    TELEGRAM_BOT_TOKEN,
    TELEGRAM_CHANNEL_ID,
    TELEGRAM_CHANNEL_NAME,
    APP_NAME_KEY,
    LOG_LEVEL_KEY,
];

/// Keys whose values come from secrets (everything except the fixed ones).
pub const SECRET_KEYS: [&str; 8] = [
    MONGODB_CERTIFICATE,
    MONGODB_COLLECTION,
    MONGODB_DATABASE,
    MONGODB_URI,
    TELEGRAM_ADMIN_ID,
    TELEGRAM_BOT_TOKEN,
    TELEGRAM_CHANNEL_ID,
    TELEGRAM_CHANNEL_NAME,
];

const SEPARATOR: &str = " = ";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: expected `KEY = value`")]
    Malformed { line: usize },
    #[error("line {line}: unknown key '{key}'")]
    UnknownKey { line: usize, key: String },
    #[error("line {line}: duplicate key '{key}'")]
    DuplicateKey { line: usize, key: String },
    #[error("missing key '{0}'")]
    MissingKey(&'static str),
    #[error("empty value for '{0}'")]
    EmptyValue(&'static str),
}

#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub mongodb_certificate: String,
    pub mongodb_collection: String,
    pub mongodb_database: String,
    pub mongodb_uri: String,
    pub telegram_admin_id: String,
    pub telegram_bot_token: String,
    pub telegram_channel_id: String,
    pub telegram_channel_name: String,
    pub app_name: String,
    pub log_level: String,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("mongodb_certificate", &self.mongodb_certificate)
            .field("mongodb_collection", &self.mongodb_collection)
            .field("mongodb_database", &self.mongodb_database)
            .field("mongodb_uri", &"[REDACTED]")
            .field("telegram_admin_id", &self.telegram_admin_id)
            .field("telegram_bot_token", &"[REDACTED]")
            .field("telegram_channel_id", &self.telegram_channel_id)
            .field("telegram_channel_name", &self.telegram_channel_name)
            .field("app_name", &self.app_name)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Settings {
    /// Build settings from a lookup of the secret-backed keys. The fixed keys
    /// always get their constant values. Returns the first key the lookup
    /// could not provide.
    pub fn from_lookup<F>(mut lookup: F) -> Result<Self, &'static str>
    where
        F: FnMut(&'static str) -> Option<String>,
    {
        let mut get = |key: &'static str| lookup(key).ok_or(key);
        Ok(Self {
            mongodb_certificate: get(MONGODB_CERTIFICATE)?,
            mongodb_collection: get(MONGODB_COLLECTION)?,
            mongodb_database: get(MONGODB_DATABASE)?,
            mongodb_uri: get(MONGODB_URI)?,
            telegram_admin_id: get(TELEGRAM_ADMIN_ID)?,
            telegram_bot_token: get(TELEGRAM_BOT_TOKEN)?,
            telegram_channel_id: get(TELEGRAM_CHANNEL_ID)?,
            telegram_channel_name: get(TELEGRAM_CHANNEL_NAME)?,
            app_name: APP_NAME.to_string(),
            log_level: LOG_LEVEL.to_string(),
        })
    }

    /// Key/value pairs in render order.
    pub fn entries(&self) -> [(&'static str, &str); 10] {
        [
            (MONGODB_CERTIFICATE, &self.mongodb_certificate),
            (MONGODB_COLLECTION, &self.mongodb_collection),
            (MONGODB_DATABASE, &self.mongodb_database),
            (MONGODB_URI, &self.mongodb_uri),
            (TELEGRAM_ADMIN_ID, &self.telegram_admin_id),
            (TELEGRAM_BOT_TOKEN, &self.telegram_bot_token),
            (TELEGRAM_CHANNEL_ID, &self.telegram_channel_id),
            (TELEGRAM_CHANNEL_NAME, &self.telegram_channel_name),
            (APP_NAME_KEY, &self.app_name),
            (LOG_LEVEL_KEY, &self.log_level),
        ]
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.entries() {
            out.push_str(key);
            out.push_str(SEPARATOR);
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Parse a settings artifact. Blank lines and `#` comments are ignored;
    /// every key is required exactly once and must carry a non-empty value.
    pub fn parse(content: &str) -> Result<Self, SettingsError> {
        let mut values: [Option<String>; 10] = Default::default();

        for (idx, raw) in content.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw.trim_end_matches('\r');
            if trimmed.trim().is_empty() || trimmed.trim_start().starts_with('#') {
                continue;
            }
            let (key, value) = trimmed
                .split_once(SEPARATOR)
                .ok_or(SettingsError::Malformed { line })?;
            let key = key.trim();
            let slot = KEYS
                .iter()
                .position(|k| *k == key)
                .ok_or_else(|| SettingsError::UnknownKey {
                    line,
                    key: key.to_string(),
                })?;
            if values[slot].is_some() {
                return Err(SettingsError::DuplicateKey {
                    line,
                    key: key.to_string(),
                });
            }
            values[slot] = Some(value.to_string());
        }

        for (slot, key) in KEYS.iter().enumerate() {
            match &values[slot] {
                None => return Err(SettingsError::MissingKey(key)),
                Some(v) if v.trim().is_empty() => return Err(SettingsError::EmptyValue(key)),
                Some(_) => {}
            }
        }

        let [c, col, db, uri, admin, token, chan_id, chan_name, app, level] =
            values.map(Option::unwrap_or_default);
        Ok(Self {
            mongodb_certificate: c,
            mongodb_collection: col,
            mongodb_database: db,
            mongodb_uri: uri,
            telegram_admin_id: admin,
            telegram_bot_token: token,
            telegram_channel_id: chan_id,
            telegram_channel_name: chan_name,
            app_name: app,
            log_level: level,
        })
    }

    /// `tracing` filter directive equivalent to `LOG_LEVEL`.
    pub fn log_directive(&self) -> &'static str {
        match self.log_level.trim().to_ascii_uppercase().as_str() {
            "TRACE" => "trace",
            "DEBUG" => "debug",
            "WARN" | "WARNING" => "warn",
            "ERROR" | "CRITICAL" | "FATAL" => "error",
            _ => "info",
        }
    }
}

/// Read and parse a settings artifact from disk.
pub fn load(path: &Path) -> Result<Settings, SettingsError> {
    let content = fs::read_to_string(path)?;
    Settings::parse(&content)
}

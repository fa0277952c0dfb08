use super::DeployError;
use crate::settings::SECRET_KEYS;
use std::collections::BTreeMap;
use std::fmt;

pub const MONGODB_CERTIFICATE_CONTENT: &str = "MONGODB_CERTIFICATE_CONTENT";
pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const AWS_REGION: &str = "AWS_REGION";
pub const LAMBDA_FUNCTION_NAME: &str = "LAMBDA_FUNCTION_NAME";

const PIPELINE_SECRETS: [&str; 6] = [
    MONGODB_CERTIFICATE_CONTENT,
    AWS_ACCESS_KEY_ID,
    AWS_SECRET_ACCESS_KEY,
    AWS_SESSION_TOKEN,
    AWS_REGION,
    LAMBDA_FUNCTION_NAME,
];

/// Secret values handed to the pipeline. CI runners expose unset secrets as
/// empty strings, so an empty value counts as missing.
#[derive(Clone, Default)]
pub struct Secrets {
    values: BTreeMap<String, String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Secrets {
    /// Collect every secret the pipeline knows about from the process environment.
    pub fn from_env() -> Self {
        Self::from_pairs(
            SECRET_KEYS
                .iter()
                .chain(PIPELINE_SECRETS.iter())
                .filter_map(|name| std::env::var(name).ok().map(|v| (*name, v))),
        )
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Non-empty value, if present.
    pub fn optional(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// A single-line secret. Values with line breaks would corrupt the
    /// line-oriented artifacts they are written into.
    pub fn require(&self, name: &'static str) -> Result<&str, DeployError> {
        let value = self.require_multiline(name)?;
        if value.contains(|c: char| c == '\n' || c == '\r') {
            return Err(DeployError::InvalidSecret {
                name,
                reason: "contains a line break",
            });
        }
        Ok(value)
    }

    /// A secret that may span lines, such as PEM content.
    pub fn require_multiline(&self, name: &'static str) -> Result<&str, DeployError> {
        self.optional(name).ok_or(DeployError::MissingSecret(name))
    }
}

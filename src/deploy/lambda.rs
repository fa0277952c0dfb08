use super::sigv4::{self, Credentials};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

const STS_API_VERSION: &str = "2011-06-15";
const LAMBDA_API_VERSION: &str = "2015-03-31";

static REGION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").expect("valid regex"));
static FUNCTION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid regex"));
static ARN_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<Arn>([^<]+)</Arn>").expect("valid regex"));
static ACCOUNT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<Account>([^<]+)</Account>").expect("valid regex"));

/// Regions in the standard partition. China regions live under
/// `amazonaws.com.cn` with separate credentials and are not supported.
pub fn is_valid_region(region: &str) -> bool {
    REGION.is_match(region) && !region.starts_with("cn-")
}

/// Plain function names only; ARNs and qualifiers are not accepted.
pub fn is_valid_function_name(name: &str) -> bool {
    FUNCTION_NAME.is_match(name)
}

/// Who the credentials belong to, as reported by STS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub arn: String,
    pub account: Option<String>,
}

/// Subset of the `UpdateFunctionCode` response the pipeline reports.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionCodeUpdate {
    #[serde(default)]
    pub function_name: String,
    pub code_sha256: Option<String>,
    pub code_size: Option<i64>,
    pub version: Option<String>,
    pub last_update_status: Option<String>,
}

/// The two cloud calls the pipeline needs. Implemented by [`AwsClient`] and
/// by test doubles.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn verify_identity(&self) -> Result<CallerIdentity>;

    async fn update_function_code(
        &self,
        function_name: &str,
        archive: &[u8],
    ) -> Result<FunctionCodeUpdate>;
}

#[derive(Clone)]
pub struct AwsClient {
    http: Client,
    credentials: Credentials,
    region: String,
    lambda_base: Url,
    sts_base: Url,
}

impl fmt::Debug for AwsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsClient")
            .field("region", &self.region)
            .field("lambda_base", &self.lambda_base)
            .field("sts_base", &self.sts_base)
            .finish_non_exhaustive()
    }
}

impl AwsClient {
    pub fn new(credentials: Credentials, region: String) -> Result<Self> {
        if !is_valid_region(&region) {
            return Err(anyhow!("invalid AWS region '{}'", region));
        }
        let lambda_base = Url::parse(&format!("https://lambda.{}.amazonaws.com/", region))
            .context("invalid Lambda endpoint")?;
        let sts_base = Url::parse(&format!("https://sts.{}.amazonaws.com/", region))
            .context("invalid STS endpoint")?;
        Self::with_endpoints(credentials, region, lambda_base, sts_base)
    }

    pub fn with_endpoints(
        credentials: Credentials,
        region: String,
        lambda_base: Url,
        sts_base: Url,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("jwst-galley/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            credentials,
            region,
            lambda_base,
            sts_base,
        })
    }

    pub fn build_identity_request(&self, now: DateTime<Utc>) -> Result<reqwest::Request> {
        let mut url = self.sts_base.clone();
        url.query_pairs_mut()
            .append_pair("Action", "GetCallerIdentity")
            .append_pair("Version", STS_API_VERSION);
        let mut request = self
            .http
            .request(Method::GET, url)
            .build()
            .context("failed to build STS request")?;
        sigv4::sign_request(&mut request, &self.credentials, &self.region, "sts", now)?;
        Ok(request)
    }

    pub fn build_update_request(
        &self,
        function_name: &str,
        archive: &[u8],
        now: DateTime<Utc>,
    ) -> Result<reqwest::Request> {
        if !is_valid_function_name(function_name) {
            return Err(anyhow!("invalid function name '{}'", function_name));
        }
        let endpoint = self
            .lambda_base
            .join(&format!(
                "{}/functions/{}/code",
                LAMBDA_API_VERSION, function_name
            ))
            .context("invalid Lambda base URL")?;
        let body = json!({
            "ZipFile": base64::engine::general_purpose::STANDARD.encode(archive),
            "Publish": true,
        });
        let mut request = self
            .http
            .put(endpoint)
            .json(&body)
            .build()
            .context("failed to build Lambda request")?;
        sigv4::sign_request(&mut request, &self.credentials, &self.region, "lambda", now)?;
        Ok(request)
    }

    async fn execute(&self, request: reqwest::Request, service: &str) -> Result<String> {
        info!(method = %request.method(), url = %request.url(), service, "AWS request");
        let res = self
            .http
            .execute(request)
            .await
            .with_context(|| format!("failed to reach {}", service))?;

        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
            warn!(%status, service, "AWS rejected credentials");
            return Err(anyhow!("{} rejected credentials ({}): {}", service, status, body));
        }
        if !status.is_success() {
            warn!(%status, service, "AWS request failed");
            return Err(anyhow!("{} error {}: {}", service, status, body));
        }
        info!(%status, service, "AWS response");
        Ok(body)
    }
}

pub fn parse_caller_identity(xml: &str) -> Result<CallerIdentity> {
    let arn = ARN_TAG
        .captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(|| anyhow!("GetCallerIdentity response has no Arn"))?;
    let account = ACCOUNT_TAG
        .captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());
    Ok(CallerIdentity { arn, account })
}

#[async_trait]
impl CloudProvider for AwsClient {
    async fn verify_identity(&self) -> Result<CallerIdentity> {
        let request = self.build_identity_request(Utc::now())?;
        let body = self.execute(request, "sts").await?;
        parse_caller_identity(&body)
    }

    async fn update_function_code(
        &self,
        function_name: &str,
        archive: &[u8],
    ) -> Result<FunctionCodeUpdate> {
        let request = self.build_update_request(function_name, archive, Utc::now())?;
        let body = self.execute(request, "lambda").await?;
        serde_json::from_str(&body).context("invalid UpdateFunctionCode response JSON")
    }
}

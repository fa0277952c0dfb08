//! AWS Signature Version 4 request signing for the few API calls the deploy
//! pipeline makes.
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderValue, AUTHORIZATION, HOST};
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Access-key credentials, optionally with a session token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// The parts of a request that go into its signature. Header names must be
/// lowercase.
pub struct SigningInput<'a> {
    pub method: &'a str,
    pub url: &'a Url,
    pub headers: &'a BTreeMap<String, String>,
    pub payload_hash: &'a str,
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| anyhow!("invalid HMAC key: {}", e))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derive the per-day, per-region, per-service signing key.
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

/// RFC 3986 encoding: everything but unreserved characters is percent-encoded.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

fn canonical_uri(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() {
        return "/".to_string();
    }
    // Each segment of the already-encoded path is encoded again.
    path.split('/')
        .map(|segment| uri_encode(segment, true))
        .collect::<Vec<_>>()
        .join("/")
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k, true), uri_encode(&v, true)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical request text and the `SignedHeaders` list.
pub fn canonical_request(input: &SigningInput<'_>) -> (String, String) {
    let mut canonical_headers = String::new();
    for (name, value) in input.headers {
        canonical_headers.push_str(name);
        canonical_headers.push(':');
        canonical_headers.push_str(&normalize_header_value(value));
        canonical_headers.push('\n');
    }
    let signed_headers = input
        .headers
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(";");

    let request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        input.method,
        canonical_uri(input.url),
        canonical_query(input.url),
        canonical_headers,
        signed_headers,
        input.payload_hash
    );
    (request, signed_headers)
}

/// Full `Authorization` header value for the given request parts.
pub fn authorization(
    credentials: &Credentials,
    now: DateTime<Utc>,
    region: &str,
    service: &str,
    input: &SigningInput<'_>,
) -> Result<String> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let scope = format!("{}/{}/{}/aws4_request", date, region, service);

    let (request, signed_headers) = canonical_request(input);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        sha256_hex(request.as_bytes())
    );
    let key = signing_key(&credentials.secret_access_key, &date, region, service)?;
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.access_key_id, scope, signed_headers, signature
    ))
}

/// Add `host`, `x-amz-*` and `authorization` headers to a built request.
/// Every header already present on the request is signed.
pub fn sign_request(
    request: &mut reqwest::Request,
    credentials: &Credentials,
    region: &str,
    service: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let payload_hash = sha256_hex(request.body().and_then(|b| b.as_bytes()).unwrap_or(&[]));
    let host = {
        let url = request.url();
        let host = url.host_str().context("request URL has no host")?;
        match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    };

    let headers = request.headers_mut();
    headers.insert(HOST, HeaderValue::from_str(&host)?);
    headers.insert(
        "x-amz-date",
        HeaderValue::from_str(&now.format("%Y%m%dT%H%M%SZ").to_string())?,
    );
    headers.insert("x-amz-content-sha256", HeaderValue::from_str(&payload_hash)?);
    if let Some(token) = &credentials.session_token {
        headers.insert("x-amz-security-token", HeaderValue::from_str(token)?);
    }

    let mut signed: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in request.headers() {
        let value = value
            .to_str()
            .with_context(|| format!("header {} is not visible ASCII", name))?;
        signed
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    let input = SigningInput {
        method: request.method().as_str(),
        url: request.url(),
        headers: &signed,
        payload_hash: &payload_hash,
    };
    let auth = authorization(credentials, now, region, service, &input)?;
    request
        .headers_mut()
        .insert(AUTHORIZATION, HeaderValue::from_str(&auth)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const EXAMPLE_SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    #[test]
    fn signing_key_matches_published_derivation() {
        let key = signing_key(EXAMPLE_SECRET, "20120215", "us-east-1", "iam").unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn get_vanilla_signature() {
        let creds = Credentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: EXAMPLE_SECRET.into(),
            session_token: None,
        };
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let url = Url::parse("https://example.amazonaws.com/").unwrap();
        let headers = BTreeMap::from([
            ("host".to_string(), "example.amazonaws.com".to_string()),
            ("x-amz-date".to_string(), "20150830T123600Z".to_string()),
        ]);
        let input = SigningInput {
            method: "GET",
            url: &url,
            headers: &headers,
            payload_hash: &sha256_hex(b""),
        };

        let (canonical, signed) = canonical_request(&input);
        assert_eq!(signed, "host;x-amz-date");
        assert_eq!(
            canonical,
            "GET\n/\n\nhost:example.amazonaws.com\nx-amz-date:20150830T123600Z\n\nhost;x-amz-date\n\
             e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );

        let auth = authorization(&creds, now, "us-east-1", "service", &input).unwrap();
        assert_eq!(
            auth,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
    }

    #[test]
    fn query_is_sorted_and_encoded() {
        let url = Url::parse("https://sts.amazonaws.com/?Version=2011-06-15&Action=GetCallerIdentity&x=a b").unwrap();
        assert_eq!(
            canonical_query(&url),
            "Action=GetCallerIdentity&Version=2011-06-15&x=a%20b"
        );
        assert_eq!(uri_encode("a/b:c", false), "a/b%3Ac");
        assert_eq!(uri_encode("a/b", true), "a%2Fb");
    }

    #[test]
    fn sign_request_adds_headers() {
        let creds = Credentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: EXAMPLE_SECRET.into(),
            session_token: Some("session".into()),
        };
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut req = reqwest::Client::new()
            .put("https://lambda.eu-west-1.amazonaws.com/2015-03-31/functions/bot/code")
            .body("{}")
            .build()
            .unwrap();
        sign_request(&mut req, &creds, "eu-west-1", "lambda", now).unwrap();

        let h = req.headers();
        assert_eq!(h.get("host").unwrap(), "lambda.eu-west-1.amazonaws.com");
        assert_eq!(h.get("x-amz-date").unwrap(), "20240102T030405Z");
        assert_eq!(h.get("x-amz-content-sha256").unwrap(), sha256_hex(b"{}").as_str());
        assert_eq!(h.get("x-amz-security-token").unwrap(), "session");
        let auth = h.get("authorization").unwrap().to_str().unwrap();
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240102/eu-west-1/lambda/aws4_request, \
             SignedHeaders=host;x-amz-content-sha256;x-amz-date;x-amz-security-token, Signature="
        ));
    }

    #[test]
    fn debug_redacts_secret() {
        let creds = Credentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: EXAMPLE_SECRET.into(),
            session_token: None,
        };
        assert!(!format!("{:?}", creds).contains(EXAMPLE_SECRET));
    }
}

//! Amazon Bedrock Knowledge Base client.
//!
//! Calls the Bedrock Agent Runtime `Retrieve` REST API directly with AWS
//! Signature V4 authentication. Implements [`KnowledgeBaseClient`] so the
//! [`Retriever`](crate::retrieval::Retriever) never sees provider types.
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`) for AWS signing.
//!
//! # Request
//!
//! ```text
//! POST /knowledgebases/{knowledgeBaseId}/retrieve
//! {
//!   "retrievalQuery": { "text": "claim ID 1234" },
//!   "retrievalConfiguration": {
//!     "vectorSearchConfiguration": {
//!       "numberOfResults": 10,
//!       "overrideSearchType": "HYBRID"
//!     }
//!   }
//! }
//! ```
//!
//! # Response decoding
//!
//! `retrievalResults[]` is decoded fail-closed: a missing `content.text`
//! becomes an empty string, a missing `score` or location stays absent.
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional (temporary credentials / IAM roles)

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::KnowledgeBaseConfig;
use crate::error::SearchClientError;
use crate::models::{RetrievalHit, SearchStrategy};
use crate::retrieval::{KnowledgeBaseClient, RetrieveRequest};

type HmacSha256 = Hmac<Sha256>;

/// SigV4 signing name of the Bedrock Agent Runtime service.
const SERVICE: &str = "bedrock";

// ============ AWS Credentials ============

/// Static AWS credentials.
#[derive(Clone)]
pub struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AwsCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Load credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// and optionally `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

// ============ Client ============

/// Bedrock Agent Runtime client bound to one region/endpoint.
///
/// Built once at startup and shared read-only; the underlying
/// `reqwest::Client` pools connections and enforces `timeout_secs`.
pub struct BedrockKnowledgeBaseClient {
    http: reqwest::Client,
    /// `scheme://host[:port]`; the port is omitted when it is the scheme default.
    origin: String,
    /// Value signed as the `host` header.
    host: String,
    /// Path prefix of the endpoint without a trailing slash, usually empty.
    base_path: String,
    region: String,
    credentials: AwsCredentials,
}

impl BedrockKnowledgeBaseClient {
    /// Create a client from the `[knowledge_base]` config section.
    ///
    /// If `endpoint_url` is set (LocalStack, proxies, test stubs) it replaces
    /// the standard `bedrock-agent-runtime.<region>.amazonaws.com` endpoint.
    /// A path prefix on the endpoint is kept and signed.
    pub fn new(config: &KnowledgeBaseConfig, credentials: AwsCredentials) -> Result<Self> {
        let region = config.resolved_region();
        let endpoint = match config.endpoint_url {
            Some(ref url) => url.clone(),
            None => format!("https://bedrock-agent-runtime.{}.amazonaws.com", region),
        };
        let parsed = reqwest::Url::parse(&endpoint)
            .with_context(|| format!("Invalid knowledge base endpoint: {}", endpoint))?;
        let host_name = parsed
            .host_str()
            .with_context(|| format!("Knowledge base endpoint has no host: {}", endpoint))?;
        let host = match parsed.port() {
            Some(port) => format!("{}:{}", host_name, port),
            None => host_name.to_string(),
        };
        let origin = format!("{}://{}", parsed.scheme(), host);
        let base_path = parsed.path().trim_end_matches('/').to_string();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        info!(endpoint = %origin, %base_path, %region, "Initialized Bedrock knowledge base client");

        Ok(Self {
            http,
            origin,
            host,
            base_path,
            region,
            credentials,
        })
    }

    /// Full URL and signed path of the `Retrieve` call for `knowledge_base_id`.
    fn retrieve_target(&self, knowledge_base_id: &str) -> (String, String) {
        let path = format!(
            "{}/knowledgebases/{}/retrieve",
            self.base_path,
            uri_encode(knowledge_base_id)
        );
        (format!("{}{}", self.origin, path), path)
    }
}

#[async_trait]
impl KnowledgeBaseClient for BedrockKnowledgeBaseClient {
    async fn retrieve(
        &self,
        request: &RetrieveRequest<'_>,
    ) -> Result<Vec<RetrievalHit>, SearchClientError> {
        let body = serde_json::to_vec(&RetrieveBody::from_request(request))
            .map_err(|e| SearchClientError::Decode(format!("failed to encode request: {}", e)))?;

        let (url, path) = self.retrieve_target(request.knowledge_base_id);

        let signed = sign_request(
            &self.credentials,
            &self.region,
            &SigningInput {
                method: "POST",
                path: &path,
                host: &self.host,
                content_type: "application/json",
                payload: &body,
                now: Utc::now(),
            },
        );

        let mut req_builder = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .header("x-amz-date", &signed.amz_date)
            .header("Authorization", &signed.authorization);
        if let Some(ref token) = self.credentials.session_token {
            req_builder = req_builder.header("x-amz-security-token", token);
        }

        debug!(%url, strategy = %request.strategy, "Sending Retrieve request");
        let resp = req_builder.body(body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = provider_message(&text);
            return Err(match status.as_u16() {
                429 => SearchClientError::Throttled(message),
                401 | 403 => SearchClientError::Auth(message),
                code => SearchClientError::Api {
                    status: code,
                    message,
                },
            });
        }

        let bytes = resp.bytes().await?;
        parse_retrieve_response(&bytes)
    }
}

// ============ Wire types ============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveBody<'a> {
    retrieval_query: RetrievalQuery<'a>,
    retrieval_configuration: RetrievalConfiguration,
}

#[derive(Debug, Serialize)]
struct RetrievalQuery<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrievalConfiguration {
    vector_search_configuration: VectorSearchConfiguration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VectorSearchConfiguration {
    number_of_results: u32,
    override_search_type: SearchStrategy,
}

impl<'a> RetrieveBody<'a> {
    fn from_request(request: &RetrieveRequest<'a>) -> Self {
        Self {
            retrieval_query: RetrievalQuery { text: request.text },
            retrieval_configuration: RetrievalConfiguration {
                vector_search_configuration: VectorSearchConfiguration {
                    number_of_results: request.max_results,
                    override_search_type: request.strategy,
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    #[serde(default)]
    retrieval_results: Vec<RawResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResult {
    #[serde(default)]
    content: Option<RawContent>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    location: Option<RawLocation>,
}

#[derive(Debug, Deserialize)]
struct RawContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLocation {
    #[serde(default)]
    s3_location: Option<RawS3Location>,
    #[serde(default)]
    web_location: Option<RawWebLocation>,
}

#[derive(Debug, Deserialize)]
struct RawS3Location {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawWebLocation {
    #[serde(default)]
    url: Option<String>,
}

impl From<RawResult> for RetrievalHit {
    fn from(raw: RawResult) -> Self {
        let source_uri = raw.location.and_then(|loc| {
            loc.s3_location
                .and_then(|s3| s3.uri)
                .or_else(|| loc.web_location.and_then(|w| w.url))
        });
        RetrievalHit {
            content: raw.content.and_then(|c| c.text).unwrap_or_default(),
            score: raw.score,
            source_uri,
        }
    }
}

/// Decode a `Retrieve` response body into hits, preserving provider order.
fn parse_retrieve_response(body: &[u8]) -> Result<Vec<RetrievalHit>, SearchClientError> {
    let parsed: RetrieveResponse =
        serde_json::from_slice(body).map_err(|e| SearchClientError::Decode(e.to_string()))?;
    Ok(parsed
        .retrieval_results
        .into_iter()
        .map(RetrievalHit::from)
        .collect())
}

/// Extract the `message` field of an AWS JSON error, else a bounded prefix
/// of the raw body.
fn provider_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct AwsError {
        #[serde(alias = "Message")]
        message: String,
    }

    match serde_json::from_str::<AwsError>(body) {
        Ok(e) => e.message,
        Err(_) => body.chars().take(500).collect(),
    }
}

// ============ AWS SigV4 Helpers ============

struct SigningInput<'a> {
    method: &'a str,
    /// Request path, each segment already URI-encoded once.
    path: &'a str,
    host: &'a str,
    content_type: &'a str,
    payload: &'a [u8],
    now: DateTime<Utc>,
}

struct SignedRequest {
    amz_date: String,
    authorization: String,
}

/// Compute the SigV4 `Authorization` header for a request with no query
/// string.
fn sign_request(creds: &AwsCredentials, region: &str, input: &SigningInput<'_>) -> SignedRequest {
    let date_stamp = input.now.format("%Y%m%d").to_string();
    let amz_date = input.now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex_sha256(input.payload);

    let mut headers = vec![
        ("content-type".to_string(), input.content_type.to_string()),
        ("host".to_string(), input.host.to_string()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        input.method,
        canonical_uri(input.path),
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let credential_scope = format!("{}/{}/{}/aws4_request", date_stamp, region, SERVICE);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, SERVICE);
    let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

    SignedRequest {
        amz_date,
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        ),
    }
}

/// Non-S3 services expect each path segment encoded twice in the
/// canonical request.
fn canonical_uri(path: &str) -> String {
    path.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

/// Compute the hex-encoded SHA-256 hash of data.
fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute hex-encoded HMAC-SHA256.
fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986, leaving only `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn client_for(endpoint: Option<&str>) -> BedrockKnowledgeBaseClient {
        let config = KnowledgeBaseConfig {
            id: "KB1".to_string(),
            region: Some("us-west-2".to_string()),
            endpoint_url: endpoint.map(str::to_string),
            max_results: 10,
            timeout_secs: 5,
        };
        BedrockKnowledgeBaseClient::new(&config, AwsCredentials::new("AKID", "secret", None))
            .unwrap()
    }

    #[test]
    fn test_default_endpoint_target() {
        let client = client_for(None);
        assert_eq!(client.host, "bedrock-agent-runtime.us-west-2.amazonaws.com");
        let (url, path) = client.retrieve_target("KB1");
        assert_eq!(path, "/knowledgebases/KB1/retrieve");
        assert_eq!(
            url,
            "https://bedrock-agent-runtime.us-west-2.amazonaws.com/knowledgebases/KB1/retrieve"
        );
    }

    #[test]
    fn test_endpoint_with_path_prefix_is_signed_in_full() {
        let client = client_for(Some("http://proxy:8080/bedrock/"));
        assert_eq!(client.host, "proxy:8080");
        let (url, path) = client.retrieve_target("KB1");
        assert_eq!(path, "/bedrock/knowledgebases/KB1/retrieve");
        assert_eq!(url, "http://proxy:8080/bedrock/knowledgebases/KB1/retrieve");
    }

    #[test]
    fn test_endpoint_default_port_is_not_signed() {
        let client = client_for(Some("https://kb.internal:443"));
        assert_eq!(client.host, "kb.internal");
        let (url, _) = client.retrieve_target("KB1");
        assert_eq!(url, "https://kb.internal/knowledgebases/KB1/retrieve");
    }

    #[test]
    fn test_derive_signing_key_matches_aws_example() {
        // From the AWS SigV4 documentation.
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_uri_encode() {
        assert_eq!(uri_encode("KB-1_a.b~"), "KB-1_a.b~");
        assert_eq!(uri_encode("a b/c"), "a%20b%2Fc");
        assert_eq!(canonical_uri("/knowledgebases/a%20b/retrieve"), "/knowledgebases/a%2520b/retrieve");
    }

    #[test]
    fn test_sign_request_shape() {
        let creds = AwsCredentials::new("AKIDEXAMPLE", "secret", Some("token".into()));
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let signed = sign_request(
            &creds,
            "us-east-1",
            &SigningInput {
                method: "POST",
                path: "/knowledgebases/KB1/retrieve",
                host: "bedrock-agent-runtime.us-east-1.amazonaws.com",
                content_type: "application/json",
                payload: b"{}",
                now,
            },
        );
        assert_eq!(signed.amz_date, "20240501T123000Z");
        assert!(signed.authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240501/us-east-1/bedrock/aws4_request, "
        ));
        assert!(signed
            .authorization
            .contains("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token, "));
        let signature = signed.authorization.rsplit("Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn test_request_body_shape() {
        let req = RetrieveRequest {
            knowledge_base_id: "KB1",
            text: "claim ID 1234",
            strategy: SearchStrategy::Hybrid,
            max_results: 10,
        };
        let body = serde_json::to_value(RetrieveBody::from_request(&req)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "retrievalQuery": { "text": "claim ID 1234" },
                "retrievalConfiguration": {
                    "vectorSearchConfiguration": {
                        "numberOfResults": 10,
                        "overrideSearchType": "HYBRID"
                    }
                }
            })
        );
    }

    #[test]
    fn test_parse_response_fail_closed() {
        let body = br#"{
            "retrievalResults": [
                {
                    "content": { "text": "Claim 1234: approved" },
                    "score": 0.87,
                    "location": { "type": "S3", "s3Location": { "uri": "s3://kb/claims.csv" } }
                },
                { "score": 0.5 },
                { "content": {}, "location": { "webLocation": { "url": "https://example.com" } } }
            ]
        }"#;
        let hits = parse_retrieve_response(body).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].content, "Claim 1234: approved");
        assert_eq!(hits[0].score, Some(0.87));
        assert_eq!(hits[0].source_uri.as_deref(), Some("s3://kb/claims.csv"));
        assert_eq!(hits[1].content, "");
        assert_eq!(hits[1].source_display(), "Unknown source");
        assert_eq!(hits[2].score, None);
        assert_eq!(hits[2].source_uri.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_parse_response_missing_results_is_empty() {
        assert!(parse_retrieve_response(b"{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_response_garbage_is_decode_error() {
        let err = parse_retrieve_response(b"<html>").unwrap_err();
        assert!(matches!(err, SearchClientError::Decode(_)));
    }

    #[test]
    fn test_provider_message() {
        assert_eq!(
            provider_message(r#"{"message":"Rate exceeded"}"#),
            "Rate exceeded"
        );
        assert_eq!(provider_message("plain text"), "plain text");
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = AwsCredentials::new("AKID", "super-secret", None);
        let dbg = format!("{:?}", creds);
        assert!(dbg.contains("AKID"));
        assert!(!dbg.contains("super-secret"));
    }
}

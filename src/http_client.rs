//! # Outbound HTTP Client
//!
//! The request pipeline never talks to the network directly: it hands an
//! [`OutboundRequest`] to an [`HttpClient`] capability. [`ReqwestHttpClient`] is the
//! implementation installed by default; tests and embedders can install their own.
//!
//! ## Key Features
//! - Destination URL composition (scheme defaulting, path joining, query encoding)
//! - Best-effort decoding of provider bodies into JSON
//! - Provider error message extraction for non-2xx replies
//!
//! Retries and circuit breaking belong to the client implementation; the pipeline
//! surfaces transport failures as they are.

use async_trait::async_trait;
use axum::http::StatusCode;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::core::config::HttpClientConfig;
use crate::core::error::{BffError, BffResult};
use crate::core::types::HttpMethod;

/// Fully composed request to a provider
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: IndexMap<String, String>,
    /// JSON body; only set for methods that carry one
    pub body: Option<Value>,
}

/// Raw provider reply
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: Vec<u8>,
}

impl ProviderResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: IndexMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as JSON: empty bodies are `null`, non-JSON bodies become a JSON string
    pub fn json_body(&self) -> Value {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Value::Null;
        }
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&self.body).into_owned()))
    }

    /// Best-effort human readable reason for a failed reply
    pub fn error_message(&self) -> String {
        let body = self.json_body();

        let from_fields = ["message", "error", "detail"].iter().find_map(|field| {
            body.get(field)
                .and_then(Value::as_str)
                .filter(|text| !text.trim().is_empty())
                .map(str::to_string)
        });

        from_fields
            .or_else(|| match body {
                Value::String(text) if !text.trim().is_empty() => Some(text),
                _ => None,
            })
            .unwrap_or_else(|| reason_phrase(self.status))
    }
}

/// Canonical reason phrase of a status code
pub fn reason_phrase(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown Status")
        .to_string()
}

/// Outbound HTTP capability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send a request; non-2xx replies are returned, not raised
    async fn send(&self, request: OutboundRequest) -> BffResult<ProviderResponse>;
}

/// Compose the destination URL.
///
/// A host without a scheme is called over `https://`.
pub fn build_url(host: &str, path: &str, query: &IndexMap<String, String>) -> BffResult<String> {
    let host = host.trim_end_matches('/');
    let base = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };

    let path = if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    let mut url = Url::parse(&format!("{}{}", base, path))
        .map_err(|e| BffError::config(format!("Invalid provider URL {}{}: {}", base, path, e)))?;

    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    Ok(url.into())
}

/// `reqwest` backed client
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(config: &HttpClientConfig) -> BffResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder
            .build()
            .map_err(|e| BffError::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: OutboundRequest) -> BffResult<ProviderResponse> {
        debug!(method = %request.method, url = %request.url, "Calling provider");

        let mut builder = self
            .client
            .request(request.method.into(), request.url.as_str());

        let has_content_type = request
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("content-type"));

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            if !has_content_type {
                builder = builder.header("content-type", "application/json");
            }
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(ProviderResponse {
            status,
            headers,
            body,
        })
    }
}

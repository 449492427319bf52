//! # Core Types
//!
//! Request-side data structures shared by the mapping engine, the validation adapter
//! and the route pipeline.
//!
//! Facets are carried as `serde_json::Value` so mapping, validation and cache
//! serialisation all work on one well-defined JSON sum type.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::core::error::BffError;

/// One part of an inbound request (or of a provider reply, for `Body`/`Headers`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facet {
    Params,
    Query,
    Headers,
    Body,
}

impl Facet {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Params => "params",
            Self::Query => "query",
            Self::Headers => "headers",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP methods a route descriptor can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether an outbound request with this method carries a body
    pub fn has_body(&self) -> bool {
        !matches!(self, Self::Get | Self::Delete)
    }

    /// Only safe, idempotent (read-only) methods are ever cached
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::Get)
    }

    /// Lower-case name as used for OpenAPI path item keys
    pub fn openapi_key(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = BffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(BffError::config(format!("Unsupported HTTP method: {}", other))),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Request as it arrives at a route handler, already split into facets
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: HttpMethod,

    /// Path relative to the BFF prefix, e.g. `/placeholder/todos/5`
    pub path: String,

    /// Path parameters extracted by the route table (JSON object of strings)
    pub params: Value,

    /// Decoded query string (JSON object)
    pub query: Value,

    /// Lower-cased request headers (JSON object)
    pub headers: Value,

    /// Parsed JSON body, `Value::Null` when absent
    pub body: Value,
}

impl InboundRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Value::Object(Map::new()),
            query: Value::Object(Map::new()),
            headers: Value::Object(Map::new()),
            body: Value::Null,
        }
    }

    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        insert_string(&mut self.params, name, value.into());
        self
    }

    pub fn with_query(mut self, name: &str, value: impl Into<String>) -> Self {
        insert_string(&mut self.query, name, value.into());
        self
    }

    /// Header names are stored lower-cased
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        insert_string(&mut self.headers, &name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

fn insert_string(target: &mut Value, name: &str, value: String) {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        map.insert(name.to_string(), Value::String(value));
    }
}

/// Facets already mapped for the outbound request, in pipeline order
#[derive(Debug, Clone, Default)]
pub struct MappedFacets {
    pub params: Option<IndexMap<String, String>>,
    pub query: Option<IndexMap<String, String>>,
    pub headers: Option<IndexMap<String, String>>,
}

/// Shared request context handed to every request-side mapping function.
///
/// Facets are replaced by their validated values as the pipeline progresses, and
/// facets that have already been mapped are visible through `mapped`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: HttpMethod,
    pub path: String,
    pub params: Value,
    pub query: Value,
    pub headers: Value,
    pub body: Value,
    pub mapped: MappedFacets,
}

impl RequestContext {
    pub fn from_request(request: InboundRequest) -> Self {
        Self {
            method: request.method,
            path: request.path,
            params: request.params,
            query: request.query,
            headers: request.headers,
            body: request.body,
            mapped: MappedFacets::default(),
        }
    }

    /// Current value of an inbound facet
    pub fn facet(&self, facet: Facet) -> &Value {
        match facet {
            Facet::Params => &self.params,
            Facet::Query => &self.query,
            Facet::Headers => &self.headers,
            Facet::Body => &self.body,
        }
    }

    /// Replace an inbound facet, typically with its validated value
    pub fn set_facet(&mut self, facet: Facet, value: Value) {
        match facet {
            Facet::Params => self.params = value,
            Facet::Query => self.query = value,
            Facet::Headers => self.headers = value,
            Facet::Body => self.body = value,
        }
    }

    /// Convenience lookup of a single inbound header (names are lower-case)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name.to_ascii_lowercase())
            .and_then(Value::as_str)
    }
}

/// Whether a response was served from cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Bypass => "BYPASS",
        }
    }
}

/// Successful pipeline result
#[derive(Debug, Clone, PartialEq)]
pub struct BffResponse {
    pub status: u16,
    pub body: Value,
    pub cache: CacheStatus,
}

impl BffResponse {
    pub fn ok(body: Value, cache: CacheStatus) -> Self {
        Self {
            status: 200,
            body,
            cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_body_and_cacheability() {
        assert!(!HttpMethod::Get.has_body());
        assert!(!HttpMethod::Delete.has_body());
        assert!(HttpMethod::Post.has_body());
        assert!(HttpMethod::Get.is_cacheable());
        assert!(!HttpMethod::Put.is_cacheable());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("PATCH".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_inbound_request_builders() {
        let request = InboundRequest::new(HttpMethod::Get, "/todos/5")
            .with_param("id", "5")
            .with_header("Authorization", "Bearer x")
            .with_body(json!({"a": 1}));

        assert_eq!(request.params, json!({"id": "5"}));
        assert_eq!(request.headers, json!({"authorization": "Bearer x"}));

        let context = RequestContext::from_request(request);
        assert_eq!(context.header("AUTHORIZATION"), Some("Bearer x"));
        assert_eq!(context.facet(Facet::Body), &json!({"a": 1}));
    }
}

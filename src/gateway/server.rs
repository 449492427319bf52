//! # HTTP Server Module
//!
//! Thin axum layer in front of the route table. It turns axum requests into
//! [`InboundRequest`]s, dispatches them to the matching [`RoutePipeline`], and serves
//! the two BFF-owned end-points:
//! - `POST /__bff-internal/invalidate-all-cache` (when caching is configured)
//! - `GET {prefix}{openapi.path}` returning the OpenAPI document (when enabled)
//!
//! ## Rust Concepts Used
//!
//! - `Arc<T>` for sharing the route table and cache registry across requests
//! - Axum's `State` extractor and a fallback handler for prefix-mounted dispatch
//! - `tokio::net::TcpListener` with graceful shutdown on SIGINT/SIGTERM

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router as AxumRouter,
};
use openapiv3::OpenAPI;
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, instrument, warn};

use crate::caching::{CacheOptions, CacheRegistry};
use crate::core::config::{BffConfig, CachingConfig};
use crate::core::error::{BffError, BffResult, FieldError};
use crate::core::types::{Facet, HttpMethod, InboundRequest};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::openapi::DocumentBuilder;
use crate::routing::{parse_query, RouteDescriptor, RoutePipeline, RouteTable};

/// Administrative end-point clearing every instantiated cache strategy
pub const INVALIDATE_ALL_CACHE_PATH: &str = "/__bff-internal/invalidate-all-cache";

/// Largest inbound body accepted
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Header telling callers whether the reply came from cache
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Shared state of the axum handlers
#[derive(Clone)]
struct ServerState {
    prefix: String,
    routes: Arc<RouteTable>,
    registry: Arc<CacheRegistry>,
    caching: Option<CachingConfig>,
    document: Option<Arc<OpenAPI>>,
}

/// BFF HTTP server
pub struct BffServer {
    config: BffConfig,
    client: Arc<dyn HttpClient>,
    registry: Arc<CacheRegistry>,
    routes: RouteTable,
    docs: Option<DocumentBuilder>,
}

impl BffServer {
    /// Server calling providers through `reqwest`
    pub fn new(config: BffConfig) -> BffResult<Self> {
        let client = ReqwestHttpClient::new(&config.http_client)?;
        Ok(Self::with_client(config, Arc::new(client)))
    }

    /// Server calling providers through `client`
    pub fn with_client(config: BffConfig, client: Arc<dyn HttpClient>) -> Self {
        let docs = config
            .openapi
            .clone()
            .map(|openapi| DocumentBuilder::new(openapi, config.prefix.clone()));

        Self {
            config,
            client,
            registry: Arc::new(CacheRegistry::new()),
            routes: RouteTable::new(),
            docs,
        }
    }

    /// Use a caller-owned cache registry; call before registering routes
    pub fn with_registry(mut self, registry: Arc<CacheRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Compile and register one route
    pub fn route(&mut self, descriptor: RouteDescriptor) -> BffResult<&mut Self> {
        if let Some(docs) = self.docs.as_mut() {
            docs.add_route(&descriptor);
        }

        let pipeline = RoutePipeline::compile(
            descriptor,
            Arc::clone(&self.client),
            &self.registry,
            self.config.caching.as_ref(),
        )?;
        self.routes.add_route(pipeline)?;
        Ok(self)
    }

    /// Compile and register several routes
    pub fn routes<I>(mut self, descriptors: I) -> BffResult<Self>
    where
        I: IntoIterator<Item = RouteDescriptor>,
    {
        for descriptor in descriptors {
            self.route(descriptor)?;
        }
        Ok(self)
    }

    pub fn config(&self) -> &BffConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    /// OpenAPI document of the registered routes, when documentation is enabled
    pub fn document(&self) -> Option<OpenAPI> {
        self.docs.as_ref().map(DocumentBuilder::build)
    }

    /// Build the axum application
    pub fn router(&self) -> AxumRouter {
        let state = ServerState {
            prefix: self.config.prefix.clone(),
            routes: Arc::new(self.routes.clone()),
            registry: Arc::clone(&self.registry),
            caching: self.config.caching.clone(),
            document: self.document().map(Arc::new),
        };

        let mut app = AxumRouter::new();

        if state.caching.is_some() {
            info!("Registering end-point: [POST] {}", INVALIDATE_ALL_CACHE_PATH);
            app = app.route(INVALIDATE_ALL_CACHE_PATH, post(invalidate_all_cache));
        }

        if let Some(openapi) = &self.config.openapi {
            let docs_path = format!("{}{}", self.config.prefix, openapi.path);
            info!("Registering end-point: [GET] {}", docs_path);
            app = app.route(&docs_path, get(openapi_document));
        }

        app.fallback(dispatch)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(state)
    }

    /// Serve until SIGINT/SIGTERM
    #[instrument(skip(self))]
    pub async fn serve(self, addr: SocketAddr) -> BffResult<()> {
        let app = self.router();

        let listener = TcpListener::bind(addr).await.map_err(|e| {
            BffError::internal(format!("Failed to bind BFF server to {}: {}", addr, e))
        })?;

        info!("BFF listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| BffError::internal(format!("BFF server error: {}", e)))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Route every non-BFF request through the route table
async fn dispatch(State(state): State<ServerState>, request: Request) -> Response {
    match handle_request(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            if e.status_code().is_server_error() {
                error!(error = %e, code = e.code(), "Request failed");
            } else {
                debug!(error = %e, code = e.code(), "Request rejected");
            }
            e.into_response()
        }
    }
}

async fn handle_request(state: &ServerState, request: Request) -> BffResult<Response> {
    let (parts, body) = request.into_parts();
    let full_path = parts.uri.path().to_string();

    let not_found = || BffError::not_found(parts.method.as_str(), full_path.as_str());

    let method: HttpMethod = parts.method.as_str().parse().map_err(|_| not_found())?;
    let path = strip_prefix(&state.prefix, &full_path).ok_or_else(not_found)?;
    let matched = state
        .routes
        .match_route(method, path)
        .ok_or_else(not_found)?;

    debug!(pattern = %matched.pattern, path = %path, "Matched route");

    let mut inbound = InboundRequest::new(method, path);
    inbound.params = string_object(matched.params);
    inbound.query = string_object(parse_query(parts.uri.query()));
    inbound.headers = headers_object(&parts.headers);
    inbound.body = read_json_body(body).await?;

    let reply = matched.pipeline.handle(inbound).await?;
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::OK);

    Ok((
        status,
        [(CACHE_STATUS_HEADER, reply.cache.as_str())],
        Json(reply.body),
    )
        .into_response())
}

/// Path relative to `prefix`, if it is mounted there
fn strip_prefix<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }
    match path.strip_prefix(prefix)? {
        "" => Some("/"),
        rest if rest.starts_with('/') => Some(rest),
        _ => None,
    }
}

fn string_object<I>(entries: I) -> Value
where
    I: IntoIterator<Item = (String, String)>,
{
    Value::Object(
        entries
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect(),
    )
}

/// Lower-cased header names; repeated headers are joined with `", "`
fn headers_object(headers: &HeaderMap) -> Value {
    let mut object = Map::new();
    for name in headers.keys() {
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        if !values.is_empty() {
            object.insert(name.as_str().to_ascii_lowercase(), json!(values.join(", ")));
        }
    }
    Value::Object(object)
}

/// Empty bodies are `null`; anything else must be JSON
async fn read_json_body(body: Body) -> BffResult<Value> {
    let bytes = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
        BffError::bad_request(vec![FieldError::new(
            "",
            format!("Unable to read body: {}", e),
            Facet::Body,
        )])
    })?;

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    serde_json::from_slice(&bytes).map_err(|e| {
        BffError::bad_request(vec![FieldError::new(
            "",
            format!("Invalid JSON body: {}", e),
            Facet::Body,
        )])
    })
}

async fn invalidate_all_cache(State(state): State<ServerState>) -> Response {
    let Some(caching) = &state.caching else {
        return BffError::not_found("POST", INVALIDATE_ALL_CACHE_PATH).into_response();
    };

    let options = CacheOptions {
        ttl: caching.ttl,
        path: caching.path.clone(),
    };

    match state.registry.invalidate_all(&options).await {
        Ok(()) => {
            info!("All caches invalidated");
            (StatusCode::OK, Json(json!({"message": "All caches invalidated"}))).into_response()
        }
        Err(e) => {
            error!(error = %e, "Cache invalidation failed");
            BffError::internal(format!("Cache invalidation failed: {}", e)).into_response()
        }
    }
}

async fn openapi_document(State(state): State<ServerState>) -> Response {
    match &state.document {
        Some(document) => Json(document.as_ref().clone()).into_response(),
        None => BffError::not_found("GET", "openapi").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_stripping() {
        assert_eq!(strip_prefix("", "/todos/5"), Some("/todos/5"));
        assert_eq!(strip_prefix("/api", "/api/todos/5"), Some("/todos/5"));
        assert_eq!(strip_prefix("/api", "/api"), Some("/"));
        assert_eq!(strip_prefix("/api", "/apix/todos"), None);
        assert_eq!(strip_prefix("/api", "/todos"), None);
    }

    #[test]
    fn test_headers_are_lowercased_and_joined() {
        let mut headers = HeaderMap::new();
        headers.append("X-Trace", "a".parse().unwrap());
        headers.append("x-trace", "b".parse().unwrap());
        headers.insert("Authorization", "Bearer t".parse().unwrap());

        let object = headers_object(&headers);
        assert_eq!(object["x-trace"], "a, b");
        assert_eq!(object["authorization"], "Bearer t");
    }

    #[tokio::test]
    async fn test_body_decoding() {
        assert_eq!(read_json_body(Body::empty()).await.unwrap(), Value::Null);
        assert_eq!(
            read_json_body(Body::from(r#"{"id":"5"}"#)).await.unwrap(),
            json!({"id": "5"})
        );

        let error = read_json_body(Body::from("not json")).await.unwrap_err();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.field_errors().unwrap()[0].facet, Facet::Body);
    }
}

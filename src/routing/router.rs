//! # Router Module
//!
//! The [`RouteTable`] dispatches inbound requests to compiled route pipelines.
//!
//! ## Matching rules
//! - Routes are kept sorted by end-point length, longest first, so `/a/:id` is tried
//!   before `/a`. Routes of equal length keep their registration order.
//! - End-points are mounted: a route matches when its segments match the leading
//!   segments of the request path. Literal segments compare exactly and `:name`
//!   segments capture one non-empty segment.
//! - A route whose path matches but whose method does not is skipped, and matching
//!   continues with the next route.
//!
//! ## Rust Concepts Used
//! - `Arc<RoutePipeline>` so a matched handler can be moved into a request task
//! - Borrowed `&str` segments during matching; only captured values are allocated

use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::pipeline::RoutePipeline;
use crate::core::error::{BffError, BffResult};
use crate::core::types::HttpMethod;

/// Registered route
#[derive(Debug, Clone)]
pub struct Route {
    /// Mount path, e.g. `/todos/:id`
    pub pattern: String,
    pub method: HttpMethod,
    pub pipeline: Arc<RoutePipeline>,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

impl Route {
    pub fn new(pipeline: RoutePipeline) -> Self {
        let descriptor = pipeline.descriptor();
        let pattern = descriptor.endpoint.clone();
        let method = descriptor.method;
        let segments = split_path(&pattern)
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();

        Self {
            pattern,
            method,
            pipeline: Arc::new(pipeline),
            segments,
        }
    }

    /// Path parameters when `path` is mounted under this route
    fn capture(&self, path: &str) -> Option<IndexMap<String, String>> {
        let mut request_segments = split_path(path);
        let mut params = IndexMap::new();

        for segment in &self.segments {
            let actual = request_segments.next()?;
            match segment {
                Segment::Literal(expected) => {
                    if expected != actual {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = urlencoding::decode(actual)
                        .map(|decoded| decoded.into_owned())
                        .unwrap_or_else(|_| actual.to_string());
                    params.insert(name.clone(), value);
                }
            }
        }

        Some(params)
    }
}

/// Result of a successful match
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub pattern: String,
    pub params: IndexMap<String, String>,
    pub pipeline: Arc<RoutePipeline>,
}

/// Longest-path-first route table
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled route.
    ///
    /// Registering the same method and end-point twice is a configuration error.
    pub fn add_route(&mut self, pipeline: RoutePipeline) -> BffResult<()> {
        let route = Route::new(pipeline);

        if self
            .routes
            .iter()
            .any(|existing| existing.method == route.method && existing.pattern == route.pattern)
        {
            return Err(BffError::config(format!(
                "Route [{}] {} is registered twice",
                route.method, route.pattern
            )));
        }

        info!("Registering end-point: [{}] {}", route.method, route.pattern);
        self.routes.push(route);
        // Stable: equal lengths keep registration order
        self.routes
            .sort_by(|a, b| b.pattern.len().cmp(&a.pattern.len()));
        Ok(())
    }

    /// Find the route serving `method path`
    pub fn match_route(&self, method: HttpMethod, path: &str) -> Option<RouteMatch> {
        for route in &self.routes {
            let Some(params) = route.capture(path) else {
                continue;
            };
            if route.method != method {
                debug!(pattern = %route.pattern, "Path matched but method differs");
                continue;
            }
            return Some(RouteMatch {
                pattern: route.pattern.clone(),
                params,
                pipeline: Arc::clone(&route.pipeline),
            });
        }
        None
    }

    /// Registered routes in matching order
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Decode a raw query string.
///
/// Keys without `=` map to an empty value; `+` is a space. A repeated key keeps
/// its last value.
pub fn parse_query(query: Option<&str>) -> IndexMap<String, String> {
    let mut params = IndexMap::new();

    let Some(query) = query else {
        return params;
    };

    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if let (Ok(key), Ok(value)) = (decode_component(key), decode_component(value)) {
            params.insert(key, value);
        }
    }

    params
}

fn decode_component(raw: &str) -> Result<String, std::string::FromUtf8Error> {
    urlencoding::decode(&raw.replace('+', " ")).map(|decoded| decoded.into_owned())
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

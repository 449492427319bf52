//! # Route Descriptor
//!
//! Declarative description of one BFF end-point: where the provider lives, how each
//! request facet is validated and mapped, how the provider reply is checked and
//! reshaped, how responses are cached and how the operation is documented.
//!
//! Descriptors are immutable once built and are compiled into a
//! [`RoutePipeline`](super::pipeline::RoutePipeline) at startup.
//!
//! ## Example
//! ```rust,ignore
//! use api_bff::mapping::{fixed, forward, MappingRule};
//! use api_bff::routing::RouteDescriptor;
//!
//! let route = RouteDescriptor::get("/todos/:id")
//!     .host("jsonplaceholder.typicode.com")
//!     .path("/todos/:id")
//!     .map_params(MappingRule::fields([("id", forward())]))
//!     .map_headers(MappingRule::fields([("x-api-bff", fixed(true))]));
//! ```

use serde_json::Value;
use std::collections::BTreeSet;

use crate::caching::{CachingOverride, RouteCaching};
use crate::core::error::{BffError, BffResult};
use crate::core::types::{Facet, HttpMethod};
use crate::mapping::{FieldRule, RequestMapping, ResponseMapping};
use crate::validation::SharedSchema;

/// One optional value per inbound facet
#[derive(Debug, Clone)]
pub struct PerFacet<T> {
    pub params: Option<T>,
    pub query: Option<T>,
    pub headers: Option<T>,
    pub body: Option<T>,
}

impl<T> Default for PerFacet<T> {
    fn default() -> Self {
        Self {
            params: None,
            query: None,
            headers: None,
            body: None,
        }
    }
}

impl<T> PerFacet<T> {
    pub fn get(&self, facet: Facet) -> Option<&T> {
        match facet {
            Facet::Params => self.params.as_ref(),
            Facet::Query => self.query.as_ref(),
            Facet::Headers => self.headers.as_ref(),
            Facet::Body => self.body.as_ref(),
        }
    }

    pub fn set(&mut self, facet: Facet, value: T) {
        let slot = match facet {
            Facet::Params => &mut self.params,
            Facet::Query => &mut self.query,
            Facet::Headers => &mut self.headers,
            Facet::Body => &mut self.body,
        };
        *slot = Some(value);
    }
}

/// Request-side contract
#[derive(Debug, Clone, Default)]
pub struct RequestSpec {
    pub validation: PerFacet<SharedSchema>,
    pub mapping: PerFacet<RequestMapping>,
}

/// Reply-side contract, applied in field order
#[derive(Debug, Clone, Default)]
pub struct ResponseSpec {
    /// Shape the provider promises to return
    pub provider_validation: Option<SharedSchema>,
    pub mapping: Option<ResponseMapping>,
    /// Shape returned to the caller
    pub validation: Option<SharedSchema>,
}

/// Documentation metadata
#[derive(Debug, Clone, Default)]
pub struct Documentation {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Error statuses documented in addition to the baseline ones
    pub possible_errors: Vec<u16>,
    pub deprecated: bool,
}

/// Declarative route configuration
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    /// Inbound method
    pub method: HttpMethod,

    /// Mount path relative to the BFF prefix, with `:name` placeholders
    pub endpoint: String,

    /// Provider host, with or without scheme
    pub host: String,

    /// Provider path template with `:name` placeholders
    pub path: String,

    pub request: RequestSpec,
    pub response: ResponseSpec,
    pub caching: RouteCaching,
    pub documentation: Documentation,
}

impl RouteDescriptor {
    /// New descriptor; the provider path defaults to the end-point
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        let endpoint = normalize_path(&endpoint.into());
        Self {
            method,
            path: endpoint.clone(),
            endpoint,
            host: String::new(),
            request: RequestSpec::default(),
            response: ResponseSpec::default(),
            caching: RouteCaching::default(),
            documentation: Documentation::default(),
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, endpoint)
    }

    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, endpoint)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = normalize_path(&path.into());
        self
    }

    /// Validate an inbound facet before it is mapped
    pub fn validate(mut self, facet: Facet, schema: SharedSchema) -> Self {
        self.request.validation.set(facet, schema);
        self
    }

    /// Map an inbound facet into the outbound request
    pub fn map(mut self, facet: Facet, rule: RequestMapping) -> Self {
        self.request.mapping.set(facet, rule);
        self
    }

    pub fn map_params(self, rule: RequestMapping) -> Self {
        self.map(Facet::Params, rule)
    }

    pub fn map_query(self, rule: RequestMapping) -> Self {
        self.map(Facet::Query, rule)
    }

    pub fn map_headers(self, rule: RequestMapping) -> Self {
        self.map(Facet::Headers, rule)
    }

    pub fn map_body(self, rule: RequestMapping) -> Self {
        self.map(Facet::Body, rule)
    }

    pub fn provider_validation(mut self, schema: SharedSchema) -> Self {
        self.response.provider_validation = Some(schema);
        self
    }

    pub fn map_response(mut self, rule: ResponseMapping) -> Self {
        self.response.mapping = Some(rule);
        self
    }

    pub fn validate_response(mut self, schema: SharedSchema) -> Self {
        self.response.validation = Some(schema);
        self
    }

    pub fn caching(mut self, caching: RouteCaching) -> Self {
        self.caching = caching;
        self
    }

    pub fn cache_with(self, settings: CachingOverride) -> Self {
        self.caching(RouteCaching::Enabled(settings))
    }

    pub fn no_cache(self) -> Self {
        self.caching(RouteCaching::Disabled)
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.documentation.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.documentation.description = Some(description.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.documentation.tags.push(tag.into());
        self
    }

    pub fn possible_errors<I: IntoIterator<Item = u16>>(mut self, statuses: I) -> Self {
        self.documentation.possible_errors.extend(statuses);
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.documentation.deprecated = true;
        self
    }

    /// Placeholders of the provider path template
    pub fn path_placeholders(&self) -> Vec<&str> {
        placeholders(&self.path)
    }

    /// Placeholders of the mount path
    pub fn endpoint_placeholders(&self) -> Vec<&str> {
        placeholders(&self.endpoint)
    }

    /// Check the descriptor can be compiled.
    ///
    /// Every provider path placeholder must be producible by the params facet: a
    /// declared output of a params field map, or an end-point placeholder when
    /// params pass through unmapped. A forwarded or renamed placeholder must read a
    /// key the end-point path or a params-schema default supplies. A whole-facet
    /// params function can only be checked per request.
    pub fn check(&self) -> BffResult<()> {
        if self.host.trim().is_empty() {
            return Err(BffError::config(format!(
                "Route [{}] {} has no provider host",
                self.method, self.endpoint
            )));
        }

        if self.endpoint.contains('?') || self.path.contains('?') {
            return Err(BffError::config(format!(
                "Route [{}] {}: paths must not carry a query string",
                self.method, self.endpoint
            )));
        }

        let available: Option<BTreeSet<&str>> = match &self.request.mapping.params {
            Some(rule) => rule.field_map().map(|map| map.keys().collect()),
            None => Some(self.endpoint_placeholders().into_iter().collect()),
        };

        if let Some(available) = available {
            let missing: Vec<&str> = self
                .path_placeholders()
                .into_iter()
                .filter(|name| !available.contains(name))
                .collect();

            if !missing.is_empty() {
                return Err(BffError::config(format!(
                    "Route [{}] {}: path placeholders {:?} of {} are not produced by the params mapping",
                    self.method, self.endpoint, missing, self.path
                )));
            }
        }

        self.check_params_sources()
    }

    /// Inbound params keys that are always present: end-point placeholders plus
    /// params-schema properties with a default. `None` when the params schema cannot
    /// describe itself.
    fn guaranteed_params(&self) -> Option<BTreeSet<String>> {
        let mut keys: BTreeSet<String> = self
            .endpoint_placeholders()
            .into_iter()
            .map(str::to_string)
            .collect();

        if let Some(schema) = &self.request.validation.params {
            let described = schema.describe()?;
            if let Some(properties) = described.get("properties").and_then(Value::as_object) {
                keys.extend(
                    properties
                        .iter()
                        .filter(|(_, property)| property.get("default").is_some())
                        .map(|(name, _)| name.clone()),
                );
            }
        }
        Some(keys)
    }

    /// Copy rules feeding path placeholders must read a key that can exist
    fn check_params_sources(&self) -> BffResult<()> {
        let Some(map) = self
            .request
            .mapping
            .params
            .as_ref()
            .and_then(|rule| rule.field_map())
        else {
            return Ok(());
        };
        let Some(guaranteed) = self.guaranteed_params() else {
            return Ok(());
        };

        let unreachable: Vec<String> = self
            .path_placeholders()
            .into_iter()
            .filter_map(|name| {
                let source = match map.get(name)? {
                    FieldRule::Forward => name,
                    FieldRule::Rename(source) => source.as_str(),
                    FieldRule::Constant(_) | FieldRule::Compute(_) => return None,
                };
                (!guaranteed.contains(source)).then(|| format!("{} <- {}", name, source))
            })
            .collect();

        if unreachable.is_empty() {
            Ok(())
        } else {
            Err(BffError::config(format!(
                "Route [{}] {}: params mapping reads keys the end-point never provides: {}",
                self.method,
                self.endpoint,
                unreachable.join(", ")
            )))
        }
    }
}

/// `:name` placeholders of a path template, in order
pub fn placeholders(template: &str) -> Vec<&str> {
    template
        .split('/')
        .filter_map(|segment| segment.strip_prefix(':'))
        .filter(|name| !name.is_empty())
        .collect()
}

/// Leading slash, no trailing slash (except for the root)
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

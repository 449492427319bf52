//! # Route Pipeline
//!
//! A [`RoutePipeline`] is a compiled [`RouteDescriptor`]: the per-route handler that
//! runs the full validate, map, forward, cache, validate, map, respond sequence.
//!
//! ## Request flow
//! 1. Params: validate, map, substitute into the provider path template
//! 2. Query: validate, map
//! 3. Headers: validate, map
//! 4. Body (methods carrying one): validate, map
//! 5. Compose the outbound request and destination URL
//! 6. Cache lookup; a hit short-circuits everything below
//! 7. Call the provider
//! 8. Non-2xx replies become provider errors
//! 9. Provider-shape validation (upstream contract)
//! 10. Response mapping
//! 11. Final response validation (upstream contract)
//! 12. Fire-and-forget cache write
//! 13. Reply with status 200
//!
//! Facets run strictly in this order because later mapping functions may read the
//! already-mapped facets through the shared [`RequestContext`].
//!
//! ## Rust Concepts Used
//! - `Arc<dyn HttpClient>` / `Arc<dyn CacheStrategy>` injected at compile time
//! - `tokio::spawn` for cache writes that must not delay the reply

use indexmap::IndexMap;
use metrics::counter;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::descriptor::RouteDescriptor;
use crate::caching::{
    effective_caching, CacheKeyInput, CacheOptions, CacheRegistry, CacheStrategy, KeyComposer,
};
use crate::core::config::CachingConfig;
use crate::core::error::{BffError, BffResult};
use crate::core::types::{BffResponse, CacheStatus, Facet, InboundRequest, RequestContext};
use crate::http_client::{build_url, HttpClient, OutboundRequest};
use crate::mapping::{map_body, map_headers, map_params, map_query, resolve};
use crate::validation::{validate_facet, SharedSchema};

/// Resolved cache of one route
#[derive(Clone)]
struct RouteCache {
    store: Arc<dyn CacheStrategy>,
    options: CacheOptions,
    key_composer: KeyComposer,
}

/// Compiled per-route handler
#[derive(Clone)]
pub struct RoutePipeline {
    descriptor: Arc<RouteDescriptor>,
    client: Arc<dyn HttpClient>,
    cache: Option<RouteCache>,
}

impl RoutePipeline {
    /// Compile a descriptor.
    ///
    /// Fails with a configuration error when the descriptor cannot be served, e.g. a
    /// provider path placeholder no params mapping produces.
    pub fn compile(
        descriptor: RouteDescriptor,
        client: Arc<dyn HttpClient>,
        registry: &CacheRegistry,
        global_caching: Option<&CachingConfig>,
    ) -> BffResult<Self> {
        descriptor.check()?;

        let cache = if descriptor.method.is_cacheable() {
            effective_caching(global_caching, &descriptor.caching).map(|effective| RouteCache {
                store: registry.bind(effective.strategy, &effective.options),
                options: effective.options,
                key_composer: effective.key_composer,
            })
        } else {
            None
        };

        debug!(
            method = %descriptor.method,
            endpoint = %descriptor.endpoint,
            cached = cache.is_some(),
            "Compiled route"
        );

        Ok(Self {
            descriptor: Arc::new(descriptor),
            client,
            cache,
        })
    }

    pub fn descriptor(&self) -> &RouteDescriptor {
        &self.descriptor
    }

    /// Whether successful replies of this route are cached
    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Run one request through the route
    #[instrument(
        name = "route",
        skip(self, request),
        fields(method = %self.descriptor.method, endpoint = %self.descriptor.endpoint)
    )]
    pub async fn handle(&self, request: InboundRequest) -> BffResult<BffResponse> {
        let descriptor = &self.descriptor;
        let mut context = RequestContext::from_request(request);

        self.validate_inbound(&mut context, Facet::Params).await?;
        let params = map_params(descriptor.request.mapping.get(Facet::Params), &context).await?;
        let path = substitute_path(&descriptor.path, &params)?;
        context.mapped.params = Some(params.clone());

        self.validate_inbound(&mut context, Facet::Query).await?;
        let query = map_query(descriptor.request.mapping.get(Facet::Query), &context).await?;
        context.mapped.query = Some(query.clone());

        self.validate_inbound(&mut context, Facet::Headers).await?;
        let headers = map_headers(descriptor.request.mapping.get(Facet::Headers), &context).await?;
        context.mapped.headers = Some(headers.clone());

        let body = if descriptor.method.has_body() {
            self.validate_inbound(&mut context, Facet::Body).await?;
            let body = map_body(descriptor.request.mapping.get(Facet::Body), &context).await?;
            Some(body).filter(|body| !body.is_null())
        } else {
            None
        };

        let url = build_url(&descriptor.host, &path, &query)?;

        let cache_key = self.cache.as_ref().map(|cache| {
            cache.key_composer.compose(&CacheKeyInput {
                url: &url,
                method: descriptor.method,
                query: &query,
                params: &params,
                headers: &headers,
                body: body.as_ref(),
            })
        });

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            match cache.store.get(key, &cache.options).await {
                Ok(Some(value)) => {
                    debug!(key = %key, "Cache hit");
                    counter!("bff_cache_hits_total", "endpoint" => descriptor.endpoint.clone())
                        .increment(1);
                    return Ok(BffResponse::ok(value, CacheStatus::Hit));
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Cache read failed, calling provider"),
            }
            counter!("bff_cache_misses_total", "endpoint" => descriptor.endpoint.clone())
                .increment(1);
        }

        let response = self
            .client
            .send(OutboundRequest {
                method: descriptor.method,
                url,
                headers,
                body,
            })
            .await?;

        if !response.is_success() {
            counter!(
                "bff_provider_errors_total",
                "endpoint" => descriptor.endpoint.clone(),
                "status" => response.status.to_string()
            )
            .increment(1);
            warn!(status = response.status, "Provider replied with an error");
            return Err(BffError::provider(response.status, response.error_message()));
        }

        let mut data = response.json_body();

        if let Some(schema) = &descriptor.response.provider_validation {
            data = validate_outbound(schema, data).await?;
        }

        if let Some(rule) = &descriptor.response.mapping {
            data = resolve(rule, data, &()).await?;
        }

        if let Some(schema) = &descriptor.response.validation {
            data = validate_outbound(schema, data).await?;
        }

        let status = match (&self.cache, cache_key) {
            (Some(cache), Some(key)) => {
                let cache = cache.clone();
                let value = data.clone();
                tokio::spawn(async move {
                    if let Err(e) = cache.store.set(&key, value, &cache.options).await {
                        warn!(key = %key, error = %e, "Cache write failed");
                    }
                });
                CacheStatus::Miss
            }
            _ => CacheStatus::Bypass,
        };

        Ok(BffResponse::ok(data, status))
    }

    /// Validate one inbound facet in place; the validated value replaces the raw one
    async fn validate_inbound(&self, context: &mut RequestContext, facet: Facet) -> BffResult<()> {
        if let Some(schema) = self.descriptor.request.validation.get(facet) {
            let raw = context.facet(facet).clone();
            let validated = validate_facet(schema.as_ref(), raw, facet)
                .await
                .map_err(BffError::bad_request)?;
            context.set_facet(facet, validated);
        }
        Ok(())
    }
}

impl std::fmt::Debug for RoutePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutePipeline")
            .field("method", &self.descriptor.method)
            .field("endpoint", &self.descriptor.endpoint)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

/// Validate a provider reply; failures are upstream contract violations
async fn validate_outbound(schema: &SharedSchema, data: Value) -> BffResult<Value> {
    validate_facet(schema.as_ref(), data, Facet::Body)
        .await
        .map_err(BffError::upstream_contract)
}

/// Replace `:name` segments with percent-encoded mapped params.
///
/// A placeholder without a value is a route configuration bug.
pub fn substitute_path(template: &str, params: &IndexMap<String, String>) -> BffResult<String> {
    let segments = template
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => params
                .get(name)
                .map(|value| urlencoding::encode(value).into_owned())
                .ok_or_else(|| {
                    BffError::config(format!(
                        "Path placeholder :{} of {} has no mapped value",
                        name, template
                    ))
                }),
            _ => Ok(segment.to_string()),
        })
        .collect::<BffResult<Vec<String>>>()?;

    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::{CacheKind, CachingOverride};
    use crate::core::types::HttpMethod;
    use crate::http_client::ProviderResponse;
    use crate::mapping::{fixed, forward, transform, MappingRule};
    use crate::validation::Shape;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    /// Records outbound requests and answers with a canned reply
    struct RecordingClient {
        reply: ProviderResponse,
        sent: Mutex<Vec<OutboundRequest>>,
    }

    impl RecordingClient {
        fn new(status: u16, body: Value) -> Arc<Self> {
            Arc::new(Self {
                reply: ProviderResponse::new(status, body.to_string()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.sent.lock().len()
        }

        fn last(&self) -> OutboundRequest {
            self.sent.lock().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn send(&self, request: OutboundRequest) -> BffResult<ProviderResponse> {
            self.sent.lock().push(request);
            Ok(self.reply.clone())
        }
    }

    fn memory_caching() -> CachingConfig {
        CachingConfig {
            strategy: CacheKind::Memory,
            ttl: Some(Duration::from_secs(60)),
            ..CachingConfig::default()
        }
    }

    fn todo_route() -> RouteDescriptor {
        RouteDescriptor::get("/todos/:id")
            .host("http://provider.test")
            .map_params(MappingRule::fields([("id", forward())]))
            .map_headers(MappingRule::fields([("x-api-bff", fixed(true))]))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[test]
    fn test_path_substitution() {
        let mut params = IndexMap::new();
        params.insert("id".to_string(), "a b/c".to_string());

        assert_eq!(substitute_path("/todos/:id", &params).unwrap(), "/todos/a%20b%2Fc");
        assert_eq!(substitute_path("/todos", &params).unwrap(), "/todos");
        assert!(matches!(
            substitute_path("/todos/:other", &params),
            Err(BffError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_outbound_request_and_cache_hit() {
        let client = RecordingClient::new(200, json!({"id": "5", "title": "x"}));
        let registry = CacheRegistry::new();
        let caching = memory_caching();
        let pipeline =
            RoutePipeline::compile(todo_route(), client.clone(), &registry, Some(&caching)).unwrap();

        let request = InboundRequest::new(HttpMethod::Get, "/todos/5").with_param("id", "5");
        let first = pipeline.handle(request.clone()).await.unwrap();
        assert_eq!(first.status, 200);
        assert_eq!(first.body, json!({"id": "5", "title": "x"}));
        assert_eq!(first.cache, CacheStatus::Miss);

        let sent = client.last();
        assert_eq!(sent.url, "http://provider.test/todos/5");
        assert_eq!(sent.headers.get("x-api-bff").map(String::as_str), Some("true"));
        assert_eq!(sent.body, None);

        settle().await;
        let second = pipeline.handle(request).await.unwrap();
        assert_eq!(second.cache, CacheStatus::Hit);
        assert_eq!(second.body, first.body);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_uncached_routes_bypass() {
        let client = RecordingClient::new(200, json!({"ok": true}));
        let registry = CacheRegistry::new();
        let caching = memory_caching();
        let pipeline = RoutePipeline::compile(
            todo_route().no_cache(),
            client.clone(),
            &registry,
            Some(&caching),
        )
        .unwrap();

        let request = InboundRequest::new(HttpMethod::Get, "/todos/1").with_param("id", "1");
        pipeline.handle(request.clone()).await.unwrap();
        settle().await;
        let again = pipeline.handle(request).await.unwrap();

        assert_eq!(again.cache, CacheStatus::Bypass);
        assert_eq!(client.calls(), 2);
        assert!(registry.instantiated().is_empty());
    }

    #[tokio::test]
    async fn test_post_is_never_cached() {
        let client = RecordingClient::new(201, json!({"id": "9"}));
        let registry = CacheRegistry::new();
        let route = RouteDescriptor::post("/todos")
            .host("http://provider.test")
            .cache_with(CachingOverride::new());
        let pipeline = RoutePipeline::compile(route, client.clone(), &registry, None).unwrap();

        assert!(!pipeline.is_cached());
        let reply = pipeline
            .handle(InboundRequest::new(HttpMethod::Post, "/todos").with_body(json!({"title": "t"})))
            .await
            .unwrap();

        assert_eq!(reply.cache, CacheStatus::Bypass);
        assert_eq!(client.last().body, Some(json!({"title": "t"})));
    }

    #[tokio::test]
    async fn test_body_validation_failure() {
        let client = RecordingClient::new(200, json!({}));
        let route = RouteDescriptor::post("/todos")
            .host("http://provider.test")
            .validate(Facet::Body, Arc::new(Shape::object([("id", Shape::string())])));
        let pipeline =
            RoutePipeline::compile(route, client.clone(), &CacheRegistry::new(), None).unwrap();

        let error = pipeline
            .handle(InboundRequest::new(HttpMethod::Post, "/todos").with_body(json!({})))
            .await
            .unwrap_err();

        assert_eq!(error.status_code().as_u16(), 400);
        let errors = error.field_errors().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "id");
        assert_eq!(errors[0].facet, Facet::Body);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_validated_values_feed_mapping() {
        let client = RecordingClient::new(200, json!([]));
        let route = RouteDescriptor::get("/todos")
            .host("http://provider.test")
            .validate(
                Facet::Query,
                Arc::new(Shape::object([("page", Shape::integer().coerce().default(1))])),
            )
            .map_query(MappingRule::fields([("page", forward())]));
        let pipeline =
            RoutePipeline::compile(route, client.clone(), &CacheRegistry::new(), None).unwrap();

        pipeline
            .handle(InboundRequest::new(HttpMethod::Get, "/todos").with_query("other", "x"))
            .await
            .unwrap();

        assert_eq!(client.last().url, "http://provider.test/todos?page=1");
    }

    #[tokio::test]
    async fn test_provider_error_propagates_status() {
        let client = RecordingClient::new(404, json!({"message": "Todo not found"}));
        let pipeline =
            RoutePipeline::compile(todo_route(), client, &CacheRegistry::new(), None).unwrap();

        let error = pipeline
            .handle(InboundRequest::new(HttpMethod::Get, "/todos/5").with_param("id", "5"))
            .await
            .unwrap_err();

        assert_eq!(error.status_code().as_u16(), 404);
        assert_eq!(error.public_message(), "Todo not found");
    }

    #[tokio::test]
    async fn test_upstream_contract_violation() {
        let client = RecordingClient::new(200, json!({"id": 5}));
        let route = todo_route()
            .provider_validation(Arc::new(Shape::object([("id", Shape::string())])));
        let pipeline =
            RoutePipeline::compile(route, client, &CacheRegistry::new(), None).unwrap();

        let error = pipeline
            .handle(InboundRequest::new(HttpMethod::Get, "/todos/5").with_param("id", "5"))
            .await
            .unwrap_err();

        assert_eq!(error.status_code().as_u16(), 421);
        assert_eq!(error.code(), crate::core::error::codes::UPSTREAM_CONTRACT_VIOLATION);
    }

    #[tokio::test]
    async fn test_response_mapping_then_validation() {
        let client = RecordingClient::new(200, json!({"id": "5", "title": "x", "userId": 1}));
        let route = todo_route()
            .map_response(MappingRule::fields([
                ("id", forward()),
                ("label", transform(|_| Ok(Some(json!("todo"))))),
            ]))
            .validate_response(Arc::new(Shape::object([
                ("id", Shape::string()),
                ("label", Shape::string()),
            ])));
        let pipeline =
            RoutePipeline::compile(route, client, &CacheRegistry::new(), None).unwrap();

        let reply = pipeline
            .handle(InboundRequest::new(HttpMethod::Get, "/todos/5").with_param("id", "5"))
            .await
            .unwrap();

        assert_eq!(reply.body, json!({"id": "5", "label": "todo"}));
    }

    #[test]
    fn test_compile_rejects_unsatisfiable_placeholders() {
        let client = RecordingClient::new(200, json!({}));
        let route = RouteDescriptor::get("/todos").host("x").path("/todos/:id");

        let error = RoutePipeline::compile(route, client, &CacheRegistry::new(), None).unwrap_err();
        assert_eq!(error.code(), crate::core::error::codes::BAD_CONFIGURATION);
    }
}

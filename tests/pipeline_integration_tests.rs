//! # Pipeline Integration Tests
//!
//! Route pipelines driven end to end against a `wiremock` provider through the
//! real `reqwest` client:
//! - outbound request composition (path, query, headers, body)
//! - caching across requests and across registries (persistent store)
//! - provider error propagation and upstream contract violations

use api_bff::caching::{
    CacheKind, CacheOptions, CacheRegistry, CacheStrategy, CachingOverride, KeyComposer,
};
use api_bff::core::config::{CachingConfig, HttpClientConfig};
use api_bff::core::error::codes;
use api_bff::http_client::ReqwestHttpClient;
use api_bff::mapping::{fixed, forward, from_header, from_query, rename, MappingRule};
use api_bff::validation::{JsonSchemaValidator, Shape};
use api_bff::{CacheStatus, Facet, HttpMethod, InboundRequest, RouteDescriptor, RoutePipeline};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> Arc<ReqwestHttpClient> {
    Arc::new(ReqwestHttpClient::new(&HttpClientConfig::default()).unwrap())
}

fn memory_caching() -> CachingConfig {
    CachingConfig {
        strategy: CacheKind::Memory,
        ttl: Some(Duration::from_secs(60)),
        ..CachingConfig::default()
    }
}

fn todo_route(host: &str) -> RouteDescriptor {
    RouteDescriptor::get("/todos/:id")
        .host(host)
        .map_params(MappingRule::fields([("id", forward())]))
        .map_headers(MappingRule::fields([("x-api-bff", fixed(true))]))
}

fn todo_request(id: &str) -> InboundRequest {
    InboundRequest::new(HttpMethod::Get, format!("/todos/{}", id)).with_param("id", id)
}

/// Cache writes are fire-and-forget; give the spawned task a moment
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn wait_for_entries(dir: &Path) {
    for _ in 0..50 {
        let written = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .any(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            })
            .unwrap_or(false);
        if written {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no cache entry written under {}", dir.display());
}

#[tokio::test]
async fn test_get_todo_is_forwarded_then_served_from_cache() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/todos/5"))
        .and(header("x-api-bff", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "5", "title": "x"})))
        .expect(1)
        .mount(&provider)
        .await;

    let registry = CacheRegistry::new();
    let caching = memory_caching();
    let pipeline =
        RoutePipeline::compile(todo_route(&provider.uri()), client(), &registry, Some(&caching))
            .unwrap();

    let first = pipeline.handle(todo_request("5")).await.unwrap();
    assert_eq!(first.status, 200);
    assert_eq!(first.body, json!({"id": "5", "title": "x"}));
    assert_eq!(first.cache, CacheStatus::Miss);

    settle().await;

    let second = pipeline.handle(todo_request("5")).await.unwrap();
    assert_eq!(second.cache, CacheStatus::Hit);
    assert_eq!(second.body, first.body);
}

#[tokio::test]
async fn test_query_headers_and_body_mapping() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/todos/7"))
        .and(query_param("teste", "a"))
        .and(query_param("teste2", "fixed value"))
        .and(query_param("teste3", "b"))
        .and(header("authorization", "Bearer t"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"id": "7", "auth": "Bearer t", "title": "write docs"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&provider)
        .await;

    let route = RouteDescriptor::post("/todos/:id")
        .host(provider.uri())
        .map_params(MappingRule::fields([("id", forward())]))
        .map_query(MappingRule::fields([
            ("teste", forward()),
            ("teste2", fixed("fixed value")),
            ("teste3", rename("from-another")),
        ]))
        .map_headers(MappingRule::fields([("authorization", forward())]))
        .map_body(MappingRule::fields([
            ("id", from_query("id")),
            ("auth", from_header("Authorization")),
            ("title", forward()),
        ]));
    let pipeline = RoutePipeline::compile(route, client(), &CacheRegistry::new(), None).unwrap();

    let request = InboundRequest::new(HttpMethod::Post, "/todos/7")
        .with_param("id", "7")
        .with_query("id", "7")
        .with_query("teste", "a")
        .with_query("from-another", "b")
        .with_query("dropped", "never forwarded")
        .with_header("Authorization", "Bearer t")
        .with_header("Cookie", "never forwarded")
        .with_body(json!({"title": "write docs", "extra": 1}));

    let reply = pipeline.handle(request).await.unwrap();
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, json!({"ok": true}));
    assert_eq!(reply.cache, CacheStatus::Bypass);
}

#[tokio::test]
async fn test_body_validation_rejects_before_calling_provider() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&provider)
        .await;

    let route = RouteDescriptor::post("/todos")
        .host(provider.uri())
        .validate(
            Facet::Body,
            Arc::new(
                JsonSchemaValidator::new(json!({
                    "type": "object",
                    "properties": {"id": {"type": "string"}},
                    "required": ["id"]
                }))
                .unwrap(),
            ),
        );
    let pipeline = RoutePipeline::compile(route, client(), &CacheRegistry::new(), None).unwrap();

    let error = pipeline
        .handle(InboundRequest::new(HttpMethod::Post, "/todos").with_body(json!({})))
        .await
        .unwrap_err();

    let response = error.to_error_response();
    assert_eq!(response.status_code, 400);
    assert_eq!(response.code, codes::BAD_REQUEST);
    let errors = response.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "id");
    assert_eq!(errors[0].facet, Facet::Body);
}

#[tokio::test]
async fn test_union_failures_are_grouped_per_path() {
    let provider = MockServer::start().await;

    let route = RouteDescriptor::post("/things")
        .host(provider.uri())
        .validate(
            Facet::Body,
            Arc::new(Shape::object([(
                "value",
                Shape::union([Shape::string(), Shape::number()]),
            )])),
        );
    let pipeline = RoutePipeline::compile(route, client(), &CacheRegistry::new(), None).unwrap();

    let error = tokio_test::assert_err!(
        pipeline
            .handle(InboundRequest::new(HttpMethod::Post, "/things").with_body(json!({"value": true})))
            .await
    );

    let errors = error.field_errors().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "value");
    assert!(errors[0].message.contains(" | "));
}

#[tokio::test]
async fn test_provider_error_is_propagated() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/todos/404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Todo not found"})))
        .mount(&provider)
        .await;

    let pipeline =
        RoutePipeline::compile(todo_route(&provider.uri()), client(), &CacheRegistry::new(), None)
            .unwrap();

    let error = pipeline.handle(todo_request("404")).await.unwrap_err();
    let response = error.to_error_response();
    assert_eq!(response.status_code, 404);
    assert_eq!(response.code, codes::PROVIDER);
    assert_eq!(response.message, "Todo not found");
}

#[tokio::test]
async fn test_provider_contract_violation_is_421() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/todos/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .mount(&provider)
        .await;

    let route = todo_route(&provider.uri())
        .provider_validation(Arc::new(Shape::object([("id", Shape::string())])));
    let registry = CacheRegistry::new();
    let caching = memory_caching();
    let pipeline = RoutePipeline::compile(route, client(), &registry, Some(&caching)).unwrap();

    let error = pipeline.handle(todo_request("1")).await.unwrap_err();
    let response = error.to_error_response();
    assert_eq!(response.status_code, 421);
    assert_eq!(response.code, codes::UPSTREAM_CONTRACT_VIOLATION);
    assert_eq!(response.errors.unwrap()[0].facet, Facet::Body);

    // Failed replies are never cached
    settle().await;
    let memory = registry.strategy(CacheKind::Memory);
    let options = CacheOptions::default();
    let key = format!("GET::{}/todos/1", provider.uri());
    assert_eq!(memory.get(&key, &options).await.unwrap(), None);
}

#[tokio::test]
async fn test_persistent_cache_survives_a_new_registry() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/todos/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "3"})))
        .expect(1)
        .mount(&provider)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let cache_dir = dir.path().join("cache");
    let caching = CachingConfig {
        strategy: CacheKind::Persistent,
        ttl: Some(Duration::from_secs(60)),
        path: cache_dir.clone(),
    };

    let first = RoutePipeline::compile(
        todo_route(&provider.uri()),
        client(),
        &CacheRegistry::new(),
        Some(&caching),
    )
    .unwrap();
    assert_eq!(first.handle(todo_request("3")).await.unwrap().cache, CacheStatus::Miss);
    wait_for_entries(&cache_dir).await;

    let restarted = RoutePipeline::compile(
        todo_route(&provider.uri()),
        client(),
        &CacheRegistry::new(),
        Some(&caching),
    )
    .unwrap();
    let reply = restarted.handle(todo_request("3")).await.unwrap();
    assert_eq!(reply.cache, CacheStatus::Hit);
    assert_eq!(reply.body, json!({"id": "3"}));
}

#[tokio::test]
async fn test_custom_key_composer_separates_callers() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "someone"})))
        .expect(2)
        .mount(&provider)
        .await;

    let by_caller = KeyComposer::new(|input| {
        format!(
            "{}::{}::{}",
            input.method,
            input.url,
            input.headers.get("authorization").map(String::as_str).unwrap_or("")
        )
    });
    let route = RouteDescriptor::get("/me")
        .host(provider.uri())
        .map_headers(MappingRule::fields([("authorization", forward())]))
        .cache_with(CachingOverride::new().key_composer(by_caller));
    let pipeline = RoutePipeline::compile(route, client(), &CacheRegistry::new(), None).unwrap();

    let as_caller = |token: &str| {
        InboundRequest::new(HttpMethod::Get, "/me").with_header("authorization", token)
    };

    pipeline.handle(as_caller("a")).await.unwrap();
    settle().await;
    assert_eq!(pipeline.handle(as_caller("a")).await.unwrap().cache, CacheStatus::Hit);
    assert_eq!(pipeline.handle(as_caller("b")).await.unwrap().cache, CacheStatus::Miss);
}

#[tokio::test]
async fn test_expired_entries_call_the_provider_again() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/todos/8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "8"})))
        .expect(2)
        .mount(&provider)
        .await;

    let route = todo_route(&provider.uri())
        .cache_with(CachingOverride::new().ttl(Duration::from_millis(100)));
    let pipeline = RoutePipeline::compile(route, client(), &CacheRegistry::new(), None).unwrap();

    pipeline.handle(todo_request("8")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(pipeline.handle(todo_request("8")).await.unwrap().cache, CacheStatus::Miss);
}

//! # API BFF - Main Entry Point
//!
//! Loads `api-bff.{json,yml,yaml,toml}` from the working directory (defaults when
//! none exists), initialises logging, registers the demo routes and serves them.
//!
//! Set `BFF_ADDR` to change the listen address (default `0.0.0.0:3000`).

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use api_bff::core::types::Facet;
use api_bff::mapping::{fixed, forward, from_header, from_query, rename, MappingRule};
use api_bff::observability::init_logging;
use api_bff::validation::Shape;
use api_bff::{BffConfig, BffServer, RouteDescriptor};

const DEFAULT_ADDR: &str = "0.0.0.0:3000";
const PLACEHOLDER_HOST: &str = "jsonplaceholder.typicode.com";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BffConfig::discover(".")
        .await
        .context("Failed to load API BFF configuration")?
        .map(Ok)
        .unwrap_or_else(|| BffConfig::from_value(serde_json::json!({})))
        .context("Invalid default configuration")?;

    init_logging(&config.logging);
    info!("Starting API BFF v{}", env!("CARGO_PKG_VERSION"));

    let addr: SocketAddr = std::env::var("BFF_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
        .context("Invalid BFF_ADDR")?;

    let server = BffServer::new(config)
        .context("Failed to create server")?
        .routes(demo_routes())
        .context("Failed to register routes")?;

    server.serve(addr).await?;

    info!("API BFF shutdown complete");
    Ok(())
}

/// Todo routes in front of the public JSONPlaceholder API
fn demo_routes() -> Vec<RouteDescriptor> {
    vec![
        RouteDescriptor::get("/placeholder/todos")
            .host(PLACEHOLDER_HOST)
            .path("/todos")
            .summary("List todos"),
        RouteDescriptor::get("/placeholder/todos/:id")
            .host(PLACEHOLDER_HOST)
            .path("/todos/:id")
            .map_params(MappingRule::fields([("id", forward())]))
            .map_headers(MappingRule::fields([
                ("x-api-bff", fixed(true)),
                ("authorization", forward()),
            ]))
            .map_query(MappingRule::fields([
                ("teste", forward()),
                ("teste2", fixed("fixed value")),
                ("teste3", rename("from-another")),
            ]))
            .summary("Get one todo"),
        RouteDescriptor::post("/placeholder/todos/:id")
            .host(PLACEHOLDER_HOST)
            .path("/todos/:id")
            .map_params(MappingRule::fields([("id", forward())]))
            .map_body(MappingRule::fields([
                ("id", from_query("id")),
                ("auth", from_header("authorization")),
                ("title", forward()),
            ]))
            .validate(
                Facet::Params,
                Arc::new(Shape::object([("id", Shape::string())])),
            )
            .validate(
                Facet::Body,
                Arc::new(Shape::object([
                    ("title", Shape::string()),
                    ("completed", Shape::boolean().optional()),
                ])),
            )
            .validate_response(Arc::new(Shape::object([("id", Shape::any())]).passthrough()))
            .summary("Update one todo")
            .possible_errors([404]),
    ]
}

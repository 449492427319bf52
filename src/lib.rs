//! # API BFF - Core Library Crate
//!
//! A declarative backend-for-frontend gateway. Every end-point is described by a
//! [`RouteDescriptor`]: which provider to call, how each request facet is validated
//! and mapped, how the provider reply is checked and reshaped, and how replies are
//! cached. The same descriptor also feeds the generated OpenAPI document.
//!
//! ## Module Overview
//! - `core`: errors, configuration and the request/response types shared by everything
//! - `mapping`: the field-mapping resolver
//! - `validation`: the schema capability and error formatting
//! - `caching`: cache strategies, their registry and key composition
//! - `http_client`: the outbound HTTP capability
//! - `routing`: descriptors, compiled pipelines and the route table
//! - `openapi`: documentation synthesis
//! - `gateway`: the axum server
//! - `observability`: logging setup

/// Errors, configuration and shared types
pub mod core;

/// Field-mapping resolver for request and response facets
pub mod mapping;

/// Schema validation and structured field errors
pub mod validation;

/// Pluggable response caching
pub mod caching;

/// Outbound HTTP client capability
pub mod http_client;

/// Route descriptors, pipelines and dispatch
pub mod routing;

/// OpenAPI document synthesis
pub mod openapi;

/// HTTP server
pub mod gateway;

/// Logging setup
pub mod observability;

pub use core::config::BffConfig;
pub use core::error::{BffError, BffResult, ErrorResponse, FieldError};
pub use core::types::{BffResponse, CacheStatus, Facet, HttpMethod, InboundRequest, RequestContext};
pub use gateway::server::BffServer;
pub use routing::{RouteDescriptor, RoutePipeline, RouteTable};

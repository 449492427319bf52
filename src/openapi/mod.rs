//! # API Documentation
//!
//! OpenAPI 3.0 document synthesised from route descriptors at startup.
//!
//! ## Key Features
//! - Typed document model from `openapiv3`
//! - Parameters, request bodies and responses derived from the descriptor's mapping
//!   and validation declarations ([`document`])
//! - Uniform error-response documentation for every operation

pub mod document;

pub use document::{
    error_response, error_response_schema, format_endpoint, operation, parameters, to_schema,
    DocumentBuilder, BASELINE_ERROR_STATUSES, OPENAPI_VERSION,
};

//! # Error Handling Module
//!
//! This module defines every failure the BFF can surface to a caller, using the
//! `thiserror` crate, together with the wire shape those failures serialise to.
//!
//! ## Error taxonomy
//! - `BadRequest`: a client-supplied facet (params, query, headers, body) failed validation
//! - `UpstreamContractViolation`: the provider reply failed provider-shape or final validation
//! - `Provider` / `HttpClient`: the upstream answered with a non-2xx status or could not be reached
//! - `NotFound`: no registered route matched the request
//! - `Configuration` / `Internal`: bugs in a route descriptor or unexpected failures
//!
//! Every variant maps onto an [`ErrorResponse`] through [`BffError::to_error_response`],
//! which is also what the axum `IntoResponse` implementation sends.
//!
//! ## Rust Concepts Used
//! - `Result<T, E>` with the `?` operator instead of exceptions
//! - `From` conversions so I/O and serde failures propagate with `?`
//! - Enum-based errors so callers must match every failure class

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::types::Facet;

/// Main result type used throughout the BFF
pub type BffResult<T> = Result<T, BffError>;

/// Stable error codes carried in every [`ErrorResponse`]
pub mod codes {
    pub const BAD_REQUEST: &str = "BFF-400";
    pub const NOT_FOUND: &str = "BFF-404";
    pub const UPSTREAM_CONTRACT_VIOLATION: &str = "BFF-421";
    pub const INTERNAL: &str = "BFF-500";
    pub const PROVIDER: &str = "BFF-502";
    pub const BAD_CONFIGURATION: &str = "BFF-0";
}

/// HTTP status used for upstream contract violations.
///
/// `421 Misdirected Request` keeps these failures distinguishable from the
/// client-side `400 Bad Request`.
pub const UPSTREAM_CONTRACT_VIOLATION_STATUS: StatusCode = StatusCode::MISDIRECTED_REQUEST;

/// One structured validation failure for a single field of a facet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted/bracket path of the offending field, e.g. `a.b[2].c` (empty for the root)
    pub path: String,

    /// Human readable message; several messages for one path are joined with `" | "`
    pub message: String,

    /// Facet the field belongs to
    pub facet: Facet,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>, facet: Facet) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            facet,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "[{}] {}", self.facet, self.message)
        } else {
            write!(f, "[{}] {}: {}", self.facet, self.path, self.message)
        }
    }
}

/// Client-facing error body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

/// Every error the request pipeline and its surroundings can produce
#[derive(Debug, Error, Clone)]
pub enum BffError {
    /// Client-supplied data failed validation
    #[error("Bad request: {}", join_errors(.errors))]
    BadRequest { errors: Vec<FieldError> },

    /// The provider reply failed provider-shape or final response validation
    #[error("The response from the server has data validation errors: {}", join_errors(.errors))]
    UpstreamContractViolation { errors: Vec<FieldError> },

    /// The provider answered with a non-successful status
    #[error("Provider responded with status {status}: {message}")]
    Provider { status: u16, message: String },

    /// The provider could not be reached at all
    #[error("HTTP client error: {message}")]
    HttpClient { message: String },

    /// No route matched the request
    #[error("The end-point was not found: [{method}] {path}")]
    NotFound { method: String, path: String },

    /// A route descriptor or the BFF configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl BffError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a bad request error from structured field errors
    pub fn bad_request(errors: Vec<FieldError>) -> Self {
        Self::BadRequest { errors }
    }

    /// Create an upstream contract violation from structured field errors
    pub fn upstream_contract(errors: Vec<FieldError>) -> Self {
        Self::UpstreamContractViolation { errors }
    }

    /// Create a provider error carrying the upstream status
    pub fn provider<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Provider {
            status,
            message: message.into(),
        }
    }

    /// Create a not found error for a method and path
    pub fn not_found<M: Into<String>, P: Into<String>>(method: M, path: P) -> Self {
        Self::NotFound {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::UpstreamContractViolation { .. } => UPSTREAM_CONTRACT_VIOLATION_STATUS,
            // Upstream statuses are propagated when they are real error statuses
            Self::Provider { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Self::HttpClient { .. } => StatusCode::BAD_GATEWAY,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Json { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for the response body
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => codes::BAD_REQUEST,
            Self::UpstreamContractViolation { .. } => codes::UPSTREAM_CONTRACT_VIOLATION,
            Self::Provider { .. } | Self::HttpClient { .. } => codes::PROVIDER,
            Self::NotFound { .. } => codes::NOT_FOUND,
            Self::Configuration { .. } => codes::BAD_CONFIGURATION,
            Self::Internal { .. } | Self::Io { .. } | Self::Json { .. } | Self::Yaml { .. } => {
                codes::INTERNAL
            }
        }
    }

    /// Structured field errors, when this error carries any
    pub fn field_errors(&self) -> Option<&[FieldError]> {
        match self {
            Self::BadRequest { errors } | Self::UpstreamContractViolation { errors } => {
                Some(errors)
            }
            _ => None,
        }
    }

    /// Message shown to clients.
    ///
    /// Internal details (I/O, serde, configuration) are never leaked to callers.
    pub fn public_message(&self) -> String {
        match self {
            Self::BadRequest { .. } => "The request has data validation errors".to_string(),
            Self::UpstreamContractViolation { .. } => {
                "The response from the server has data validation errors".to_string()
            }
            Self::Provider { message, .. } => message.clone(),
            Self::HttpClient { .. } => "The provider could not be reached".to_string(),
            Self::NotFound { .. } => "The end-point was not found".to_string(),
            Self::Configuration { .. }
            | Self::Internal { .. }
            | Self::Io { .. }
            | Self::Json { .. }
            | Self::Yaml { .. } => "Internal server error".to_string(),
        }
    }

    /// Serialisable client-facing representation
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            status_code: self.status_code().as_u16(),
            code: self.code().to_string(),
            message: self.public_message(),
            errors: self.field_errors().map(<[FieldError]>::to_vec),
        }
    }
}

/// Implement conversion from std::io::Error
impl From<std::io::Error> for BffError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Implement conversion from serde_json::Error
impl From<serde_json::Error> for BffError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

/// Implement conversion from serde_yaml::Error
impl From<serde_yaml::Error> for BffError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Implement conversion from reqwest::Error
impl From<reqwest::Error> for BffError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpClient {
            message: err.to_string(),
        }
    }
}

/// Convert `BffError` into an HTTP response carrying the [`ErrorResponse`] body
impl IntoResponse for BffError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self.to_error_response())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            BffError::bad_request(vec![]).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BffError::upstream_contract(vec![]).status_code().as_u16(),
            421
        );
        assert_eq!(
            BffError::not_found("GET", "/nope").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            BffError::internal("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_provider_status_propagation() {
        assert_eq!(BffError::provider(404, "missing").status_code().as_u16(), 404);
        assert_eq!(BffError::provider(503, "down").status_code().as_u16(), 503);
        // Non-error statuses fall back to a gateway failure
        assert_eq!(BffError::provider(302, "moved").status_code().as_u16(), 502);
        assert_eq!(BffError::provider(42, "weird").status_code().as_u16(), 502);
    }

    #[test]
    fn test_error_response_shape() {
        let error = BffError::bad_request(vec![FieldError::new("id", "Required", Facet::Body)]);
        let body = serde_json::to_value(error.to_error_response()).unwrap();

        assert_eq!(body["statusCode"], 400);
        assert_eq!(body["code"], "BFF-400");
        assert_eq!(body["errors"][0]["path"], "id");
        assert_eq!(body["errors"][0]["facet"], "body");
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let response = BffError::config("route /x has an unresolved placeholder").to_error_response();
        assert_eq!(response.code, codes::BAD_CONFIGURATION);
        assert_eq!(response.message, "Internal server error");
        assert!(response.errors.is_none());
    }
}

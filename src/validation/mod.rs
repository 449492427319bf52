//! # Validation Adapter
//!
//! Route descriptors carry opaque [`Schema`] capabilities per facet. The adapter calls
//! their single `validate` entry point and, on failure, turns the structured issues
//! into the flat `{path, message, facet}` error list clients receive.
//!
//! ## Key Features
//! - Uniform async `Schema` trait, so schema engines can suspend (remote lookups, etc.)
//! - Issues nested inside union alternatives are flattened into the same list
//! - Errors are deduplicated and grouped by path (see [`format`])
//! - Two engines ship with the crate: the [`Shape`] builder and [`JsonSchemaValidator`]
//!
//! ## Rust Concepts Used
//! - `async_trait` for object-safe async validation behind `Arc<dyn Schema>`
//! - Validated values are returned by value so callers always continue with the
//!   coerced/defaulted data

pub mod format;
pub mod json_schema;
pub mod shape;

pub use format::{aggregate, flatten_issues, format_path};
pub use json_schema::JsonSchemaValidator;
pub use shape::Shape;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::core::error::FieldError;
use crate::core::types::Facet;

/// One segment of the location of an issue inside a value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Structured issue reported by a schema engine.
///
/// `nested` holds the issues of union alternatives (or of any other composite check);
/// when present, the nested issues are reported instead of the wrapping one.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaIssue {
    pub path: Vec<PathSegment>,
    pub message: String,
    pub nested: Vec<SchemaIssue>,
}

impl SchemaIssue {
    pub fn new(path: Vec<PathSegment>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
            nested: Vec::new(),
        }
    }

    pub fn with_nested(mut self, nested: Vec<SchemaIssue>) -> Self {
        self.nested = nested;
        self
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = format_path(&self.path);
        if path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", path, self.message)
        }
    }
}

/// Schema capability attached to a facet of a route descriptor
#[async_trait]
pub trait Schema: Send + Sync + fmt::Debug {
    /// Validate `value`, returning the (possibly coerced or defaulted) value on success
    async fn validate(&self, value: Value) -> Result<Value, Vec<SchemaIssue>>;

    /// JSON Schema description used for API documentation, when the engine can produce one
    fn describe(&self) -> Option<Value> {
        None
    }
}

/// Shared schema handle as stored in route descriptors
pub type SharedSchema = Arc<dyn Schema>;

/// Validate one facet and convert failures into client-facing field errors.
///
/// The returned errors are already deduplicated and grouped by path.
pub async fn validate_facet(
    schema: &dyn Schema,
    data: Value,
    facet: Facet,
) -> Result<Value, Vec<FieldError>> {
    schema
        .validate(data)
        .await
        .map_err(|issues| aggregate(flatten_issues(&issues, facet)))
}

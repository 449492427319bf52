//! JSON Schema validation through the `jsonschema` crate.
//!
//! Lets route descriptors reuse contract schemas that already exist as JSON documents.
//! The same document doubles as the OpenAPI description of the facet.

use async_trait::async_trait;
use jsonschema::error::ValidationErrorKind;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::fmt;

use super::{PathSegment, Schema, SchemaIssue};
use crate::core::error::{BffError, BffResult};

/// Compiled JSON Schema document
pub struct JsonSchemaValidator {
    document: Value,
    compiled: JSONSchema,
}

impl JsonSchemaValidator {
    /// Compile a schema document; an invalid document is a configuration error
    pub fn new(document: Value) -> BffResult<Self> {
        let compiled = JSONSchema::compile(&document)
            .map_err(|e| BffError::config(format!("Invalid JSON schema: {}", e)))?;
        Ok(Self { document, compiled })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }
}

impl fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchemaValidator")
            .field("document", &self.document)
            .finish()
    }
}

/// Turn an instance pointer into path segments, using the instance to tell array
/// indices from numeric object keys.
fn to_path(instance: &Value, pointer: Vec<String>) -> Vec<PathSegment> {
    let mut current = Some(instance);
    pointer
        .into_iter()
        .map(|token| match current {
            Some(Value::Array(items)) => match token.parse::<usize>() {
                Ok(index) => {
                    current = items.get(index);
                    PathSegment::Index(index)
                }
                Err(_) => {
                    current = None;
                    PathSegment::Key(token)
                }
            },
            Some(node) => {
                current = node.get(&token);
                PathSegment::Key(token)
            }
            None => PathSegment::Key(token),
        })
        .collect()
}

#[async_trait]
impl Schema for JsonSchemaValidator {
    async fn validate(&self, value: Value) -> Result<Value, Vec<SchemaIssue>> {
        let issues: Vec<SchemaIssue> = match self.compiled.validate(&value) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|error| {
                    let mut path = to_path(&value, error.instance_path.clone().into_vec());
                    match &error.kind {
                        ValidationErrorKind::Required { property } => {
                            let name = property
                                .as_str()
                                .map(str::to_string)
                                .unwrap_or_else(|| property.to_string());
                            path.push(PathSegment::Key(name));
                            SchemaIssue::new(path, "Required")
                        }
                        _ => SchemaIssue::new(path, error.to_string()),
                    }
                })
                .collect(),
        };

        if issues.is_empty() {
            Ok(value)
        } else {
            Err(issues)
        }
    }

    fn describe(&self) -> Option<Value> {
        Some(self.document.clone())
    }
}

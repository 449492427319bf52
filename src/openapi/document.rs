//! Operation metadata derived from route descriptors.
//!
//! Documentation is read from the same descriptor the pipeline serves, so the
//! published contract cannot drift from the served one:
//! - parameters come from the declared mapping keys (typed as plain strings) and are
//!   overlaid by the properties of the facet's validation schema
//! - request body and success response schemas come from the body and final
//!   response validation schemas
//! - every operation documents the baseline errors (400, 421, 500) plus the route's
//!   declared ones, in ascending status order
//!
//! Validation engines describe themselves as JSON Schema documents; those are read
//! into the typed `openapiv3` model here.

use indexmap::IndexMap;
use openapiv3::{
    AnySchema, Content, HeaderStyle, Info, MediaType, ObjectType, OpenAPI, Operation, Parameter,
    ParameterData, ParameterSchemaOrContent, PathItem, PathStyle, Paths, QueryStyle, ReferenceOr,
    RequestBody, Response, Responses, Schema, SchemaData, SchemaKind, StatusCode, StringType, Type,
};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::debug;

use crate::core::config::OpenApiConfig;
use crate::core::types::{Facet, HttpMethod};
use crate::http_client::reason_phrase;
use crate::routing::RouteDescriptor;

/// OpenAPI version emitted by the document builder
pub const OPENAPI_VERSION: &str = "3.0.3";

/// Error statuses every operation can answer with
pub const BASELINE_ERROR_STATUSES: [u16; 3] = [400, 421, 500];

/// Request facets documented as parameters, in document order
const PARAMETER_FACETS: [Facet; 3] = [Facet::Params, Facet::Query, Facet::Headers];

/// `/todos/:id` rendered as `/todos/{id}`
pub fn format_endpoint(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{}}}", name),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Typed schema of a JSON Schema document.
///
/// Documents OpenAPI 3.0 cannot express are documented as "any".
pub fn to_schema(document: Value) -> Schema {
    serde_json::from_value(document).unwrap_or_else(|e| {
        debug!(error = %e, "Schema not expressible in OpenAPI 3.0, documenting as any");
        Schema {
            schema_data: SchemaData::default(),
            schema_kind: SchemaKind::Any(AnySchema::default()),
        }
    })
}

fn string_schema() -> Schema {
    Schema {
        schema_data: SchemaData::default(),
        schema_kind: SchemaKind::Type(Type::String(StringType::default())),
    }
}

fn object_schema() -> Schema {
    Schema {
        schema_data: SchemaData::default(),
        schema_kind: SchemaKind::Type(Type::Object(ObjectType::default())),
    }
}

/// `application/json` content carrying `schema`
fn json_content(schema: Schema) -> Content {
    let mut content = Content::new();
    content.insert(
        "application/json".to_string(),
        MediaType {
            schema: Some(ReferenceOr::Item(schema)),
            ..Default::default()
        },
    );
    content
}

fn parameter_data(name: &str, required: bool, schema: Schema) -> ParameterData {
    ParameterData {
        name: name.to_string(),
        description: None,
        required,
        deprecated: None,
        format: ParameterSchemaOrContent::Schema(ReferenceOr::Item(schema)),
        example: None,
        examples: IndexMap::new(),
        explode: None,
        extensions: IndexMap::new(),
    }
}

fn located(facet: Facet, parameter_data: ParameterData) -> Parameter {
    match facet {
        Facet::Params => Parameter::Path {
            parameter_data,
            style: PathStyle::Simple,
        },
        Facet::Headers => Parameter::Header {
            parameter_data,
            style: HeaderStyle::Simple,
        },
        Facet::Query | Facet::Body => Parameter::Query {
            parameter_data,
            allow_reserved: false,
            style: QueryStyle::Form,
            allow_empty_value: None,
        },
    }
}

/// Parameters of an operation, ordered path, query, header
pub fn parameters(descriptor: &RouteDescriptor) -> Vec<Parameter> {
    let endpoint_params: Vec<&str> = descriptor.endpoint_placeholders();

    PARAMETER_FACETS
        .into_iter()
        .flat_map(|facet| {
            let is_path = facet == Facet::Params;
            let mut by_name: IndexMap<String, ParameterData> = IndexMap::new();

            if is_path {
                for name in &endpoint_params {
                    by_name.insert(name.to_string(), parameter_data(name, true, string_schema()));
                }
            }

            if let Some(map) = descriptor
                .request
                .mapping
                .get(facet)
                .and_then(|rule| rule.field_map())
            {
                for name in map.keys() {
                    // Path parameters only exist where the end-point declares them
                    if is_path && !endpoint_params.contains(&name) {
                        continue;
                    }
                    by_name
                        .entry(name.to_string())
                        .or_insert_with(|| parameter_data(name, is_path, string_schema()));
                }
            }

            if let Some(schema) = descriptor
                .request
                .validation
                .get(facet)
                .and_then(|schema| schema.describe())
            {
                overlay_schema(&mut by_name, &schema, is_path);
            }

            by_name
                .into_values()
                .map(move |data| located(facet, data))
        })
        .collect()
}

/// Validation information wins over mapping-derived defaults
fn overlay_schema(by_name: &mut IndexMap<String, ParameterData>, schema: &Value, is_path: bool) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    let required: BTreeSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    for (name, property) in properties {
        let mut data = parameter_data(
            name,
            is_path || required.contains(name.as_str()),
            to_schema(property.clone()),
        );
        data.description = property
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        data.deprecated = property.get("deprecated").and_then(Value::as_bool);
        data.example = property.get("example").cloned();
        by_name.insert(name.clone(), data);
    }
}

/// JSON schema of the error body
pub fn error_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "statusCode": {"type": "integer"},
            "code": {"type": "string"},
            "message": {"type": "string"},
            "errors": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "message": {"type": "string"},
                        "facet": {"type": "string", "enum": ["params", "query", "headers", "body"]}
                    },
                    "required": ["path", "message", "facet"]
                }
            }
        },
        "required": ["statusCode", "code", "message"]
    })
}

/// Error response documented for `status`
pub fn error_response(status: u16) -> Response {
    let mut schema = error_response_schema();
    schema["properties"]["statusCode"]["example"] = json!(status);

    Response {
        description: reason_phrase(status),
        content: json_content(to_schema(schema)),
        ..Default::default()
    }
}

/// Operation metadata of one route
pub fn operation(descriptor: &RouteDescriptor) -> Operation {
    let documentation = &descriptor.documentation;

    let request_body = if descriptor.method.has_body() {
        let from_validation = descriptor
            .request
            .validation
            .get(Facet::Body)
            .and_then(|schema| schema.describe())
            .map(to_schema);
        let from_mapping = descriptor
            .request
            .mapping
            .get(Facet::Body)
            .and_then(|rule| rule.field_map())
            .map(|_| object_schema());

        from_validation.or(from_mapping).map(|schema| {
            ReferenceOr::Item(RequestBody {
                content: json_content(schema),
                required: true,
                ..Default::default()
            })
        })
    } else {
        None
    };

    let mut responses = IndexMap::new();
    let ok = descriptor
        .response
        .validation
        .as_ref()
        .and_then(|schema| schema.describe())
        .map(|schema| json_content(to_schema(schema)));
    responses.insert(
        StatusCode::Code(200),
        ReferenceOr::Item(Response {
            description: reason_phrase(200),
            content: ok.unwrap_or_default(),
            ..Default::default()
        }),
    );

    let errors: BTreeSet<u16> = BASELINE_ERROR_STATUSES
        .iter()
        .chain(documentation.possible_errors.iter())
        .copied()
        .collect();
    for status in errors {
        responses.insert(StatusCode::Code(status), ReferenceOr::Item(error_response(status)));
    }

    Operation {
        summary: documentation.summary.clone(),
        description: documentation.description.clone(),
        tags: documentation.tags.clone(),
        parameters: parameters(descriptor)
            .into_iter()
            .map(ReferenceOr::Item)
            .collect(),
        request_body,
        responses: Responses {
            responses,
            ..Default::default()
        },
        deprecated: documentation.deprecated,
        ..Default::default()
    }
}

/// Install the operation of `method`, replacing any previous one
fn set_operation(item: &mut PathItem, method: HttpMethod, operation: Operation) {
    let slot = match method {
        HttpMethod::Get => &mut item.get,
        HttpMethod::Post => &mut item.post,
        HttpMethod::Put => &mut item.put,
        HttpMethod::Patch => &mut item.patch,
        HttpMethod::Delete => &mut item.delete,
    };
    *slot = Some(operation);
}

/// Aggregates route operations into one document
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    config: OpenApiConfig,
    prefix: String,
    paths: IndexMap<String, PathItem>,
}

impl DocumentBuilder {
    /// `prefix` is prepended to every documented end-point
    pub fn new(config: OpenApiConfig, prefix: impl Into<String>) -> Self {
        Self {
            config,
            prefix: prefix.into(),
            paths: IndexMap::new(),
        }
    }

    pub fn add_route(&mut self, descriptor: &RouteDescriptor) -> &mut Self {
        let path = format!("{}{}", self.prefix, format_endpoint(&descriptor.endpoint));
        set_operation(
            self.paths.entry(path).or_default(),
            descriptor.method,
            operation(descriptor),
        );
        self
    }

    pub fn build(&self) -> OpenAPI {
        let config = &self.config;
        OpenAPI {
            openapi: OPENAPI_VERSION.to_string(),
            info: Info {
                title: config.title.clone(),
                version: config.version.clone(),
                description: config.description.clone(),
                terms_of_service: config.terms_of_service.clone(),
                contact: config.contact.clone(),
                license: config.license.clone(),
                ..Default::default()
            },
            paths: Paths {
                paths: self
                    .paths
                    .iter()
                    .map(|(path, item)| (path.clone(), ReferenceOr::Item(item.clone())))
                    .collect(),
                ..Default::default()
            },
            tags: config.tags.clone(),
            external_docs: config.external_docs.clone(),
            security: (!config.security.is_empty()).then(|| config.security.clone()),
            ..Default::default()
        }
    }
}

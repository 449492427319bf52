//! # Shape Schemas
//!
//! A small declarative schema builder for route descriptors:
//!
//! ```
//! use api_bff::validation::Shape;
//!
//! let todo = Shape::object([
//!     ("id", Shape::string().describe("Todo identifier")),
//!     ("done", Shape::boolean().default(false)),
//!     ("tags", Shape::array(Shape::string()).max(10.0).optional()),
//! ]);
//! ```
//!
//! Validation returns the parsed value: undeclared object keys are stripped (unless the
//! object is `passthrough`), defaults are filled in and `coerce`d scalars are converted
//! from their string form. Messages follow the familiar `Required` /
//! `Expected string, received number` wording.

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::{json, Map, Number, Value};

use super::{PathSegment, Schema, SchemaIssue};

/// Handling of object keys that are not declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownKeys {
    Strip,
    Passthrough,
    Strict,
}

#[derive(Debug, Clone)]
enum ShapeKind {
    String {
        min: Option<usize>,
        max: Option<usize>,
        pattern: Option<Regex>,
    },
    Number {
        integer: bool,
        min: Option<f64>,
        max: Option<f64>,
    },
    Boolean,
    Null,
    Literal(Value),
    Enum(Vec<String>),
    Any,
    Array {
        items: Box<Shape>,
        min: Option<usize>,
        max: Option<usize>,
    },
    Object {
        fields: IndexMap<String, Shape>,
        unknown: UnknownKeys,
    },
    Union(Vec<Shape>),
}

/// Declarative schema implementing [`Schema`]
#[derive(Debug, Clone)]
pub struct Shape {
    kind: ShapeKind,
    optional: bool,
    nullable: bool,
    coerce: bool,
    default: Option<Value>,
    description: Option<String>,
}

impl Shape {
    fn of(kind: ShapeKind) -> Self {
        Self {
            kind,
            optional: false,
            nullable: false,
            coerce: false,
            default: None,
            description: None,
        }
    }

    pub fn string() -> Self {
        Self::of(ShapeKind::String {
            min: None,
            max: None,
            pattern: None,
        })
    }

    pub fn number() -> Self {
        Self::of(ShapeKind::Number {
            integer: false,
            min: None,
            max: None,
        })
    }

    pub fn integer() -> Self {
        Self::of(ShapeKind::Number {
            integer: true,
            min: None,
            max: None,
        })
    }

    pub fn boolean() -> Self {
        Self::of(ShapeKind::Boolean)
    }

    pub fn null() -> Self {
        Self::of(ShapeKind::Null)
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::of(ShapeKind::Literal(value.into()))
    }

    /// One of a fixed set of strings
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::of(ShapeKind::Enum(values.into_iter().map(Into::into).collect()))
    }

    pub fn any() -> Self {
        Self::of(ShapeKind::Any)
    }

    pub fn array(items: Shape) -> Self {
        Self::of(ShapeKind::Array {
            items: Box::new(items),
            min: None,
            max: None,
        })
    }

    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Shape)>,
    {
        Self::of(ShapeKind::Object {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            unknown: UnknownKeys::Strip,
        })
    }

    /// First matching alternative wins; failures report every alternative's issues
    pub fn union<I: IntoIterator<Item = Shape>>(alternatives: I) -> Self {
        Self::of(ShapeKind::Union(alternatives.into_iter().collect()))
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Value used when the input is absent; implies optional
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Accept the string form of scalars (`"5"` for numbers, `"true"` for booleans)
    /// and the scalar form of strings.
    ///
    /// Path parameters, query values and headers always arrive as text.
    pub fn coerce(mut self) -> Self {
        self.coerce = true;
        self
    }

    /// Lower bound: length for strings, value for numbers, item count for arrays
    pub fn min(mut self, bound: f64) -> Self {
        match &mut self.kind {
            ShapeKind::String { min, .. } | ShapeKind::Array { min, .. } => {
                *min = Some(bound.max(0.0) as usize)
            }
            ShapeKind::Number { min, .. } => *min = Some(bound),
            _ => {}
        }
        self
    }

    /// Upper bound: length for strings, value for numbers, item count for arrays
    pub fn max(mut self, bound: f64) -> Self {
        match &mut self.kind {
            ShapeKind::String { max, .. } | ShapeKind::Array { max, .. } => {
                *max = Some(bound.max(0.0) as usize)
            }
            ShapeKind::Number { max, .. } => *max = Some(bound),
            _ => {}
        }
        self
    }

    /// Regular expression strings must match
    pub fn pattern(mut self, regex: Regex) -> Self {
        if let ShapeKind::String { pattern, .. } = &mut self.kind {
            *pattern = Some(regex);
        }
        self
    }

    /// Keep undeclared object keys
    pub fn passthrough(self) -> Self {
        self.unknown_keys(UnknownKeys::Passthrough)
    }

    /// Reject undeclared object keys
    pub fn strict(self) -> Self {
        self.unknown_keys(UnknownKeys::Strict)
    }

    fn unknown_keys(mut self, policy: UnknownKeys) -> Self {
        if let ShapeKind::Object { unknown, .. } = &mut self.kind {
            *unknown = policy;
        }
        self
    }

    fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }

    /// Check a possibly absent value, returning the parsed value (absent stays absent)
    fn check(
        &self,
        value: Option<&Value>,
        path: &mut Vec<PathSegment>,
        issues: &mut Vec<SchemaIssue>,
    ) -> Option<Value> {
        let value = match value {
            Some(value) => value,
            None => {
                if let Some(default) = &self.default {
                    return Some(default.clone());
                }
                if !self.optional {
                    issues.push(SchemaIssue::new(path.clone(), "Required"));
                }
                return None;
            }
        };

        if value.is_null() && self.nullable {
            return Some(Value::Null);
        }

        let value = if self.coerce {
            self.coerced(value)
        } else {
            value.clone()
        };

        self.check_kind(value, path, issues)
    }

    fn coerced(&self, value: &Value) -> Value {
        match (&self.kind, value) {
            (ShapeKind::Number { integer, .. }, Value::String(text)) => {
                let trimmed = text.trim();
                if *integer {
                    if let Ok(n) = trimmed.parse::<i64>() {
                        return json!(n);
                    }
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| value.clone())
            }
            (ShapeKind::Boolean, Value::String(text)) => match text.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => value.clone(),
            },
            (ShapeKind::String { .. } | ShapeKind::Enum(_), Value::Number(n)) => {
                Value::String(n.to_string())
            }
            (ShapeKind::String { .. }, Value::Bool(flag)) => Value::String(flag.to_string()),
            _ => value.clone(),
        }
    }

    fn check_kind(
        &self,
        value: Value,
        path: &mut Vec<PathSegment>,
        issues: &mut Vec<SchemaIssue>,
    ) -> Option<Value> {
        match &self.kind {
            ShapeKind::Any => Some(value),

            ShapeKind::String { min, max, pattern } => {
                let Value::String(text) = &value else {
                    issues.push(type_issue(path, "string", &value));
                    return None;
                };
                let length = text.chars().count();
                if let Some(min) = min.filter(|min| length < *min) {
                    issues.push(SchemaIssue::new(
                        path.clone(),
                        format!("String must contain at least {} character(s)", min),
                    ));
                }
                if let Some(max) = max.filter(|max| length > *max) {
                    issues.push(SchemaIssue::new(
                        path.clone(),
                        format!("String must contain at most {} character(s)", max),
                    ));
                }
                if let Some(pattern) = pattern.as_ref().filter(|p| !p.is_match(text)) {
                    issues.push(SchemaIssue::new(
                        path.clone(),
                        format!("Invalid: must match {}", pattern.as_str()),
                    ));
                }
                Some(value)
            }

            ShapeKind::Number { integer, min, max } => {
                let Some(number) = value.as_f64() else {
                    let expected = if *integer { "integer" } else { "number" };
                    issues.push(type_issue(path, expected, &value));
                    return None;
                };
                if *integer && number.fract() != 0.0 {
                    issues.push(SchemaIssue::new(
                        path.clone(),
                        "Expected integer, received float",
                    ));
                }
                if let Some(min) = min.filter(|min| number < *min) {
                    issues.push(SchemaIssue::new(
                        path.clone(),
                        format!("Number must be greater than or equal to {}", min),
                    ));
                }
                if let Some(max) = max.filter(|max| number > *max) {
                    issues.push(SchemaIssue::new(
                        path.clone(),
                        format!("Number must be less than or equal to {}", max),
                    ));
                }
                Some(value)
            }

            ShapeKind::Boolean => {
                if !value.is_boolean() {
                    issues.push(type_issue(path, "boolean", &value));
                    return None;
                }
                Some(value)
            }

            ShapeKind::Null => {
                if !value.is_null() {
                    issues.push(type_issue(path, "null", &value));
                    return None;
                }
                Some(value)
            }

            ShapeKind::Literal(expected) => {
                if &value != expected {
                    issues.push(SchemaIssue::new(
                        path.clone(),
                        format!("Invalid literal value, expected {}", expected),
                    ));
                    return None;
                }
                Some(value)
            }

            ShapeKind::Enum(options) => {
                let accepted = value
                    .as_str()
                    .map(|text| options.iter().any(|option| option == text))
                    .unwrap_or(false);
                if !accepted {
                    let expected = options
                        .iter()
                        .map(|option| format!("'{}'", option))
                        .collect::<Vec<_>>()
                        .join(" | ");
                    issues.push(SchemaIssue::new(
                        path.clone(),
                        format!("Invalid enum value. Expected {}, received {}", expected, value),
                    ));
                    return None;
                }
                Some(value)
            }

            ShapeKind::Array { items, min, max } => {
                let elements = match value {
                    Value::Array(elements) => elements,
                    other => {
                        issues.push(type_issue(path, "array", &other));
                        return None;
                    }
                };
                if let Some(min) = min.filter(|min| elements.len() < *min) {
                    issues.push(SchemaIssue::new(
                        path.clone(),
                        format!("Array must contain at least {} element(s)", min),
                    ));
                }
                if let Some(max) = max.filter(|max| elements.len() > *max) {
                    issues.push(SchemaIssue::new(
                        path.clone(),
                        format!("Array must contain at most {} element(s)", max),
                    ));
                }
                let mut parsed = Vec::with_capacity(elements.len());
                for (index, element) in elements.iter().enumerate() {
                    path.push(PathSegment::Index(index));
                    // Absent array items do not exist; a parse failure keeps the slot
                    let item = items.check(Some(element), path, issues);
                    path.pop();
                    parsed.push(item.unwrap_or(Value::Null));
                }
                Some(Value::Array(parsed))
            }

            ShapeKind::Object { fields, unknown } => {
                let mut input = match value {
                    Value::Object(input) => input,
                    other => {
                        issues.push(type_issue(path, "object", &other));
                        return None;
                    }
                };
                let mut parsed = Map::new();
                for (key, shape) in fields {
                    path.push(PathSegment::Key(key.clone()));
                    let field = input.remove(key);
                    if let Some(field) = shape.check(field.as_ref(), path, issues) {
                        parsed.insert(key.clone(), field);
                    }
                    path.pop();
                }
                match unknown {
                    UnknownKeys::Strip => {}
                    UnknownKeys::Passthrough => parsed.extend(input),
                    UnknownKeys::Strict if !input.is_empty() => {
                        let keys = input
                            .keys()
                            .map(|key| format!("'{}'", key))
                            .collect::<Vec<_>>()
                            .join(", ");
                        issues.push(SchemaIssue::new(
                            path.clone(),
                            format!("Unrecognized key(s) in object: {}", keys),
                        ));
                    }
                    UnknownKeys::Strict => {}
                }
                Some(Value::Object(parsed))
            }

            ShapeKind::Union(alternatives) => {
                let mut nested = Vec::new();
                for alternative in alternatives {
                    let mut attempt = Vec::new();
                    let parsed = alternative.check(Some(&value), path, &mut attempt);
                    if attempt.is_empty() {
                        return parsed;
                    }
                    nested.extend(attempt);
                }
                issues.push(SchemaIssue::new(path.clone(), "Invalid input").with_nested(nested));
                None
            }
        }
    }

    /// JSON Schema (OpenAPI 3.0 flavoured) rendering of this shape
    pub fn to_json_schema(&self) -> Value {
        let mut schema = match &self.kind {
            ShapeKind::Any => json!({}),
            ShapeKind::String { min, max, pattern } => {
                let mut schema = json!({"type": "string"});
                if let Some(min) = min {
                    schema["minLength"] = json!(min);
                }
                if let Some(max) = max {
                    schema["maxLength"] = json!(max);
                }
                if let Some(pattern) = pattern {
                    schema["pattern"] = json!(pattern.as_str());
                }
                schema
            }
            ShapeKind::Number { integer, min, max } => {
                let kind = if *integer { "integer" } else { "number" };
                let mut schema = json!({ "type": kind });
                if let Some(min) = min {
                    schema["minimum"] = json!(min);
                }
                if let Some(max) = max {
                    schema["maximum"] = json!(max);
                }
                schema
            }
            ShapeKind::Boolean => json!({"type": "boolean"}),
            ShapeKind::Null => json!({"nullable": true, "enum": [null]}),
            ShapeKind::Literal(value) => json!({"enum": [value]}),
            ShapeKind::Enum(options) => json!({"type": "string", "enum": options}),
            ShapeKind::Array { items, min, max } => {
                let mut schema = json!({"type": "array", "items": items.to_json_schema()});
                if let Some(min) = min {
                    schema["minItems"] = json!(min);
                }
                if let Some(max) = max {
                    schema["maxItems"] = json!(max);
                }
                schema
            }
            ShapeKind::Object { fields, unknown } => {
                let properties: Map<String, Value> = fields
                    .iter()
                    .map(|(key, shape)| (key.clone(), shape.to_json_schema()))
                    .collect();
                let required: Vec<&String> = fields
                    .iter()
                    .filter(|(_, shape)| shape.is_required())
                    .map(|(key, _)| key)
                    .collect();
                let mut schema = json!({"type": "object", "properties": properties});
                if !required.is_empty() {
                    schema["required"] = json!(required);
                }
                if *unknown == UnknownKeys::Strict {
                    schema["additionalProperties"] = json!(false);
                }
                schema
            }
            ShapeKind::Union(alternatives) => {
                let any_of: Vec<Value> = alternatives.iter().map(Shape::to_json_schema).collect();
                json!({ "anyOf": any_of })
            }
        };

        if self.nullable {
            schema["nullable"] = json!(true);
        }
        if let Some(default) = &self.default {
            schema["default"] = default.clone();
        }
        if let Some(description) = &self.description {
            schema["description"] = json!(description);
        }
        schema
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_issue(path: &[PathSegment], expected: &str, value: &Value) -> SchemaIssue {
    SchemaIssue::new(
        path.to_vec(),
        format!("Expected {}, received {}", expected, type_name(value)),
    )
}

#[async_trait]
impl Schema for Shape {
    async fn validate(&self, value: Value) -> Result<Value, Vec<SchemaIssue>> {
        let mut issues = Vec::new();
        let mut path = Vec::new();
        // A missing facet arrives as null and is treated as absent
        let input = if value.is_null() && !self.nullable {
            None
        } else {
            Some(&value)
        };
        let parsed = self.check(input, &mut path, &mut issues);

        if issues.is_empty() {
            Ok(parsed.unwrap_or(Value::Null))
        } else {
            Err(issues)
        }
    }

    fn describe(&self) -> Option<Value> {
        Some(self.to_json_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(shape: &Shape, value: Value) -> Result<Value, Vec<String>> {
        shape.validate(value).await.map_err(|issues| {
            crate::validation::flatten_issues(&issues, crate::core::types::Facet::Body)
                .into_iter()
                .map(|e| format!("{}: {}", e.path, e.message))
                .collect()
        })
    }

    #[tokio::test]
    async fn test_object_strips_unknown_keys_and_applies_defaults() {
        let shape = Shape::object([
            ("id", Shape::string()),
            ("done", Shape::boolean().default(false)),
            ("note", Shape::string().optional()),
        ]);

        let parsed = run(&shape, json!({"id": "1", "secret": 1})).await.unwrap();
        assert_eq!(parsed, json!({"id": "1", "done": false}));
    }

    #[tokio::test]
    async fn test_type_and_required_messages() {
        let shape = Shape::object([
            ("id", Shape::string()),
            ("count", Shape::integer()),
            ("items", Shape::array(Shape::object([("name", Shape::string())]))),
        ]);

        let errors = run(
            &shape,
            json!({"count": 1.5, "items": [{"name": "a"}, {"name": 3}]}),
        )
        .await
        .unwrap_err();

        assert_eq!(
            errors,
            vec![
                "id: Required".to_string(),
                "count: Expected integer, received float".to_string(),
                "items[1].name: Expected string, received number".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_coercion_from_text() {
        let shape = Shape::object([
            ("page", Shape::integer().coerce().min(1.0)),
            ("flag", Shape::boolean().coerce()),
            ("ratio", Shape::number().coerce()),
        ]);

        let parsed = run(&shape, json!({"page": "3", "flag": "true", "ratio": "0.5"}))
            .await
            .unwrap();
        assert_eq!(parsed, json!({"page": 3, "flag": true, "ratio": 0.5}));

        let errors = run(&shape, json!({"page": "0", "flag": "yes", "ratio": "x"}))
            .await
            .unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0], "page: Number must be greater than or equal to 1");
    }

    #[tokio::test]
    async fn test_strict_and_passthrough_objects() {
        let strict = Shape::object([("a", Shape::any())]).strict();
        let errors = run(&strict, json!({"a": 1, "b": 2})).await.unwrap_err();
        assert_eq!(errors, vec![": Unrecognized key(s) in object: 'b'".to_string()]);

        let open = Shape::object([("a", Shape::any())]).passthrough();
        assert_eq!(
            run(&open, json!({"a": 1, "b": 2})).await.unwrap(),
            json!({"a": 1, "b": 2})
        );
    }

    #[tokio::test]
    async fn test_union_picks_first_match() {
        let shape = Shape::union([Shape::literal("all"), Shape::integer().coerce()]);
        assert_eq!(run(&shape, json!("all")).await.unwrap(), json!("all"));
        assert_eq!(run(&shape, json!("7")).await.unwrap(), json!(7));
    }

    #[tokio::test]
    async fn test_missing_root_is_required_unless_optional() {
        let shape = Shape::object([("id", Shape::string())]);
        assert_eq!(
            run(&shape, Value::Null).await.unwrap_err(),
            vec![": Required".to_string()]
        );

        let optional = Shape::object([("id", Shape::string())]).optional();
        assert_eq!(run(&optional, Value::Null).await.unwrap(), Value::Null);
    }

    #[test]
    fn test_json_schema_rendering() {
        let shape = Shape::object([
            ("id", Shape::string().describe("Identifier")),
            ("tags", Shape::array(Shape::string()).optional()),
            ("kind", Shape::enumeration(["a", "b"]).default("a")),
        ]);

        let schema = shape.to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["id"]));
        assert_eq!(schema["properties"]["id"]["description"], "Identifier");
        assert_eq!(schema["properties"]["tags"]["items"]["type"], "string");
        assert_eq!(schema["properties"]["kind"]["default"], "a");
    }
}

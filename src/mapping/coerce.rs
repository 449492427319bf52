//! Facet-level mapping and coercion.
//!
//! Path parameters, query strings and headers are text on the wire, so after mapping
//! those facets are coerced into ordered string maps:
//! - `null` values are omitted
//! - arrays are joined (`","` for params and query, `", "` for headers)
//! - nested objects are written as compact JSON
//!
//! Bodies stay structured JSON.

use indexmap::IndexMap;
use serde_json::Value;

use super::{resolve, RequestMapping};
use crate::core::error::BffResult;
use crate::core::types::RequestContext;

const LIST_SEPARATOR: &str = ",";
const HEADER_LIST_SEPARATOR: &str = ", ";

/// Map the path parameters.
///
/// Without a rule, inbound parameters pass through so templates such as
/// `/todos/:id` resolve from a route mounted at `/todos/:id`.
pub async fn map_params(
    rule: Option<&RequestMapping>,
    context: &RequestContext,
) -> BffResult<IndexMap<String, String>> {
    let mapped = match rule {
        Some(rule) => resolve(rule, context.params.clone(), context).await?,
        None => context.params.clone(),
    };
    Ok(to_string_map(&mapped, LIST_SEPARATOR))
}

/// Map the query string; nothing is forwarded without a rule
pub async fn map_query(
    rule: Option<&RequestMapping>,
    context: &RequestContext,
) -> BffResult<IndexMap<String, String>> {
    match rule {
        Some(rule) => {
            let mapped = resolve(rule, context.query.clone(), context).await?;
            Ok(to_string_map(&mapped, LIST_SEPARATOR))
        }
        None => Ok(IndexMap::new()),
    }
}

/// Map the headers; nothing is forwarded without a rule
pub async fn map_headers(
    rule: Option<&RequestMapping>,
    context: &RequestContext,
) -> BffResult<IndexMap<String, String>> {
    match rule {
        Some(rule) => {
            let mapped = resolve(rule, context.headers.clone(), context).await?;
            Ok(to_string_map(&mapped, HEADER_LIST_SEPARATOR))
        }
        None => Ok(IndexMap::new()),
    }
}

/// Map the body; without a rule the validated body passes through unchanged
pub async fn map_body(rule: Option<&RequestMapping>, context: &RequestContext) -> BffResult<Value> {
    match rule {
        Some(rule) => resolve(rule, context.body.clone(), context).await,
        None => Ok(context.body.clone()),
    }
}

/// Coerce a mapped facet into an ordered map of strings.
///
/// Anything that is not a JSON object coerces to an empty map.
pub fn to_string_map(value: &Value, separator: &str) -> IndexMap<String, String> {
    let Value::Object(fields) = value else {
        return IndexMap::new();
    };

    fields
        .iter()
        .filter_map(|(key, value)| coerce_value(value, separator).map(|text| (key.clone(), text)))
        .collect()
}

fn coerce_value(value: &Value, separator: &str) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| coerce_value(item, separator))
                .collect::<Vec<_>>()
                .join(separator),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{HttpMethod, InboundRequest};
    use crate::mapping::{fixed, forward, MappingRule};
    use serde_json::json;

    fn context() -> RequestContext {
        RequestContext::from_request(
            InboundRequest::new(HttpMethod::Get, "/todos/5")
                .with_param("id", "5")
                .with_query("page", "2")
                .with_header("accept", "application/json")
                .with_body(json!({"a": 1})),
        )
    }

    #[test]
    fn test_string_coercion() {
        let value = json!({
            "s": "text",
            "n": 5,
            "b": true,
            "none": null,
            "list": ["a", 1, null, false],
            "obj": {"k": "v"}
        });

        let map = to_string_map(&value, ",");
        assert_eq!(map.get("s").map(String::as_str), Some("text"));
        assert_eq!(map.get("n").map(String::as_str), Some("5"));
        assert_eq!(map.get("b").map(String::as_str), Some("true"));
        assert!(!map.contains_key("none"));
        assert_eq!(map.get("list").map(String::as_str), Some("a,1,false"));
        assert_eq!(map.get("obj").map(String::as_str), Some(r#"{"k":"v"}"#));

        let headers = to_string_map(&json!({"accept": ["a", "b"]}), ", ");
        assert_eq!(headers.get("accept").map(String::as_str), Some("a, b"));

        assert!(to_string_map(&json!("scalar"), ",").is_empty());
    }

    #[tokio::test]
    async fn test_defaults_without_rules() {
        let context = context();

        let params = map_params(None, &context).await.unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("5"));
        assert!(map_query(None, &context).await.unwrap().is_empty());
        assert!(map_headers(None, &context).await.unwrap().is_empty());
        assert_eq!(map_body(None, &context).await.unwrap(), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_header_rule_coerces_constants() {
        let rule: RequestMapping =
            MappingRule::fields([("x-api-bff", fixed(true)), ("accept", forward())]);

        let headers = map_headers(Some(&rule), &context()).await.unwrap();
        assert_eq!(headers.get("x-api-bff").map(String::as_str), Some("true"));
        assert_eq!(
            headers.get("accept").map(String::as_str),
            Some("application/json")
        );
    }
}

//! # Field-Mapping Resolver
//!
//! This module maps a source facet (params, query, headers, body, or a provider
//! reply body) into the target facet sent upstream or returned to the caller.
//!
//! ## Mapping rules
//! A facet's rule is either wholly functional or wholly a field map, never both:
//! - [`MappingRule::Whole`]: one function receives the raw facet and the context; its
//!   result replaces the facet wholesale (no merge)
//! - [`MappingRule::Fields`]: a projection where every declared output key resolves
//!   independently through a [`FieldRule`]
//!
//! Field rules of one facet are fanned out together and joined before the facet is
//! considered resolved. A field resolving to nothing is omitted from the output, and
//! keys absent from the field map are dropped.
//!
//! ## Rust Concepts Used
//! - The context type `C` is generic: request-side rules receive the shared
//!   [`RequestContext`](crate::core::types::RequestContext), response-side rules receive `()`
//! - `Arc<dyn Fn ..>` so compiled routes can share rules across concurrent requests
//! - Functions return `'static` boxed futures; anything borrowed from the value or the
//!   context is copied out before the future is built

pub mod coerce;
pub mod rules;

pub use coerce::{map_body, map_headers, map_params, map_query, to_string_map};
pub use rules::{
    computed, computed_async, env, fixed, forward, from_body, from_body_with, from_header,
    from_header_with, from_param, from_param_with, from_query, from_query_with, rename,
    transform,
};

use futures::future::{self, BoxFuture, FutureExt};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::core::error::BffResult;
use crate::core::types::RequestContext;

/// Boxed future returned by mapping functions
pub type MappingFuture<T> = BoxFuture<'static, BffResult<T>>;

/// Per-field function: `(source field value, context) -> value | absent`
pub type FieldFn<C> = Arc<dyn Fn(Option<&Value>, &C) -> MappingFuture<Option<Value>> + Send + Sync>;

/// Whole-facet function: `(facet value, context) -> facet value'`
pub type FacetFn<C> = Arc<dyn Fn(Value, &C) -> MappingFuture<Value> + Send + Sync>;

/// Mapping rules applied to inbound request facets
pub type RequestMapping = MappingRule<RequestContext>;

/// Mapping rules applied to provider replies; functions see only the value
pub type ResponseMapping = MappingRule<()>;

/// How a single output field is produced
pub enum FieldRule<C> {
    /// Copy the source field with the same name
    Forward,

    /// Copy a differently-named source field
    Rename(String),

    /// Constant, independent of the input
    Constant(Value),

    /// Computed from the source field value and the context
    Compute(FieldFn<C>),
}

impl<C> Clone for FieldRule<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Forward => Self::Forward,
            Self::Rename(source) => Self::Rename(source.clone()),
            Self::Constant(value) => Self::Constant(value.clone()),
            Self::Compute(f) => Self::Compute(Arc::clone(f)),
        }
    }
}

impl<C> fmt::Debug for FieldRule<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => f.write_str("Forward"),
            Self::Rename(source) => f.debug_tuple("Rename").field(source).finish(),
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Compute(_) => f.write_str("Compute(<fn>)"),
        }
    }
}

/// Ordered set of output fields and the rule producing each
pub struct FieldMap<C> {
    fields: IndexMap<String, FieldRule<C>>,
}

impl<C> FieldMap<C> {
    pub fn new() -> Self {
        Self {
            fields: IndexMap::new(),
        }
    }

    /// Declare an output field
    pub fn field(mut self, name: impl Into<String>, rule: FieldRule<C>) -> Self {
        self.fields.insert(name.into(), rule);
        self
    }

    /// Declared output keys, in declaration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Rule producing output field `name`
    pub fn get(&self, name: &str) -> Option<&FieldRule<C>> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<C> Default for FieldMap<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for FieldMap<C> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
        }
    }
}

impl<C> fmt::Debug for FieldMap<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.fields.iter()).finish()
    }
}

impl<C, K: Into<String>> FromIterator<(K, FieldRule<C>)> for FieldMap<C> {
    fn from_iter<I: IntoIterator<Item = (K, FieldRule<C>)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Mapping rule for one facet
pub enum MappingRule<C> {
    /// Whole-facet function; its result replaces the facet
    Whole(FacetFn<C>),

    /// Per-field projection
    Fields(FieldMap<C>),
}

impl<C> Clone for MappingRule<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Whole(f) => Self::Whole(Arc::clone(f)),
            Self::Fields(map) => Self::Fields(map.clone()),
        }
    }
}

impl<C> fmt::Debug for MappingRule<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whole(_) => f.write_str("Whole(<fn>)"),
            Self::Fields(map) => f.debug_tuple("Fields").field(map).finish(),
        }
    }
}

impl<C: 'static> MappingRule<C> {
    /// Build a field-map rule from `(output key, rule)` pairs
    pub fn fields<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, FieldRule<C>)>,
    {
        Self::Fields(fields.into_iter().collect())
    }

    /// Synchronous whole-facet function
    pub fn whole<F>(f: F) -> Self
    where
        F: Fn(Value, &C) -> BffResult<Value> + Send + Sync + 'static,
    {
        Self::Whole(Arc::new(move |value, context| {
            future::ready(f(value, context)).boxed()
        }))
    }

    /// Asynchronous whole-facet function
    pub fn whole_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, &C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BffResult<Value>> + Send + 'static,
    {
        Self::Whole(Arc::new(move |value, context| f(value, context).boxed()))
    }

    /// Field map, when this rule is one
    pub fn field_map(&self) -> Option<&FieldMap<C>> {
        match self {
            Self::Fields(map) => Some(map),
            Self::Whole(_) => None,
        }
    }
}

/// Resolve a mapping rule against a source facet value.
///
/// Field resolutions of a field map run concurrently and are joined before returning;
/// the first failing field fails the whole facet.
pub async fn resolve<C>(rule: &MappingRule<C>, source: Value, context: &C) -> BffResult<Value> {
    match rule {
        MappingRule::Whole(f) => f(source, context).await,
        MappingRule::Fields(map) => resolve_fields(map, &source, context).await,
    }
}

async fn resolve_fields<C>(map: &FieldMap<C>, source: &Value, context: &C) -> BffResult<Value> {
    let pending = map.fields.iter().map(|(key, rule)| {
        let resolution: MappingFuture<Option<Value>> = match rule {
            FieldRule::Forward => future::ok(source.get(key).cloned()).boxed(),
            FieldRule::Rename(from) => future::ok(source.get(from).cloned()).boxed(),
            FieldRule::Constant(value) => future::ok(Some(value.clone())).boxed(),
            FieldRule::Compute(f) => f(source.get(key), context),
        };
        resolution.map(move |result| result.map(|value| (key.clone(), value)))
    });

    let resolved = future::try_join_all(pending).await?;

    // Absent results are omitted, never written as null
    let output: Map<String, Value> = resolved
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect();

    Ok(Value::Object(output))
}

//! Helper constructors for [`FieldRule`]s.
//!
//! Route descriptors read better as `("id", forward())` or `("x-api-bff", fixed(true))`
//! than as raw enum variants; these helpers also box user closures into the shared
//! `Arc<dyn Fn ..>` form the resolver expects.

use futures::future::{self, FutureExt};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use super::FieldRule;
use crate::core::error::BffResult;
use crate::core::types::{Facet, RequestContext};

/// Copy the same-named field from the source facet
pub fn forward<C>() -> FieldRule<C> {
    FieldRule::Forward
}

/// Copy a differently-named field from the source facet
pub fn rename<C>(source: impl Into<String>) -> FieldRule<C> {
    FieldRule::Rename(source.into())
}

/// Constant value, independent of the input
pub fn fixed<C>(value: impl Into<Value>) -> FieldRule<C> {
    FieldRule::Constant(value.into())
}

/// Value of an environment variable, read every time the field resolves.
///
/// An unset variable resolves to nothing and the field is omitted.
pub fn env<C: 'static>(name: impl Into<String>) -> FieldRule<C> {
    let name = name.into();
    computed(move |_, _| Ok(std::env::var(&name).ok().map(Value::String)))
}

/// Synchronous function of the source field value and the context
pub fn computed<C, F>(f: F) -> FieldRule<C>
where
    C: 'static,
    F: Fn(Option<&Value>, &C) -> BffResult<Option<Value>> + Send + Sync + 'static,
{
    FieldRule::Compute(Arc::new(move |value, context| {
        future::ready(f(value, context)).boxed()
    }))
}

/// Asynchronous function of the source field value and the context.
///
/// The returned future must own its data; clone what it needs out of the arguments.
pub fn computed_async<C, F, Fut>(f: F) -> FieldRule<C>
where
    C: 'static,
    F: Fn(Option<&Value>, &C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BffResult<Option<Value>>> + Send + 'static,
{
    FieldRule::Compute(Arc::new(move |value, context| f(value, context).boxed()))
}

/// Response-side function that only sees the value
pub fn transform<F>(f: F) -> FieldRule<()>
where
    F: Fn(Option<&Value>) -> BffResult<Option<Value>> + Send + Sync + 'static,
{
    computed(move |value, _: &()| f(value))
}

fn from_facet(facet: Facet, key: String) -> FieldRule<RequestContext> {
    computed(move |_, context: &RequestContext| Ok(context.facet(facet).get(&key).cloned()))
}

fn from_facet_with<F>(facet: Facet, f: F) -> FieldRule<RequestContext>
where
    F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
{
    computed(move |_, context: &RequestContext| Ok(f(context.facet(facet))))
}

/// Read a field of the (validated) inbound body
pub fn from_body(key: impl Into<String>) -> FieldRule<RequestContext> {
    from_facet(Facet::Body, key.into())
}

/// Read a field of the (validated) inbound path parameters
pub fn from_param(key: impl Into<String>) -> FieldRule<RequestContext> {
    from_facet(Facet::Params, key.into())
}

/// Read a field of the (validated) inbound query
pub fn from_query(key: impl Into<String>) -> FieldRule<RequestContext> {
    from_facet(Facet::Query, key.into())
}

/// Read an inbound header; names are matched lower-cased
pub fn from_header(key: impl Into<String>) -> FieldRule<RequestContext> {
    from_facet(Facet::Headers, key.into().to_ascii_lowercase())
}

pub fn from_body_with<F>(f: F) -> FieldRule<RequestContext>
where
    F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
{
    from_facet_with(Facet::Body, f)
}

pub fn from_param_with<F>(f: F) -> FieldRule<RequestContext>
where
    F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
{
    from_facet_with(Facet::Params, f)
}

pub fn from_query_with<F>(f: F) -> FieldRule<RequestContext>
where
    F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
{
    from_facet_with(Facet::Query, f)
}

pub fn from_header_with<F>(f: F) -> FieldRule<RequestContext>
where
    F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
{
    from_facet_with(Facet::Headers, f)
}

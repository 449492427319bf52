//! # Cache Key Generator
//!
//! Cache keys are computed from the fully composed outbound request, so two inbound
//! requests that map to the same upstream call share an entry.
//!
//! The default composition is `METHOD::url`, where `url` already carries the mapped
//! query string. Routes whose upstream answer depends on anything else (a caller
//! identity header, for instance) install their own [`KeyComposer`].

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::core::types::HttpMethod;

/// Everything a key composer can look at
#[derive(Debug, Clone, Copy)]
pub struct CacheKeyInput<'a> {
    /// Full outbound URL including the query string
    pub url: &'a str,
    pub method: HttpMethod,
    pub query: &'a IndexMap<String, String>,
    pub params: &'a IndexMap<String, String>,
    pub headers: &'a IndexMap<String, String>,
    pub body: Option<&'a Value>,
}

/// Pluggable cache key composition
#[derive(Clone)]
pub struct KeyComposer(Arc<dyn Fn(&CacheKeyInput<'_>) -> String + Send + Sync>);

impl KeyComposer {
    pub fn new<F>(compose: F) -> Self
    where
        F: Fn(&CacheKeyInput<'_>) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(compose))
    }

    pub fn compose(&self, input: &CacheKeyInput<'_>) -> String {
        (self.0)(input)
    }
}

impl Default for KeyComposer {
    fn default() -> Self {
        Self::new(default_key)
    }
}

impl fmt::Debug for KeyComposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyComposer(<fn>)")
    }
}

/// `METHOD::url`
pub fn default_key(input: &CacheKeyInput<'_>) -> String {
    format!("{}::{}", input.method, input.url)
}

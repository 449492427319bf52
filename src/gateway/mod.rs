//! # Gateway
//!
//! HTTP surface of the BFF.

pub mod server;

pub use server::{BffServer, CACHE_STATUS_HEADER, INVALIDATE_ALL_CACHE_PATH};

//! # Routing
//!
//! Route descriptors, their compiled pipelines, and the table that dispatches
//! inbound requests to them.

pub mod descriptor;
pub mod pipeline;
pub mod router;

pub use descriptor::{placeholders, Documentation, PerFacet, RequestSpec, ResponseSpec, RouteDescriptor};
pub use pipeline::{substitute_path, RoutePipeline};
pub use router::{parse_query, Route, RouteMatch, RouteTable};

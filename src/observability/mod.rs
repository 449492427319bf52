//! # Observability
//!
//! Structured logging setup. Counters are emitted through the `metrics` facade at
//! the call sites; installing an exporter is left to the embedding binary.

pub mod logging;

pub use logging::init_logging;

//! Job-scoped test-result aggregation cache.
//!
//! CI workers report test steps as they run; this service keeps a sliding
//! TTL-bounded per-job view of step state, deep-merges repeated updates,
//! infers ordering for dynamically-discovered steps, rewrites legacy result
//! labels, and forwards accepted batches to a downstream reporter.

pub mod cache;
pub mod errors;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod position;
pub mod reporter;
pub mod server;
pub mod service;

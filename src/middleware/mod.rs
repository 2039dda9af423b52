//! Hooks run around every dispatched operation.
//!
//! `before` runs after routing and before authorization; an error from it
//! short-circuits the pipeline like any other stage failure. `after` runs once
//! the response status is known, for every matched operation, whether the
//! request succeeded or failed.

mod core;
mod metrics;
mod tracing;

pub use self::core::Middleware;
pub use self::metrics::{MetricsMiddleware, OperationStats};
pub use self::tracing::TracingMiddleware;

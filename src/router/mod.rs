//! # Router Module
//!
//! The route table: every routable operation of the merged contract, bound to
//! its handler method and compiled for matching.
//!
//! ## Overview
//!
//! The table is built once at startup by [`RouteTable::build`]:
//!
//! 1. Operations are derived from the merged document (`operationId` must be
//!    `<controller>.<method>`).
//! 2. Each controller and method is resolved through the
//!    [`HandlerRegistry`](crate::registry::HandlerRegistry); a missing one
//!    aborts startup.
//! 3. Path templates (`/users/{id}`) are compiled to anchored regexes with one
//!    named capture per `{param}` and mounted under the base path.
//!
//! After construction the table is immutable and shared read-only between
//! concurrent requests.
//!
//! ## Matching
//!
//! Literal templates beat templated ones, and among templated routes the one
//! with fewer captures wins. A path that only matches under another verb
//! yields [`RouteLookup::MethodNotAllowed`] with the allowed verbs.

mod core;

pub use self::core::{
    Operation, ParamVec, RouteLookup, RouteMatch, RouteTable, RouteTableError, MAX_INLINE_PARAMS,
};

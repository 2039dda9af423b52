//! # openapi-dispatcher
//!
//! An HTTP request dispatcher driven by one or more
//! [OpenAPI 3.1](https://spec.openapis.org/oas/v3.1.0) documents.
//!
//! ## Overview
//!
//! The contract decides everything about an operation: its route, its
//! parameters, the roles allowed to call it. Application code supplies only
//! controllers, named after the first half of each `operationId`
//! (`<controller>.<method>`), and the methods that implement them.
//!
//! ## Architecture
//!
//! - **[`spec`]** - Loading and merging contract documents, deriving operations
//! - **[`registry`]** - Controllers, handler methods and the resolve-once cache
//! - **[`router`]** - The immutable route table and path matching
//! - **[`auth`]** - Principals, JWT extraction and `oneOf`/`anyOf`/`allOf` policy
//! - **[`validator`]** - Request validation against declared schemas
//! - **[`binder`]** - Coercion of request values into handler arguments
//! - **[`dispatcher`]** - The per-request pipeline with deadlines and cancellation
//! - **[`error`]** - The user-facing error catalog
//! - **[`middleware`]** - Before/after hooks (tracing, metrics)
//! - **[`server`]** - HTTP/1.1 adapter built on hyper
//! - **[`config`]** / **[`telemetry`]** - Configuration and structured logging
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as server::HttpServer
//!     participant Dispatcher as dispatcher::Dispatcher
//!     participant Table as router::RouteTable
//!     participant Auth as auth::AuthPolicy
//!     participant Binder as binder::ParameterBinder
//!     participant Handler as registry::HandlerMethod
//!
//!     Client->>Server: HTTP request
//!     Server->>Server: Collect body (413 above limit)
//!     Server->>Dispatcher: dispatch(Request<Bytes>)
//!     Dispatcher->>Table: lookup(method, path)
//!     Table-->>Dispatcher: Operation + path captures (or 404/405)
//!     Dispatcher->>Auth: authorize(requirement, roles, issued_at)
//!     Auth-->>Dispatcher: ok (or 401)
//!     Dispatcher->>Binder: bind(operation, context)
//!     Binder-->>Dispatcher: Args (or 400)
//!     Dispatcher->>Handler: spawn call(args) under deadline
//!     Handler-->>Dispatcher: Reply / ApiError (or 504 on deadline)
//!     Dispatcher-->>Server: Response<Bytes>
//!     Server-->>Client: HTTP response
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use openapi_dispatcher::prelude::*;
//! use std::sync::Arc;
//!
//! let config = DispatcherConfig::load(None)?;
//! let merged = merge_all_in_directory("./api")?;
//!
//! let users = Controller::new("users").method("get", MethodOptions::new(), |args| async move {
//!     let id = args.int("id")?;
//!     Reply::json(&serde_json::json!({ "id": id }))
//! });
//! let registry = Arc::new(HandlerRegistry::from_controllers([users]));
//!
//! let table = RouteTable::build(&merged, registry, &config)?;
//! let dispatcher = Dispatcher::builder(table).config(&config).build();
//!
//! let handle = HttpServer::new(Arc::new(dispatcher))
//!     .body_limit(config.body_limit_bytes)
//!     .bind("0.0.0.0:8080")
//!     .await?;
//! handle.run_until_ctrl_c().await?;
//! ```

pub mod auth;
pub mod binder;
pub mod cli;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod middleware;
pub mod registry;
pub mod router;
pub mod server;
pub mod spec;
pub mod telemetry;
pub mod validator;

pub use dispatcher::Dispatcher;
pub use error::{ApiError, ErrorKind};
pub use router::RouteTable;
pub use spec::{merge_all, merge_all_in_directory, MergedSpec, SpecLoadError};

/// The types most applications need.
pub mod prelude {
    pub use crate::auth::{
        AuthPolicy, JwtPrincipalResolver, NoPrincipal, Principal, PrincipalResolver,
        RoleAuthPolicy,
    };
    pub use crate::binder::{Arg, Args};
    pub use crate::config::DispatcherConfig;
    pub use crate::context::{RequestContext, SharedContext};
    pub use crate::dispatcher::Dispatcher;
    pub use crate::error::{ApiError, ErrorKind};
    pub use crate::middleware::{MetricsMiddleware, Middleware, TracingMiddleware};
    pub use crate::registry::{Controller, HandlerRegistry, MethodOptions, Reply};
    pub use crate::router::RouteTable;
    pub use crate::server::HttpServer;
    pub use crate::spec::{merge_all, merge_all_in_directory, MergedSpec, RoleRequirement};
    pub use crate::validator::{NoopValidator, SchemaValidator};
}

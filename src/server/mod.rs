//! # Server Module
//!
//! HTTP/1.1 front end for a [`Dispatcher`](crate::dispatcher::Dispatcher),
//! built on hyper and tokio.
//!
//! Each accepted connection is served on its own task. Request bodies are
//! collected up to a configurable limit before dispatch; larger bodies are
//! rejected with 413 and never reach the pipeline.
//!
//! ```rust,ignore
//! use openapi_dispatcher::server::HttpServer;
//! use std::sync::Arc;
//!
//! let handle = HttpServer::new(Arc::new(dispatcher))
//!     .body_limit(config.body_limit_bytes)
//!     .bind("127.0.0.1:8080")
//!     .await?;
//! println!("listening on {}", handle.local_addr());
//! handle.stop().await?;
//! ```

mod http_server;
mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use service::DispatchService;

//! # Dispatcher Module
//!
//! Executes the per-request pipeline for matched operations.
//!
//! ## Request Flow
//!
//! ```text
//! RECEIVED -> AUTHORIZED -> VALIDATED -> BOUND -> INVOKED -> RESPONDED
//!     \            \             \          \          \
//!      +------------+-------------+----------+----------+--> FAILED
//! ```
//!
//! 1. The route table matches the verb and path (404 / 405 otherwise).
//! 2. The operation's controller method is resolved through the registry.
//! 3. Middleware `before` hooks run.
//! 4. The principal is resolved; operations with a role requirement are
//!    authorized (401 on failure).
//! 5. The request is validated (400) and bound to handler arguments (400/404).
//! 6. The handler runs on its own task under the operation's deadline. When the
//!    deadline elapses the handler's [`CancellationToken`] is cancelled, the
//!    task is aborted and the caller receives 504 with the operation id in
//!    `details`.
//! 7. Exactly one response is written. A handler that ended the response
//!    itself keeps its response; the dispatcher writes nothing further.
//!
//! Steps 4 and 5 are unbounded by default; see
//! [`DispatcherBuilder::pre_invoke_timeout`].
//!
//! ## Response Mapping
//!
//! | Handler outcome     | Response                                           |
//! |---------------------|----------------------------------------------------|
//! | `Reply::Json`       | JSON body, `application/json`, status or 200       |
//! | `Reply::Text`       | text body, `text/plain` unless set, status or 200  |
//! | `Reply::Empty`      | empty body, status set by the handler or 200       |
//! | `Err(ApiError)`     | `{"message", "details"}` with the error's status   |
//! | panic               | 500 with a generic message                         |
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

mod core;

pub use self::core::{
    error_response, Dispatcher, DispatcherBuilder, PRE_INVOCATION_DETAIL, TIMEOUT_MESSAGE,
};

//! # Error Catalog
//!
//! User-facing errors raised while dispatching a request, and their mapping to
//! HTTP status codes.
//!
//! Every [`ApiError`] carries a [`ErrorKind`], a message and a structured
//! `details` list. On the wire it is always rendered as
//!
//! ```json
//! { "message": "...", "details": [ ... ] }
//! ```
//!
//! ## Status mapping
//!
//! | Kind               | Status |
//! |--------------------|--------|
//! | `Authorization`    | 401    |
//! | `BadRequest`       | 400    |
//! | `Binding`          | 400    |
//! | `Validation`       | 400    |
//! | `Forbidden`        | 403    |
//! | `NotFound`         | 404    |
//! | `MethodNotAllowed` | 405    |
//! | `Conflict`         | 409    |
//! | `PayloadTooLarge`  | 413    |
//! | `TooManyRequests`  | 429    |
//! | `Internal`         | 500    |
//! | `Unavailable`      | 503    |
//! | `Timeout`          | 504    |
//!
//! Upstream 502/503/504 statuses collapse to `Unavailable` (503). Only the
//! dispatcher's own deadline produces `Timeout` (504).
//!
//! ## Logging
//!
//! Errors at or above 500 are logged at `error` level before the response is
//! written, together with the diagnostic source (if any). Errors below 500 are
//! logged at `debug` only.

use http::StatusCode;
use serde_json::{json, Value};
use std::fmt;

/// Message sent to callers for errors that were not classified by the handler.
pub const GENERIC_INTERNAL_MESSAGE: &str = "Internal server error";

/// Classification of a user-facing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing, expired or insufficient credentials (401)
    Authorization,
    /// Generic caller error (400)
    BadRequest,
    /// A request value could not be bound to a handler argument (400)
    Binding,
    /// The request violated the operation's declared schema (400)
    Validation,
    /// The caller is known but not allowed to perform the action (403)
    Forbidden,
    /// The addressed resource or route does not exist (404)
    NotFound,
    /// The path exists under a different verb (405)
    MethodNotAllowed,
    /// The request conflicts with current state (409)
    Conflict,
    /// The request body exceeded the configured limit (413)
    PayloadTooLarge,
    /// The caller is being rate limited (429)
    TooManyRequests,
    /// Unclassified failure (500)
    Internal,
    /// An upstream dependency is unavailable (503)
    Unavailable,
    /// The handler did not finish before its deadline (504)
    Timeout,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Authorization => StatusCode::UNAUTHORIZED,
            ErrorKind::BadRequest | ErrorKind::Binding | ErrorKind::Validation => {
                StatusCode::BAD_REQUEST
            }
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Map a status code back onto the catalog.
    ///
    /// 502, 503 and 504 collapse to [`ErrorKind::Unavailable`]; anything not
    /// listed becomes [`ErrorKind::Internal`].
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            400 => ErrorKind::BadRequest,
            401 => ErrorKind::Authorization,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            429 => ErrorKind::TooManyRequests,
            502..=504 => ErrorKind::Unavailable,
            _ => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Authorization => "Authorization",
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::Binding => "Binding",
            ErrorKind::Validation => "Validation",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::MethodNotAllowed => "MethodNotAllowed",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::PayloadTooLarge => "PayloadTooLarge",
            ErrorKind::TooManyRequests => "TooManyRequests",
            ErrorKind::Internal => "Internal",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::Timeout => "Timeout",
        };
        f.write_str(s)
    }
}

/// A recoverable, user-facing error.
///
/// Handlers return `Result<Reply, ApiError>`; anything converted from
/// [`anyhow::Error`] is treated as unclassified and its detail stays
/// server-side.
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    details: Vec<Value>,
    source: Option<anyhow::Error>,
    classified: bool,
}

impl ApiError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Vec::new(),
            source: None,
            classified: true,
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn binding(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Binding, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TooManyRequests, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Deadline expiry for `operation_id`. Raised only by the dispatcher.
    pub(crate) fn timeout(message: impl Into<String>, operation_id: &str) -> Self {
        Self::new(ErrorKind::Timeout, message).with_detail(operation_id)
    }

    /// Build an error from a status code, collapsing gateway statuses to 503.
    pub fn from_status(status: StatusCode, message: impl Into<String>, details: Vec<Value>) -> Self {
        Self::new(ErrorKind::from_status(status), message).with_details(details)
    }

    /// Append one entry to the details list.
    pub fn with_detail(mut self, detail: impl Into<Value>) -> Self {
        self.details.push(detail.into());
        self
    }

    /// Replace the details list.
    pub fn with_details(mut self, details: Vec<Value>) -> Self {
        self.details = details;
        self
    }

    /// Attach a diagnostic cause. It is logged for 5xx errors and never sent
    /// to the caller.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn details(&self) -> &[Value] {
        &self.details
    }

    #[must_use]
    pub fn diagnostic(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    /// `false` for errors that did not originate as an [`ApiError`].
    #[must_use]
    pub fn is_classified(&self) -> bool {
        self.classified
    }

    /// Wire representation: `{"message": ..., "details": [...]}`.
    ///
    /// Unclassified errors only ever expose [`GENERIC_INTERNAL_MESSAGE`].
    #[must_use]
    pub fn to_json(&self) -> Value {
        if self.classified {
            json!({ "message": self.message, "details": self.details })
        } else {
            json!({ "message": GENERIC_INTERNAL_MESSAGE, "details": [] })
        }
    }

    /// Emit the server-side log line for this error.
    pub(crate) fn log(&self, operation_id: &str) {
        let status = self.status().as_u16();
        if status >= 500 {
            match &self.source {
                Some(source) => tracing::error!(
                    operation_id = %operation_id,
                    status,
                    kind = %self.kind,
                    message = %self.message,
                    details = ?self.details,
                    source = %format!("{source:#}"),
                    "Request failed"
                ),
                None => tracing::error!(
                    operation_id = %operation_id,
                    status,
                    kind = %self.kind,
                    message = %self.message,
                    details = ?self.details,
                    "Request failed"
                ),
            }
        } else {
            tracing::debug!(
                operation_id = %operation_id,
                status,
                kind = %self.kind,
                message = %self.message,
                "Request rejected"
            );
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.kind, self.status().as_u16(), self.message)
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // A handler may wrap an ApiError in anyhow; keep its classification.
        match err.downcast::<ApiError>() {
            Ok(api) => api,
            Err(err) => Self {
                kind: ErrorKind::Internal,
                message: err.to_string(),
                details: Vec::new(),
                source: Some(err),
                classified: false,
            },
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::from(anyhow::Error::new(err))
    }
}

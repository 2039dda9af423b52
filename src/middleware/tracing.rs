use std::time::Duration;

use http::StatusCode;
use tracing::{debug, info, warn};

use super::Middleware;
use crate::context::RequestContext;
use crate::error::ApiError;
use crate::router::Operation;

/// Logs the start and completion of every operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn before(&self, ctx: &RequestContext, operation: &Operation) -> Result<(), ApiError> {
        debug!(
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            operation_id = %operation.operation_id(),
            "Request start"
        );
        Ok(())
    }

    fn after(
        &self,
        ctx: &RequestContext,
        operation: &Operation,
        status: StatusCode,
        latency: Duration,
    ) {
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        if status.is_server_error() {
            warn!(
                request_id = %ctx.request_id(),
                operation_id = %operation.operation_id(),
                status = status.as_u16(),
                latency_ms,
                "Request complete"
            );
        } else {
            info!(
                request_id = %ctx.request_id(),
                operation_id = %operation.operation_id(),
                status = status.as_u16(),
                latency_ms,
                "Request complete"
            );
        }
    }
}

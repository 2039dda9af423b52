use std::time::Duration;

use http::StatusCode;

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::router::Operation;

pub trait Middleware: Send + Sync {
    fn before(&self, _ctx: &RequestContext, _operation: &Operation) -> Result<(), ApiError> {
        Ok(())
    }
    fn after(
        &self,
        _ctx: &RequestContext,
        _operation: &Operation,
        _status: StatusCode,
        _latency: Duration,
    ) {
    }
}

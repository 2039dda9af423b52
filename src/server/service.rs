use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{Request, Response};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use tracing::{debug, warn};

use crate::config::DEFAULT_BODY_LIMIT_BYTES;
use crate::context::{RequestId, REQUEST_ID_HEADER};
use crate::dispatcher::{error_response, Dispatcher};
use crate::error::{ApiError, ErrorKind};

/// Adapts a streaming HTTP request to [`Dispatcher::dispatch`].
#[derive(Clone)]
pub struct DispatchService {
    dispatcher: Arc<Dispatcher>,
    body_limit: usize,
}

impl DispatchService {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            body_limit: DEFAULT_BODY_LIMIT_BYTES,
        }
    }

    #[must_use]
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    /// Collect the body within the limit, then dispatch.
    pub async fn call<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let (parts, body) = req.into_parts();

        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.body_limit) {
            return self.too_large(&parts.headers).map(Full::new);
        }

        let body = match Limited::new(body, self.body_limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
                return self.too_large(&parts.headers).map(Full::new);
            }
            Err(err) => {
                debug!(error = %err, "Failed to read request body");
                let request_id = request_id_of(&parts.headers);
                let api = ApiError::bad_request("Failed to read request body");
                return error_response(request_id, &api).map(Full::new);
            }
        };

        self.dispatcher
            .dispatch(Request::from_parts(parts, body))
            .await
            .map(Full::new)
    }

    fn too_large(&self, headers: &http::HeaderMap) -> Response<Bytes> {
        warn!(limit = self.body_limit, "Request body exceeds limit");
        let err = ApiError::new(ErrorKind::PayloadTooLarge, "Request body too large")
            .with_detail(self.body_limit);
        error_response(request_id_of(headers), &err)
    }
}

fn request_id_of(headers: &http::HeaderMap) -> RequestId {
    RequestId::from_header_or_new(headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()))
}

//! Per-request state shared by the pipeline stages and the handler.
//!
//! A [`RequestContext`] is created for every inbound request and dropped once
//! the response is written. It holds the raw request data, the resolved
//! principal, and the response slot. Writing the response is guarded: once
//! ended, later writes are refused.

use crate::auth::Principal;
use crate::error::ApiError;
use crate::router::ParamVec;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};
use http::{HeaderMap, Method, StatusCode};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

/// Header carrying the request id on both request and response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Strongly typed request identifier backed by ULID.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(pub ulid::Ulid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Parse from a header value; if absent or invalid, generate a new one.
    #[must_use]
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        header_value
            .and_then(|s| s.parse::<RequestId>().ok())
            .unwrap_or_default()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RequestId(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<RequestId>()
            .map_err(|_| serde::de::Error::custom("invalid request id"))
    }
}

/// The response being assembled for a request.
#[derive(Debug, Default)]
pub struct ResponseState {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub ended: bool,
}

/// Mutable per-request state. Owned by a single request.
#[derive(Debug)]
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    path: String,
    operation_id: String,
    path_params: ParamVec,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    cookies: Vec<(String, String)>,
    body: Bytes,
    parsed_body: OnceCell<Result<Value, String>>,
    principal: OnceCell<Principal>,
    response: Mutex<ResponseState>,
}

impl RequestContext {
    /// Build a context from the raw request parts.
    ///
    /// The query string is decoded into ordered `(name, value)` pairs and the
    /// `Cookie` header into name/value pairs.
    #[must_use]
    pub fn new(
        request_id: RequestId,
        method: Method,
        path: impl Into<String>,
        raw_query: Option<&str>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        let query = raw_query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();
        let cookies = parse_cookies(&headers);
        Self {
            request_id,
            method,
            path: path.into(),
            operation_id: String::new(),
            path_params: ParamVec::new(),
            query,
            headers,
            cookies,
            body,
            parsed_body: OnceCell::new(),
            principal: OnceCell::new(),
            response: Mutex::new(ResponseState::default()),
        }
    }

    /// Attach the matched route. Called by the dispatcher before the pipeline runs.
    pub(crate) fn with_route(mut self, operation_id: &str, path_params: ParamVec) -> Self {
        self.operation_id = operation_id.to_string();
        self.path_params = path_params;
        self
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Identifier of the matched operation; empty before routing.
    #[must_use]
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Raw (percent-encoded) path capture.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// First value of a query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a repeated query parameter, in request order.
    #[must_use]
    pub fn query_params_all(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as a string (case-insensitive name). Non-UTF-8 values are ignored.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn raw_body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8 text.
    pub fn body_text(&self) -> Result<&str, ApiError> {
        std::str::from_utf8(&self.body)
            .map_err(|_| ApiError::bad_request("Request body is not valid UTF-8"))
    }

    /// The body parsed as JSON. Parsed at most once per request; an empty
    /// body is `None`.
    pub fn body_json(&self) -> Result<Option<&Value>, ApiError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let parsed = self
            .parsed_body
            .get_or_init(|| serde_json::from_slice(&self.body).map_err(|e| e.to_string()));
        match parsed {
            Ok(v) => Ok(Some(v)),
            Err(e) => Err(ApiError::bad_request("Request body is not valid JSON").with_detail(e.as_str())),
        }
    }

    /// The authenticated caller, if any.
    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.get()
    }

    pub(crate) fn set_principal(&self, principal: Principal) {
        if self.principal.set(principal).is_err() {
            tracing::debug!(request_id = %self.request_id, "Principal already set; keeping first");
        }
    }

    /// Set the response status. Returns `false` if the response already ended.
    pub fn set_status(&self, status: StatusCode) -> bool {
        let mut res = self.response.lock();
        if res.ended {
            return false;
        }
        res.status = Some(status);
        true
    }

    /// Status set so far, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.response.lock().status
    }

    /// Set a response header. Returns `false` if the response already ended.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) -> bool {
        let mut res = self.response.lock();
        if res.ended {
            return false;
        }
        res.headers.insert(name, value);
        true
    }

    /// Whether a response header has been set.
    #[must_use]
    pub fn has_response_header(&self, name: &HeaderName) -> bool {
        self.response.lock().headers.contains_key(name)
    }

    /// End the response with `body`. Returns `false` (and writes nothing) if
    /// it had already ended.
    pub fn end(&self, body: impl Into<Bytes>) -> bool {
        let mut res = self.response.lock();
        if res.ended {
            return false;
        }
        res.body = body.into();
        res.ended = true;
        true
    }

    /// End the response with a JSON body and content type.
    pub fn end_json(&self, value: &Value) -> bool {
        let mut res = self.response.lock();
        if res.ended {
            return false;
        }
        res.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        res.body = Bytes::from(value.to_string());
        res.ended = true;
        true
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.response.lock().ended
    }

    /// Take the assembled response, leaving an ended, empty state behind.
    pub(crate) fn take_response(&self) -> ResponseState {
        let mut res = self.response.lock();
        let taken = std::mem::take(&mut *res);
        res.ended = true;
        taken
    }
}

/// Shared handle to the request context.
pub type SharedContext = Arc<RequestContext>;

fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument, Span};

use crate::auth::{AuthPolicy, JwtPrincipalResolver, NoPrincipal, PrincipalResolver, RoleAuthPolicy};
use crate::binder::{Args, ParameterBinder};
use crate::config::DispatcherConfig;
use crate::context::{RequestContext, RequestId, ResponseState, SharedContext, REQUEST_ID_HEADER};
use crate::error::{ApiError, ErrorKind};
use crate::middleware::Middleware;
use crate::registry::{HandlerMethod, Reply};
use crate::router::{Operation, RouteLookup, RouteMatch, RouteTable};
use crate::validator::{NoopValidator, RequestValidator};

/// Message of the 504 produced when a deadline elapses.
pub const TIMEOUT_MESSAGE: &str = "Timed out waiting for response";

/// Detail marking a deadline that elapsed before the handler was invoked.
pub const PRE_INVOCATION_DETAIL: &str = "pre-invocation";

/// Runs the per-request pipeline for a [`RouteTable`].
///
/// Stages run strictly in order: route lookup, handler resolution,
/// middleware `before`, principal resolution and authorization, validation,
/// binding, then the timed invocation. Any failure short-circuits to an
/// error response; exactly one response is written per request.
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    auth_policy: Arc<dyn AuthPolicy>,
    principal_resolver: Arc<dyn PrincipalResolver>,
    validator: Arc<dyn RequestValidator>,
    middlewares: Vec<Arc<dyn Middleware>>,
    pre_invoke_timeout: Option<Duration>,
}

/// Builder for [`Dispatcher`]. Unset collaborators fall back to
/// [`RoleAuthPolicy`], [`NoPrincipal`] and [`NoopValidator`].
pub struct DispatcherBuilder {
    routes: RouteTable,
    auth_policy: Option<Arc<dyn AuthPolicy>>,
    principal_resolver: Option<Arc<dyn PrincipalResolver>>,
    validator: Option<Arc<dyn RequestValidator>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    pre_invoke_timeout: Option<Duration>,
}

impl DispatcherBuilder {
    #[must_use]
    pub fn auth_policy(mut self, policy: impl AuthPolicy + 'static) -> Self {
        self.auth_policy = Some(Arc::new(policy));
        self
    }

    #[must_use]
    pub fn principal_resolver(mut self, resolver: impl PrincipalResolver + 'static) -> Self {
        self.principal_resolver = Some(Arc::new(resolver));
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: impl RequestValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Append a middleware. Hooks run in registration order.
    #[must_use]
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Bound principal resolution, authorization, validation and binding
    /// together. Unbounded unless set.
    #[must_use]
    pub fn pre_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.pre_invoke_timeout = Some(timeout);
        self
    }

    /// Apply token expiration, pre-invocation deadline and JWT settings.
    ///
    /// Collaborators set explicitly before this call are replaced.
    #[must_use]
    pub fn config(mut self, config: &DispatcherConfig) -> Self {
        self.auth_policy = Some(Arc::new(RoleAuthPolicy::new(config.token_expiration())));
        self.pre_invoke_timeout = config.pre_invoke_timeout();
        if let Some(jwt) = config.jwt.as_ref().filter(|j| !j.secret.is_empty()) {
            self.principal_resolver = Some(Arc::new(
                JwtPrincipalResolver::new(jwt.secret.as_bytes()).cookie_name(jwt.cookie_name.clone()),
            ));
        }
        self
    }

    #[must_use]
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            routes: Arc::new(self.routes),
            auth_policy: self
                .auth_policy
                .unwrap_or_else(|| Arc::new(RoleAuthPolicy::default())),
            principal_resolver: self
                .principal_resolver
                .unwrap_or_else(|| Arc::new(NoPrincipal)),
            validator: self.validator.unwrap_or_else(|| Arc::new(NoopValidator)),
            middlewares: self.middlewares,
            pre_invoke_timeout: self.pre_invoke_timeout,
        }
    }
}

impl Dispatcher {
    #[must_use]
    pub fn builder(routes: RouteTable) -> DispatcherBuilder {
        DispatcherBuilder {
            routes,
            auth_policy: None,
            principal_resolver: None,
            validator: None,
            middlewares: Vec::new(),
            pre_invoke_timeout: None,
        }
    }

    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Dispatch one request and produce its response.
    ///
    /// Never fails: every outcome, including handler panics, is mapped to a
    /// response. The response always carries an `x-request-id` header.
    pub async fn dispatch(&self, req: Request<Bytes>) -> Response<Bytes> {
        let request_id = RequestId::from_header_or_new(
            req.headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
        );
        let span = info_span!(
            "dispatch",
            request_id = %request_id,
            operation_id = tracing::field::Empty
        );
        self.dispatch_inner(request_id, req).instrument(span).await
    }

    async fn dispatch_inner(&self, request_id: RequestId, req: Request<Bytes>) -> Response<Bytes> {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_string();

        let RouteMatch {
            operation,
            path_params,
        } = match self.routes.lookup(&parts.method, &path) {
            RouteLookup::Found(m) => m,
            RouteLookup::MethodNotAllowed { allowed } => {
                debug!(method = %parts.method, path = %path, allowed = ?allowed, "Method not allowed");
                return method_not_allowed_response(request_id, &parts.method, &allowed);
            }
            RouteLookup::NotFound => {
                let err = ApiError::not_found("No route matches the request")
                    .with_detail(parts.method.as_str())
                    .with_detail(path.as_str());
                return error_response(request_id, &err);
            }
        };
        Span::current().record("operation_id", operation.operation_id());

        let ctx: SharedContext = Arc::new(
            RequestContext::new(
                request_id,
                parts.method,
                path,
                parts.uri.query(),
                parts.headers,
                body,
            )
            .with_route(operation.operation_id(), path_params),
        );

        let start = Instant::now();
        let outcome = self.run(&operation, &ctx).await;
        write_outcome(&operation, &ctx, outcome);

        let status = ctx.status().unwrap_or(StatusCode::OK);
        let latency = start.elapsed();
        for mw in &self.middlewares {
            mw.after(&ctx, &operation, status, latency);
        }

        into_response(request_id, ctx.take_response())
    }

    async fn run(&self, operation: &Operation, ctx: &SharedContext) -> Result<Reply, ApiError> {
        let method = self
            .routes
            .registry()
            .resolve_method(operation.controller_name(), operation.method_name())
            .map_err(|e| ApiError::internal("Handler unavailable").with_source(e))?;

        for mw in &self.middlewares {
            mw.before(ctx, operation)?;
        }

        let cancel = CancellationToken::new();
        let args = match self.pre_invoke_timeout {
            Some(limit) => tokio::time::timeout(limit, self.prepare(operation, ctx, cancel.clone()))
                .await
                .map_err(|_| {
                    warn!(
                        operation_id = %operation.operation_id(),
                        timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        "Pre-invocation stages timed out"
                    );
                    ApiError::timeout(TIMEOUT_MESSAGE, operation.operation_id())
                        .with_detail(PRE_INVOCATION_DETAIL)
                })??,
            None => self.prepare(operation, ctx, cancel.clone()).await?,
        };

        invoke(operation, &method, args, cancel).await
    }

    /// Authorization, validation and binding.
    async fn prepare(
        &self,
        operation: &Operation,
        ctx: &SharedContext,
        cancel: CancellationToken,
    ) -> Result<Args, ApiError> {
        let requirement = operation.required_roles().filter(|r| !r.is_empty());

        match self.principal_resolver.resolve(ctx).await {
            Ok(Some(principal)) => ctx.set_principal(principal),
            Ok(None) => {}
            Err(err) if requirement.is_none() => {
                debug!(
                    operation_id = %operation.operation_id(),
                    error = %err,
                    "Ignoring unusable credentials on public operation"
                );
            }
            Err(err) => return Err(err),
        }

        if let Some(requirement) = requirement {
            let principal = ctx
                .principal()
                .ok_or_else(|| ApiError::authorization("Authentication required"))?;
            self.auth_policy
                .authorize(requirement, &principal.roles, principal.issued_at)?;
        }

        self.validator.validate(operation, ctx).await?;
        ParameterBinder::bind(operation, ctx, cancel)
    }
}

/// Call the handler on its own task under the operation's deadline.
async fn invoke(
    operation: &Operation,
    method: &HandlerMethod,
    args: Args,
    cancel: CancellationToken,
) -> Result<Reply, ApiError> {
    debug!(
        operation_id = %operation.operation_id(),
        timeout_ms = operation.timeout_millis(),
        "Invoking handler"
    );
    let mut handle = tokio::spawn(method.call(args));
    match tokio::time::timeout(operation.timeout(), &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(ApiError::from(anyhow::anyhow!(
            "handler '{}' did not complete: {join_err}",
            operation.operation_id()
        ))),
        Err(_) => {
            // Best effort: the handler sees the token, the task is dropped at
            // its next await point. Resources it holds are not reclaimed here.
            cancel.cancel();
            handle.abort();
            warn!(
                operation_id = %operation.operation_id(),
                timeout_ms = operation.timeout_millis(),
                "Handler timed out"
            );
            Err(ApiError::timeout(TIMEOUT_MESSAGE, operation.operation_id()))
        }
    }
}

/// Write the pipeline outcome unless the handler already ended the response.
fn write_outcome(operation: &Operation, ctx: &RequestContext, outcome: Result<Reply, ApiError>) {
    if ctx.is_ended() {
        if let Err(err) = &outcome {
            err.log(operation.operation_id());
        }
        debug!(
            operation_id = %operation.operation_id(),
            "Response already ended by handler"
        );
        return;
    }

    match outcome {
        Ok(reply) => {
            if ctx.status().is_none() {
                ctx.set_status(StatusCode::OK);
            }
            match reply {
                Reply::Json(value) => {
                    ctx.end_json(&value);
                }
                Reply::Text(text) => {
                    if !ctx.has_response_header(&CONTENT_TYPE) {
                        ctx.set_header(
                            CONTENT_TYPE,
                            HeaderValue::from_static("text/plain; charset=utf-8"),
                        );
                    }
                    ctx.end(text);
                }
                Reply::Empty => {
                    ctx.end(Bytes::new());
                }
            }
        }
        Err(err) => {
            err.log(operation.operation_id());
            ctx.set_status(err.status());
            ctx.end_json(&err.to_json());
        }
    }
}

fn into_response(request_id: RequestId, state: ResponseState) -> Response<Bytes> {
    let mut response = Response::new(state.body);
    *response.status_mut() = state.status.unwrap_or(StatusCode::OK);
    *response.headers_mut() = state.headers;
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// JSON error response outside of any matched operation (404, 405, 413).
#[must_use]
pub fn error_response(request_id: RequestId, err: &ApiError) -> Response<Bytes> {
    debug!(
        request_id = %request_id,
        status = err.status().as_u16(),
        message = %err.message(),
        "Request rejected before dispatch"
    );
    let mut headers = http::HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    into_response(
        request_id,
        ResponseState {
            status: Some(err.status()),
            headers,
            body: Bytes::from(err.to_json().to_string()),
            ended: true,
        },
    )
}

fn method_not_allowed_response(
    request_id: RequestId,
    method: &Method,
    allowed: &[Method],
) -> Response<Bytes> {
    let err = ApiError::new(ErrorKind::MethodNotAllowed, "Method not allowed")
        .with_detail(method.as_str());
    let mut response = error_response(request_id, &err);
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}

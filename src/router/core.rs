use crate::binder::Arg;
use crate::config::DispatcherConfig;
use crate::registry::{HandlerRegistry, RegistryError};
use crate::spec::{build_operations, MergedSpec, OperationMeta, ParamLocation, SpecLoadError};
use http::Method;
use regex::Regex;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Maximum number of path captures before heap allocation.
/// Most REST APIs have at most 4 (e.g. `/users/{id}/posts/{postId}`).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Path captures of a matched request, in template order.
///
/// Names are shared with the route (`Arc<str>`); values are per request and
/// still percent-encoded.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// A routable endpoint bound to its handler method.
#[derive(Debug)]
pub struct Operation {
    meta: OperationMeta,
    timeout: Duration,
    args: Vec<Arg>,
}

impl Operation {
    #[must_use]
    pub fn meta(&self) -> &OperationMeta {
        &self.meta
    }

    #[must_use]
    pub fn http_method(&self) -> &Method {
        &self.meta.method
    }

    #[must_use]
    pub fn path_template(&self) -> &str {
        &self.meta.path_template
    }

    #[must_use]
    pub fn operation_id(&self) -> &str {
        &self.meta.operation_id
    }

    #[must_use]
    pub fn controller_name(&self) -> &str {
        &self.meta.controller_name
    }

    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.meta.method_name
    }

    #[must_use]
    pub fn parameters(&self) -> &[crate::spec::ParamSpec] {
        &self.meta.parameters
    }

    #[must_use]
    pub fn required_roles(&self) -> Option<&crate::spec::RoleRequirement> {
        self.meta.required_roles.as_ref()
    }

    /// Invocation deadline: the method's override, else the configured default.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn timeout_millis(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Inputs handed to the handler, in order.
    #[must_use]
    pub fn args(&self) -> &[Arg] {
        &self.args
    }
}

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub operation: Arc<Operation>,
    pub path_params: ParamVec,
}

impl RouteMatch {
    /// Get a path capture by name (raw, not percent-decoded).
    ///
    /// Uses "last write wins" if the template repeats a name.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Outcome of [`RouteTable::lookup`].
#[derive(Debug, Clone)]
pub enum RouteLookup {
    Found(RouteMatch),
    /// The path exists, but not for this verb
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

/// Failure while building the route table. Always fatal at startup.
#[derive(Debug)]
pub enum RouteTableError {
    Spec(SpecLoadError),
    Registry(RegistryError),
    /// Two operations resolve to the same verb and path shape
    DuplicateRoute {
        method: Method,
        path: String,
        first: String,
        second: String,
    },
    /// A path template could not be compiled
    InvalidPattern { path: String, message: String },
}

impl fmt::Display for RouteTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTableError::Spec(e) => write!(f, "{e}"),
            RouteTableError::Registry(e) => write!(f, "{e}"),
            RouteTableError::DuplicateRoute {
                method,
                path,
                first,
                second,
            } => write!(
                f,
                "duplicate route {method} {path}: operations '{first}' and '{second}'"
            ),
            RouteTableError::InvalidPattern { path, message } => {
                write!(f, "invalid path template '{path}': {message}")
            }
        }
    }
}

impl std::error::Error for RouteTableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RouteTableError::Spec(e) => Some(e),
            RouteTableError::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SpecLoadError> for RouteTableError {
    fn from(e: SpecLoadError) -> Self {
        RouteTableError::Spec(e)
    }
}

impl From<RegistryError> for RouteTableError {
    fn from(e: RegistryError) -> Self {
        RouteTableError::Registry(e)
    }
}

#[derive(Debug)]
struct Route {
    method: Method,
    regex: Regex,
    param_names: Vec<Arc<str>>,
    operation: Arc<Operation>,
}

/// Immutable mapping from (verb, path) to [`Operation`].
pub struct RouteTable {
    routes: Vec<Route>,
    registry: Arc<HandlerRegistry>,
    mount_prefix: String,
}

impl RouteTable {
    /// Build the table from a merged contract.
    ///
    /// Routes match the declared path templates. `servers` URLs are not
    /// consulted; set `mount_prefix` in the config to serve under a prefix.
    /// Every operation's controller and method must resolve through
    /// `registry`; the first failure aborts construction.
    pub fn build(
        merged: &MergedSpec,
        registry: Arc<HandlerRegistry>,
        config: &DispatcherConfig,
    ) -> Result<Self, RouteTableError> {
        let operations = build_operations(merged)?;
        Self::from_operations(
            operations,
            &config.mount_prefix,
            registry,
            config.default_timeout(),
        )
    }

    /// Build the table from already derived operations, each template
    /// placed under `mount_prefix` (pass `""` for none).
    pub fn from_operations(
        operations: Vec<OperationMeta>,
        mount_prefix: &str,
        registry: Arc<HandlerRegistry>,
        default_timeout: Duration,
    ) -> Result<Self, RouteTableError> {
        let mount_prefix = mount_prefix.trim_end_matches('/').to_string();
        let mut routes = Vec::with_capacity(operations.len());
        let mut seen: HashMap<(Method, String), String> = HashMap::new();

        for meta in operations {
            let handler = registry.resolve_method(&meta.controller_name, &meta.method_name)?;

            let shape = (meta.method.clone(), template_shape(&meta.path_template));
            if let Some(first) = seen.get(&shape) {
                return Err(RouteTableError::DuplicateRoute {
                    method: meta.method.clone(),
                    path: meta.path_template.clone(),
                    first: first.clone(),
                    second: meta.operation_id.clone(),
                });
            }
            seen.insert(shape, meta.operation_id.clone());

            let full_path = mount(&mount_prefix, &meta.path_template);
            let (regex, param_names) = path_to_regex(&full_path)?;

            let options = handler.options();
            let timeout = options.timeout_override().unwrap_or(default_timeout);
            let args = options
                .declared_args()
                .map(<[Arg]>::to_vec)
                .unwrap_or_else(|| default_args(&meta));
            let operation = Arc::new(Operation {
                meta,
                timeout,
                args,
            });

            debug!(
                method = %operation.http_method(),
                path = %full_path,
                operation_id = %operation.operation_id(),
                timeout_ms = operation.timeout_millis(),
                "Route compiled"
            );

            routes.push(Route {
                method: operation.http_method().clone(),
                regex,
                param_names,
                operation,
            });
        }

        // Fewer captures first, so literal templates win; stable for ties.
        routes.sort_by_key(|r| r.param_names.len());

        let routes_summary: Vec<String> = routes
            .iter()
            .take(10)
            .map(|r| format!("{} {}", r.method, mount(&mount_prefix, r.operation.path_template())))
            .collect();
        info!(
            routes_count = routes.len(),
            mount_prefix = %mount_prefix,
            routes_summary = ?routes_summary,
            "Route table loaded"
        );

        Ok(Self {
            routes,
            registry,
            mount_prefix,
        })
    }

    /// Match a request. Read-only; safe to call concurrently.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> RouteLookup {
        let mut allowed: Vec<Method> = Vec::new();
        for route in &self.routes {
            let Some(caps) = route.regex.captures(path) else {
                continue;
            };
            if route.method != *method {
                if !allowed.contains(&route.method) {
                    allowed.push(route.method.clone());
                }
                continue;
            }
            let path_params: ParamVec = route
                .param_names
                .iter()
                .enumerate()
                .filter_map(|(i, name)| {
                    caps.get(i + 1)
                        .map(|m| (Arc::clone(name), m.as_str().to_string()))
                })
                .collect();
            debug!(
                method = %method,
                path = %path,
                operation_id = %route.operation.operation_id(),
                path_params = ?path_params,
                "Route matched"
            );
            return RouteLookup::Found(RouteMatch {
                operation: Arc::clone(&route.operation),
                path_params,
            });
        }
        if allowed.is_empty() {
            debug!(method = %method, path = %path, "No route matched");
            RouteLookup::NotFound
        } else {
            RouteLookup::MethodNotAllowed { allowed }
        }
    }

    /// Operations in match-precedence order.
    pub fn operations(&self) -> impl Iterator<Item = &Arc<Operation>> {
        self.routes.iter().map(|r| &r.operation)
    }

    /// Find an operation by its identifier.
    #[must_use]
    pub fn operation(&self, operation_id: &str) -> Option<&Arc<Operation>> {
        self.operations().find(|op| op.operation_id() == operation_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Prefix in front of every template, without a trailing slash.
    #[must_use]
    pub fn mount_prefix(&self) -> &str {
        &self.mount_prefix
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("mount_prefix", &self.mount_prefix)
            .field("routes", &self.routes.len())
            .finish_non_exhaustive()
    }
}

/// Bind every declared parameter in declaration order.
fn default_args(meta: &OperationMeta) -> Vec<Arg> {
    meta.parameters
        .iter()
        .map(|p| match p.location {
            ParamLocation::Body => Arg::Body,
            _ => Arg::Param(p.name.clone()),
        })
        .collect()
}

fn mount(prefix: &str, template: &str) -> String {
    if template == "/" && !prefix.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}{template}")
    }
}

/// `/users/{id}/posts/{postId}` -> `/users/{}/posts/{}`
fn template_shape(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut in_param = false;
    for c in template.chars() {
        match c {
            '{' => {
                in_param = true;
                out.push_str("{}");
            }
            '}' => in_param = false,
            _ if in_param => {}
            _ => out.push(c),
        }
    }
    out
}

/// Convert a path template to an anchored regex and its capture names.
///
/// Each `{name}` becomes `([^/]+)`; everything else is matched literally.
/// Captures may share a segment with literal text (`/files/{name}.json`).
pub(crate) fn path_to_regex(path: &str) -> Result<(Regex, Vec<Arc<str>>), RouteTableError> {
    let mut pattern = String::with_capacity(path.len() + 8);
    pattern.push('^');
    let mut param_names: Vec<Arc<str>> = Vec::with_capacity(path.matches('{').count());
    let mut rest = path;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|i| open + i) else {
            return Err(RouteTableError::InvalidPattern {
                path: path.to_string(),
                message: "unbalanced '{'".to_string(),
            });
        };
        let name = &rest[open + 1..close];
        if name.is_empty() || name.contains('/') {
            return Err(RouteTableError::InvalidPattern {
                path: path.to_string(),
                message: format!("invalid parameter name '{name}'"),
            });
        }
        pattern.push_str(&regex::escape(&rest[..open]));
        pattern.push_str("([^/]+)");
        param_names.push(Arc::from(name));
        rest = &rest[close + 1..];
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');

    let regex = Regex::new(&pattern).map_err(|e| RouteTableError::InvalidPattern {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    Ok((regex, param_names))
}

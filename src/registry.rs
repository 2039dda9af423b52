//! # Handler Registry
//!
//! Maps controller names from `operationId`s (`<controller>.<method>`) to live
//! [`Controller`] instances supplied by the host application.
//!
//! The host provides a lookup function; the registry calls it at most once per
//! distinct controller name and memoizes the outcome (including "not found")
//! for its own lifetime. Concurrent first resolutions of the same name block on
//! a per-name cell, so two instances are never created for one name.
//!
//! ```rust,ignore
//! use openapi_dispatcher::registry::{Controller, HandlerRegistry, MethodOptions, Reply};
//! use std::time::Duration;
//!
//! let users = Controller::new("users")
//!     .method("get", MethodOptions::new().timeout(Duration::from_secs(2)), |args| async move {
//!         let id = args.int("id")?;
//!         Reply::json(&serde_json::json!({ "id": id }))
//!     });
//! let registry = HandlerRegistry::from_controllers([users]);
//! ```

use crate::binder::{Arg, Args};
use crate::error::ApiError;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Future returned by a handler method.
pub type HandlerFuture = BoxFuture<'static, Result<Reply, ApiError>>;

/// Type-erased handler method.
pub type HandlerFn = Arc<dyn Fn(Args) -> HandlerFuture + Send + Sync>;

/// Host-supplied controller lookup.
pub type ControllerLookup = Arc<dyn Fn(&str) -> Option<Controller> + Send + Sync>;

/// Value returned by a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Structured value, written as `application/json`
    Json(Value),
    /// Plain value, written as its textual form
    Text(String),
    /// No value; the response ends without a body
    Empty,
}

impl Reply {
    /// Serialize any value into a reply.
    ///
    /// Objects and arrays become [`Reply::Json`], strings and numbers
    /// [`Reply::Text`], `null` [`Reply::Empty`].
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, ApiError> {
        Ok(Reply::from(serde_json::to_value(value)?))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Reply::Text(value.into())
    }

    #[must_use]
    pub fn empty() -> Self {
        Reply::Empty
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => Reply::Json(value),
            Value::Null => Reply::Empty,
            Value::String(s) => Reply::Text(s),
            other => Reply::Text(other.to_string()),
        }
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::Empty
    }
}

impl From<String> for Reply {
    fn from(value: String) -> Self {
        Reply::Text(value)
    }
}

impl From<&str> for Reply {
    fn from(value: &str) -> Self {
        Reply::Text(value.to_string())
    }
}

/// Registration-time metadata of a handler method.
#[derive(Debug, Clone, Default)]
pub struct MethodOptions {
    timeout: Option<Duration>,
    args: Option<Vec<Arg>>,
}

impl MethodOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the process-wide invocation deadline for this method.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Declare the inputs the method expects, in order.
    ///
    /// Without this, every declared parameter of the operation is bound in
    /// declaration order.
    #[must_use]
    pub fn args<I: IntoIterator<Item = Arg>>(mut self, args: I) -> Self {
        self.args = Some(args.into_iter().collect());
        self
    }

    #[must_use]
    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    #[must_use]
    pub fn declared_args(&self) -> Option<&[Arg]> {
        self.args.as_deref()
    }
}

/// One callable method of a controller.
#[derive(Clone)]
pub struct HandlerMethod {
    name: String,
    options: MethodOptions,
    func: HandlerFn,
}

impl HandlerMethod {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn options(&self) -> &MethodOptions {
        &self.options
    }

    /// Start the method. The returned future is `'static` and can be spawned.
    #[must_use]
    pub fn call(&self, args: Args) -> HandlerFuture {
        (self.func)(args)
    }
}

impl fmt::Debug for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A handler instance: a named table of methods.
#[derive(Clone, Debug)]
pub struct Controller {
    name: String,
    methods: HashMap<String, Arc<HandlerMethod>>,
}

impl Controller {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Register a method. A later registration under the same name replaces
    /// the earlier one.
    #[must_use]
    pub fn method<F, Fut, R>(mut self, name: impl Into<String>, options: MethodOptions, f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
        R: Into<Reply> + 'static,
    {
        let name = name.into();
        let func: HandlerFn = Arc::new(move |args| f(args).map(|r| r.map(Into::into)).boxed());
        self.methods.insert(
            name.clone(),
            Arc::new(HandlerMethod {
                name,
                options,
                func,
            }),
        );
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn get(&self, method: &str) -> Option<Arc<HandlerMethod>> {
        self.methods.get(method).cloned()
    }

    /// Method names, sorted.
    #[must_use]
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Failure to resolve a controller or one of its methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The lookup function returned nothing for this name
    HandlerNotFound { controller: String },
    /// The controller exists but has no such method
    HandlerMethodNotFound { controller: String, method: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::HandlerNotFound { controller } => {
                write!(f, "no handler registered for controller '{controller}'")
            }
            RegistryError::HandlerMethodNotFound { controller, method } => {
                write!(f, "controller '{controller}' has no method '{method}'")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Lazily populated, per-registry cache of controller instances.
pub struct HandlerRegistry {
    lookup: ControllerLookup,
    instances: DashMap<String, Arc<OnceCell<Option<Arc<Controller>>>>>,
}

impl HandlerRegistry {
    /// Create a registry around a host lookup function.
    pub fn new<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<Controller> + Send + Sync + 'static,
    {
        Self {
            lookup: Arc::new(lookup),
            instances: DashMap::new(),
        }
    }

    /// Create a registry from explicit registrations.
    pub fn from_controllers<I: IntoIterator<Item = Controller>>(controllers: I) -> Self {
        let table: HashMap<String, Controller> = controllers
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        info!(controllers = table.len(), "Controllers registered");
        Self::new(move |name| table.get(name).cloned())
    }

    /// Resolve a controller instance, calling the lookup at most once per name.
    pub fn resolve(&self, controller: &str) -> Result<Arc<Controller>, RegistryError> {
        // Clone the cell out so the map shard lock is not held during lookup.
        let cell = Arc::clone(
            self.instances
                .entry(controller.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );
        let resolved = cell.get_or_init(|| {
            let found = (self.lookup)(controller).map(Arc::new);
            debug!(
                controller = %controller,
                found = found.is_some(),
                "Controller lookup"
            );
            found
        });
        resolved
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| RegistryError::HandlerNotFound {
                controller: controller.to_string(),
            })
    }

    /// Resolve `controller.method`.
    pub fn resolve_method(
        &self,
        controller: &str,
        method: &str,
    ) -> Result<Arc<HandlerMethod>, RegistryError> {
        self.resolve(controller)?
            .get(method)
            .ok_or_else(|| RegistryError::HandlerMethodNotFound {
                controller: controller.to_string(),
                method: method.to_string(),
            })
    }

    /// Number of controller names resolved so far (found or not).
    #[must_use]
    pub fn cached(&self) -> usize {
        self.instances.len()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("cached", &self.instances.len())
            .finish_non_exhaustive()
    }
}

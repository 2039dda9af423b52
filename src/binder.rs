//! # Parameter Binder
//!
//! Turns a matched request into the ordered inputs a handler method expects.
//!
//! Each method declares its inputs as a list of [`Arg`]s (or gets one
//! [`Arg::Param`] per declared parameter by default). Binding rules, in order:
//!
//! 1. [`Arg::Context`] receives the request context itself.
//! 2. [`Arg::Body`], [`Arg::BodyText`] and [`Arg::BodyField`] read the request
//!    body, which is parsed at most once per request.
//! 3. [`Arg::Param`] is matched by name against the operation's declared
//!    parameters: path captures are percent-decoded and coerced to the declared
//!    type, query parameters yield all values for list types and the first
//!    value otherwise, header and cookie parameters are read by name.
//! 4. Anything without a value is bound as [`ArgValue::Null`]. A handler asking
//!    for a required value that is null gets a 400 from the accessor.
//!
//! Coercion failures (`"abc"` for an integer) are binding errors (400), never a
//! silent null.

use crate::context::SharedContext;
use crate::error::ApiError;
use crate::router::Operation;
use crate::spec::{ParamLocation, ParamSpec, ParamType};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One declared input of a handler method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// The request context
    Context,
    /// A declared parameter, by name
    Param(String),
    /// The whole body as a structured value
    Body,
    /// The whole body as raw text
    BodyText,
    /// A single field of a JSON object body
    BodyField(String),
}

impl Arg {
    pub fn param(name: impl Into<String>) -> Self {
        Arg::Param(name.into())
    }

    pub fn body_field(name: impl Into<String>) -> Self {
        Arg::BodyField(name.into())
    }

    /// Name under which the bound value is exposed in [`Args`].
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Arg::Context => "context",
            Arg::Param(name) | Arg::BodyField(name) => name,
            Arg::Body | Arg::BodyText => crate::spec::BODY_PARAM,
        }
    }
}

/// A bound input value.
#[derive(Debug, Clone)]
pub enum ArgValue {
    Context(SharedContext),
    Null,
    String(String),
    Integer(i64),
    Boolean(bool),
    StringList(Vec<String>),
    Json(Value),
    Text(String),
}

impl ArgValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, ArgValue::Null)
    }
}

/// The bound inputs of one invocation, plus the cancellation signal.
#[derive(Debug, Clone)]
pub struct Args {
    values: Vec<(String, ArgValue)>,
    context: SharedContext,
    cancel: CancellationToken,
}

fn missing(name: &str) -> ApiError {
    ApiError::bad_request(format!("Missing required argument '{name}'")).with_detail(name)
}

fn mistyped(name: &str, expected: &str) -> ApiError {
    ApiError::bad_request(format!("Argument '{name}' is not {expected}")).with_detail(name)
}

impl Args {
    pub(crate) fn new(
        values: Vec<(String, ArgValue)>,
        context: SharedContext,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            values,
            context,
            cancel,
        }
    }

    /// Bound value by key. Keys are parameter names, field names, `body` or `context`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Bound value by position.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&ArgValue> {
        self.values.get(index).map(|(_, v)| v)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    /// Signalled when the invocation deadline expires. Check it before
    /// acquiring resources and release them on every exit path.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn present(&self, name: &str) -> Option<&ArgValue> {
        self.get(name).filter(|v| !v.is_null())
    }

    pub fn opt_int(&self, name: &str) -> Result<Option<i64>, ApiError> {
        match self.present(name) {
            None => Ok(None),
            Some(ArgValue::Integer(i)) => Ok(Some(*i)),
            Some(ArgValue::Json(v)) => v.as_i64().map(Some).ok_or_else(|| mistyped(name, "an integer")),
            Some(_) => Err(mistyped(name, "an integer")),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, ApiError> {
        self.opt_int(name)?.ok_or_else(|| missing(name))
    }

    pub fn opt_bool(&self, name: &str) -> Result<Option<bool>, ApiError> {
        match self.present(name) {
            None => Ok(None),
            Some(ArgValue::Boolean(b)) => Ok(Some(*b)),
            Some(ArgValue::Json(v)) => v.as_bool().map(Some).ok_or_else(|| mistyped(name, "a boolean")),
            Some(_) => Err(mistyped(name, "a boolean")),
        }
    }

    pub fn bool(&self, name: &str) -> Result<bool, ApiError> {
        self.opt_bool(name)?.ok_or_else(|| missing(name))
    }

    pub fn opt_string(&self, name: &str) -> Result<Option<String>, ApiError> {
        match self.present(name) {
            None => Ok(None),
            Some(ArgValue::String(s) | ArgValue::Text(s)) => Ok(Some(s.clone())),
            Some(ArgValue::Integer(i)) => Ok(Some(i.to_string())),
            Some(ArgValue::Boolean(b)) => Ok(Some(b.to_string())),
            Some(ArgValue::Json(Value::String(s))) => Ok(Some(s.clone())),
            Some(_) => Err(mistyped(name, "a string")),
        }
    }

    pub fn string(&self, name: &str) -> Result<String, ApiError> {
        self.opt_string(name)?.ok_or_else(|| missing(name))
    }

    /// All values of a list parameter; empty when absent.
    pub fn strings(&self, name: &str) -> Result<Vec<String>, ApiError> {
        match self.present(name) {
            None => Ok(Vec::new()),
            Some(ArgValue::StringList(v)) => Ok(v.clone()),
            Some(ArgValue::String(s)) => Ok(vec![s.clone()]),
            Some(_) => Err(mistyped(name, "a list of strings")),
        }
    }

    pub fn opt_json(&self, name: &str) -> Result<Option<&Value>, ApiError> {
        match self.present(name) {
            None => Ok(None),
            Some(ArgValue::Json(v)) => Ok(Some(v)),
            Some(_) => Err(mistyped(name, "a JSON value")),
        }
    }

    pub fn json(&self, name: &str) -> Result<&Value, ApiError> {
        self.opt_json(name)?.ok_or_else(|| missing(name))
    }

    /// Deserialize a structured argument (usually `body`) into `T`.
    pub fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<T, ApiError> {
        let value = self.json(name)?;
        serde_json::from_value(value.clone()).map_err(|e| {
            ApiError::bad_request(format!("Argument '{name}' has an unexpected shape"))
                .with_detail(name)
                .with_detail(e.to_string())
        })
    }

    /// The raw body text bound by [`Arg::BodyText`].
    pub fn text(&self, name: &str) -> Result<&str, ApiError> {
        match self.present(name) {
            Some(ArgValue::Text(s) | ArgValue::String(s)) => Ok(s),
            Some(_) => Err(mistyped(name, "text")),
            None => Err(missing(name)),
        }
    }
}

/// Binds request data to handler inputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParameterBinder;

impl ParameterBinder {
    /// Bind every input the operation's handler declares.
    pub fn bind(
        operation: &Operation,
        ctx: &SharedContext,
        cancel: CancellationToken,
    ) -> Result<Args, ApiError> {
        let mut values = Vec::with_capacity(operation.args().len());
        for arg in operation.args() {
            let value = match arg {
                Arg::Context => ArgValue::Context(Arc::clone(ctx)),
                Arg::Body => bind_body(ctx)?,
                Arg::BodyText => bind_body_text(ctx)?,
                Arg::BodyField(field) => match ctx.body_json()? {
                    Some(Value::Object(map)) => map
                        .get(field)
                        .cloned()
                        .map_or(ArgValue::Null, ArgValue::Json),
                    _ => ArgValue::Null,
                },
                Arg::Param(name) => match operation.parameters().iter().find(|p| &p.name == name) {
                    Some(spec) => bind_param(spec, ctx)?,
                    None => ArgValue::Null,
                },
            };
            values.push((arg.key().to_string(), value));
        }
        debug!(
            request_id = %ctx.request_id(),
            operation_id = %operation.operation_id(),
            bound = values.len(),
            "Parameters bound"
        );
        Ok(Args::new(values, Arc::clone(ctx), cancel))
    }
}

fn bind_body(ctx: &SharedContext) -> Result<ArgValue, ApiError> {
    Ok(ctx
        .body_json()?
        .cloned()
        .map_or(ArgValue::Null, ArgValue::Json))
}

fn bind_body_text(ctx: &SharedContext) -> Result<ArgValue, ApiError> {
    let text = ctx.body_text()?;
    Ok(if text.is_empty() {
        ArgValue::Null
    } else {
        ArgValue::Text(text.to_string())
    })
}

fn bind_param(spec: &ParamSpec, ctx: &SharedContext) -> Result<ArgValue, ApiError> {
    match spec.location {
        ParamLocation::Path => {
            let raw = ctx.path_param(&spec.name).ok_or_else(|| {
                ApiError::not_found(format!("Path parameter '{}' not present", spec.name))
                    .with_detail(spec.name.as_str())
            })?;
            let decoded = urlencoding::decode(raw)
                .map_err(|_| binding_error(&spec.name, raw))?
                .into_owned();
            coerce(spec, &decoded)
        }
        ParamLocation::Query => {
            if spec.declared_type == ParamType::StringList {
                let all: Vec<String> = ctx
                    .query_params_all(&spec.name)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                return Ok(if all.is_empty() {
                    ArgValue::Null
                } else {
                    ArgValue::StringList(all)
                });
            }
            ctx.query_param(&spec.name)
                .map_or(Ok(ArgValue::Null), |v| coerce(spec, v))
        }
        ParamLocation::Header => ctx
            .header(&spec.name)
            .map_or(Ok(ArgValue::Null), |v| coerce(spec, v)),
        ParamLocation::Cookie => ctx
            .cookie(&spec.name)
            .map_or(Ok(ArgValue::Null), |v| coerce(spec, v)),
        ParamLocation::Body => bind_body(ctx),
    }
}

fn binding_error(name: &str, raw: &str) -> ApiError {
    ApiError::binding(format!("Invalid value for parameter '{name}'"))
        .with_detail(name)
        .with_detail(raw)
}

/// Coerce a raw string to the declared primitive type.
fn coerce(spec: &ParamSpec, raw: &str) -> Result<ArgValue, ApiError> {
    match spec.declared_type {
        ParamType::String => Ok(ArgValue::String(raw.to_string())),
        ParamType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(ArgValue::Integer)
            .map_err(|_| binding_error(&spec.name, raw)),
        ParamType::Boolean => match raw.trim() {
            "true" => Ok(ArgValue::Boolean(true)),
            "false" => Ok(ArgValue::Boolean(false)),
            _ => Err(binding_error(&spec.name, raw)),
        },
        // Non-query lists use the simple style: `a,b,c`.
        ParamType::StringList => Ok(ArgValue::StringList(
            raw.split(',').map(str::to_string).collect(),
        )),
        ParamType::Structured => serde_json::from_str(raw)
            .map(ArgValue::Json)
            .map_err(|_| binding_error(&spec.name, raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, location: ParamLocation, declared_type: ParamType) -> ParamSpec {
        ParamSpec {
            name: name.to_string(),
            location,
            declared_type,
            required: true,
            schema: None,
        }
    }

    #[test]
    fn test_coerce_integer() {
        let s = spec("id", ParamLocation::Path, ParamType::Integer);
        assert!(matches!(coerce(&s, "42"), Ok(ArgValue::Integer(42))));
        let err = coerce(&s, "abc").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Binding);
        assert_eq!(err.details(), &[Value::from("id"), Value::from("abc")]);
    }

    #[test]
    fn test_coerce_boolean_is_strict() {
        let s = spec("flag", ParamLocation::Query, ParamType::Boolean);
        assert!(matches!(coerce(&s, "true"), Ok(ArgValue::Boolean(true))));
        assert!(matches!(coerce(&s, "false"), Ok(ArgValue::Boolean(false))));
        assert!(coerce(&s, "yes").is_err());
        assert!(coerce(&s, "1").is_err());
    }

    #[test]
    fn test_coerce_list_and_string() {
        let s = spec("ids", ParamLocation::Header, ParamType::StringList);
        match coerce(&s, "a,b").unwrap() {
            ArgValue::StringList(v) => assert_eq!(v, vec!["a", "b"]),
            other => panic!("unexpected {other:?}"),
        }
        let s = spec("name", ParamLocation::Query, ParamType::String);
        assert!(matches!(coerce(&s, "007"), Ok(ArgValue::String(v)) if v == "007"));
    }

    #[test]
    fn test_arg_keys() {
        assert_eq!(Arg::Context.key(), "context");
        assert_eq!(Arg::param("id").key(), "id");
        assert_eq!(Arg::Body.key(), "body");
        assert_eq!(Arg::BodyText.key(), "body");
        assert_eq!(Arg::body_field("name").key(), "name");
    }
}

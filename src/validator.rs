//! # Request Validation
//!
//! The schema-validation collaborator the dispatcher calls between
//! authorization and binding.
//!
//! [`SchemaValidator`] checks:
//!
//! - presence of required query, header and cookie parameters
//! - presence of a required request body
//! - the JSON body against the operation's `application/json` schema
//!
//! Compiled schemas are cached per operation for the validator's lifetime.
//! A schema that fails to compile is logged once and that operation's bodies
//! are accepted unchecked.

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::router::{Operation, RouteTable};
use crate::spec::ParamLocation;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Checks a request against its operation's declared shape.
pub trait RequestValidator: Send + Sync {
    fn validate<'a>(
        &'a self,
        operation: &'a Operation,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<(), ApiError>>;
}

/// Accepts every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopValidator;

impl RequestValidator for NoopValidator {
    fn validate<'a>(
        &'a self,
        _operation: &'a Operation,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async { Ok(()) })
    }
}

type CompiledSchema = Option<Arc<jsonschema::Validator>>;

/// JSON-schema backed request validation.
#[derive(Default)]
pub struct SchemaValidator {
    compiled: DashMap<String, CompiledSchema>,
}

impl SchemaValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every request schema up front. Returns the number compiled.
    pub fn precompile(&self, table: &RouteTable) -> usize {
        let count = table
            .operations()
            .filter(|op| self.compiled_for(op).is_some())
            .count();
        info!(compiled = count, "Request schemas precompiled");
        count
    }

    fn compiled_for(&self, operation: &Operation) -> CompiledSchema {
        let schema = operation.meta().request_schema.as_ref()?;
        if let Some(hit) = self.compiled.get(operation.operation_id()) {
            return hit.value().clone();
        }
        let compiled = match jsonschema::validator_for(schema) {
            Ok(v) => Some(Arc::new(v)),
            Err(e) => {
                warn!(
                    operation_id = %operation.operation_id(),
                    error = %e,
                    "Request schema failed to compile; bodies will not be checked"
                );
                None
            }
        };
        self.compiled
            .entry(operation.operation_id().to_string())
            .or_insert(compiled)
            .value()
            .clone()
    }

    fn check(&self, operation: &Operation, ctx: &RequestContext) -> Result<(), ApiError> {
        let mut violations: Vec<Value> = Vec::new();

        for param in operation.parameters() {
            if !param.required {
                continue;
            }
            let present = match param.location {
                ParamLocation::Query => ctx.query_param(&param.name).is_some(),
                ParamLocation::Header => ctx.header(&param.name).is_some(),
                ParamLocation::Cookie => ctx.cookie(&param.name).is_some(),
                // Path captures exist once routed; the body is checked below.
                ParamLocation::Path | ParamLocation::Body => true,
            };
            if !present {
                violations.push(Value::from(format!(
                    "missing required {} parameter '{}'",
                    param.location, param.name
                )));
            }
        }

        let body = ctx.body_json()?;
        match body {
            None if operation.meta().request_body_required => {
                violations.push(Value::from("request body is required"));
            }
            None => {}
            Some(instance) => {
                if let Some(validator) = self.compiled_for(operation) {
                    violations.extend(
                        validator
                            .iter_errors(instance)
                            .map(|e| Value::from(e.to_string())),
                    );
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            debug!(
                operation_id = %operation.operation_id(),
                violations = violations.len(),
                "Request failed validation"
            );
            Err(ApiError::validation("Request validation failed").with_details(violations))
        }
    }
}

impl RequestValidator for SchemaValidator {
    fn validate<'a>(
        &'a self,
        operation: &'a Operation,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move { self.check(operation, ctx) })
    }
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("compiled", &self.compiled.len())
            .finish()
    }
}

use super::types::{OperationMeta, ParamLocation, ParamSpec, ParamType, RoleRequirement};
use super::{MergedSpec, SpecLoadError};
use oas3::spec::{ObjectOrReference, Operation, Parameter};
use oas3::OpenApiV3Spec;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Extension carrying the role requirement of an operation.
pub const ROLES_EXTENSION: &str = "x-auth-roles";

/// Name of the synthetic parameter standing for the request body.
pub const BODY_PARAM: &str = "body";

/// Resolve a `#/components/schemas/*` reference.
pub fn resolve_schema_ref<'a>(
    spec: &'a OpenApiV3Spec,
    ref_path: &str,
) -> Option<&'a oas3::spec::ObjectSchema> {
    let name = ref_path.strip_prefix("#/components/schemas/")?;
    spec.components
        .as_ref()?
        .schemas
        .get(name)
        .and_then(|schema_ref| match schema_ref {
            ObjectOrReference::Object(schema) => Some(schema),
            _ => None,
        })
}

/// Replace every `$ref` below `value` with the referenced schema.
///
/// Self-referencing schemas are expanded once per branch; a reference already
/// being expanded higher up the tree is left as a `$ref`.
pub fn expand_schema_refs(spec: &OpenApiV3Spec, value: &mut Value) {
    let mut stack = Vec::new();
    expand_inner(spec, value, &mut stack);
}

fn expand_inner(spec: &OpenApiV3Spec, value: &mut Value, stack: &mut Vec<String>) {
    match value {
        Value::Object(obj) => {
            if let Some(ref_path) = obj.get("$ref").and_then(Value::as_str) {
                let ref_path = ref_path.to_string();
                if stack.contains(&ref_path) {
                    return;
                }
                if let Some(mut resolved) =
                    resolve_schema_ref(spec, &ref_path).and_then(|s| serde_json::to_value(s).ok())
                {
                    stack.push(ref_path);
                    expand_inner(spec, &mut resolved, stack);
                    stack.pop();
                    *value = resolved;
                    return;
                }
            }
            for v in obj.values_mut() {
                expand_inner(spec, v, stack);
            }
        }
        Value::Array(arr) => {
            for v in arr.iter_mut() {
                expand_inner(spec, v, stack);
            }
        }
        _ => {}
    }
}

fn resolve_parameter_ref<'a>(spec: &'a OpenApiV3Spec, ref_path: &str) -> Option<&'a Parameter> {
    let name = ref_path.strip_prefix("#/components/parameters/")?;
    spec.components
        .as_ref()?
        .parameters
        .get(name)
        .and_then(|param_ref| match param_ref {
            ObjectOrReference::Object(param) => Some(param),
            _ => None,
        })
}

/// Resolve declared parameters, following `#/components/parameters/*` refs.
pub fn extract_parameters(
    spec: &OpenApiV3Spec,
    params: &[ObjectOrReference<Parameter>],
) -> Vec<ParamSpec> {
    let mut out = Vec::with_capacity(params.len());
    for p in params {
        let param = match p {
            ObjectOrReference::Object(obj) => Some(obj),
            ObjectOrReference::Ref { ref_path, .. } => resolve_parameter_ref(spec, ref_path),
        };
        let Some(param) = param else {
            warn!(parameter = ?p, "Unresolvable parameter reference ignored");
            continue;
        };

        let mut schema = param.schema.as_ref().and_then(|s| match s {
            ObjectOrReference::Object(obj) => serde_json::to_value(obj).ok(),
            ObjectOrReference::Ref { ref_path, .. } => {
                resolve_schema_ref(spec, ref_path).and_then(|sch| serde_json::to_value(sch).ok())
            }
        });
        if let Some(ref mut val) = schema {
            expand_schema_refs(spec, val);
        }

        let location = ParamLocation::from(param.location);
        out.push(ParamSpec {
            name: param.name.clone(),
            location,
            declared_type: ParamType::from_schema(schema.as_ref()),
            // Path parameters are always required.
            required: location == ParamLocation::Path || param.required.unwrap_or(false),
            schema,
        });
    }
    out
}

/// The `application/json` request schema and whether a body is required.
pub fn extract_request_schema(spec: &OpenApiV3Spec, operation: &Operation) -> (Option<Value>, bool) {
    let mut required = false;
    let mut declared = false;
    let mut schema = operation.request_body.as_ref().and_then(|r| match r {
        ObjectOrReference::Object(req_body) => {
            declared = true;
            required = req_body.required.unwrap_or(false);
            req_body
                .content
                .get("application/json")
                .and_then(|media| match media.schema.as_ref()? {
                    ObjectOrReference::Object(schema_obj) => serde_json::to_value(schema_obj).ok(),
                    ObjectOrReference::Ref { ref_path, .. } => {
                        resolve_schema_ref(spec, ref_path).and_then(|s| serde_json::to_value(s).ok())
                    }
                })
        }
        ObjectOrReference::Ref { .. } => {
            declared = true;
            None
        }
    });
    if let Some(ref mut val) = schema {
        expand_schema_refs(spec, val);
    }
    if declared && schema.is_none() {
        // Body declared without a JSON schema: accept any JSON value.
        schema = Some(Value::Object(serde_json::Map::new()));
    }
    (schema, required)
}

/// Read the role requirement from the operation's extensions.
///
/// The typed model may strip the `x-` prefix, so both spellings are accepted.
pub fn extract_role_requirement(
    operation: &Operation,
    location: &str,
) -> Result<Option<RoleRequirement>, SpecLoadError> {
    let raw = operation
        .extensions
        .iter()
        .find(|(key, _)| {
            key.as_str() == ROLES_EXTENSION || Some(key.as_str()) == ROLES_EXTENSION.strip_prefix("x-")
        })
        .map(|(_, v)| v);
    let Some(raw) = raw else {
        return Ok(None);
    };
    let requirement: RoleRequirement =
        serde_json::from_value(raw.clone()).map_err(|e| SpecLoadError::InvalidDocument {
            message: format!("{ROLES_EXTENSION} on {location}: {e}"),
        })?;
    Ok((!requirement.is_empty()).then_some(requirement))
}

/// Split `<controller>.<method>` into its two non-empty parts.
#[must_use]
pub fn split_operation_id(operation_id: &str) -> Option<(&str, &str)> {
    let mut parts = operation_id.split('.');
    let controller = parts.next()?;
    let method = parts.next()?;
    if parts.next().is_some() || controller.is_empty() || method.is_empty() {
        return None;
    }
    Some((controller, method))
}

/// Derive one [`OperationMeta`] per `path x verb` that carries an `operationId`.
///
/// Operations without an identifier are not routable and are skipped. A
/// malformed identifier fails the whole build.
pub fn build_operations(merged: &MergedSpec) -> Result<Vec<OperationMeta>, SpecLoadError> {
    let spec = merged.spec();
    let mut operations = Vec::new();

    let Some(paths_map) = spec.paths.as_ref() else {
        info!(operations = 0, "Specification declares no paths");
        return Ok(operations);
    };

    for (path, item) in paths_map {
        for (method, operation) in item.methods() {
            let location = format!("{method} {path}");
            let Some(operation_id) = operation.operation_id.clone() else {
                debug!(location = %location, "Operation without operationId skipped");
                continue;
            };
            let (controller_name, method_name) = split_operation_id(&operation_id)
                .map(|(c, m)| (c.to_string(), m.to_string()))
                .ok_or_else(|| SpecLoadError::MalformedOperationId {
                    operation_id: operation_id.clone(),
                    method: method.to_string(),
                    path: path.clone(),
                })?;

            let (request_schema, request_body_required) = extract_request_schema(spec, operation);

            let mut parameters = Vec::new();
            parameters.extend(extract_parameters(spec, &item.parameters));
            for p in extract_parameters(spec, &operation.parameters) {
                // Operation-level parameters override path-level ones.
                parameters.retain(|q: &ParamSpec| !(q.name == p.name && q.location == p.location));
                parameters.push(p);
            }
            if request_schema.is_some() {
                parameters.push(ParamSpec {
                    name: BODY_PARAM.to_string(),
                    location: ParamLocation::Body,
                    declared_type: ParamType::Structured,
                    required: request_body_required,
                    schema: request_schema.clone(),
                });
            }

            let required_roles = extract_role_requirement(operation, &location)?;

            operations.push(OperationMeta {
                method: method.clone(),
                path_template: path.clone(),
                operation_id,
                controller_name,
                method_name,
                parameters,
                required_roles,
                request_schema,
                request_body_required,
            });
        }
    }

    info!(
        operations = operations.len(),
        title = %spec.info.title,
        "Derived operations from specification"
    );
    Ok(operations)
}

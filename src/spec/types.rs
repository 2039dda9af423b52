use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Where a parameter value is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
    /// The request body (one synthetic parameter per operation)
    Body,
}

impl std::fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
            ParamLocation::Cookie => "cookie",
            ParamLocation::Body => "body",
        };
        f.write_str(s)
    }
}

impl From<oas3::spec::ParameterIn> for ParamLocation {
    fn from(loc: oas3::spec::ParameterIn) -> Self {
        match loc {
            oas3::spec::ParameterIn::Path => ParamLocation::Path,
            oas3::spec::ParameterIn::Query => ParamLocation::Query,
            oas3::spec::ParameterIn::Header => ParamLocation::Header,
            oas3::spec::ParameterIn::Cookie => ParamLocation::Cookie,
        }
    }
}

/// Declared primitive type of a parameter, derived from its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    /// Repeated query parameter, e.g. `?tag=a&tag=b`
    StringList,
    /// Parsed JSON body
    Structured,
}

impl ParamType {
    /// Map a JSON schema onto a declared type. Missing or unknown types are strings.
    #[must_use]
    pub fn from_schema(schema: Option<&Value>) -> Self {
        match schema.and_then(|s| s.get("type")).and_then(Value::as_str) {
            Some("integer") => ParamType::Integer,
            Some("boolean") => ParamType::Boolean,
            Some("array") => ParamType::StringList,
            _ => ParamType::String,
        }
    }
}

/// One declared input of an operation.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub location: ParamLocation,
    pub declared_type: ParamType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// Role rule attached to an operation via the `x-auth-roles` extension.
///
/// All present groups must pass. A requirement with no groups authorizes
/// everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRequirement {
    /// Exactly one of these roles must be held
    #[serde(rename = "oneOf", default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<BTreeSet<String>>,
    /// At least one of these roles must be held
    #[serde(rename = "anyOf", default, skip_serializing_if = "Option::is_none")]
    pub any_of: Option<BTreeSet<String>>,
    /// The caller's role set must equal this set
    #[serde(rename = "allOf", default, skip_serializing_if = "Option::is_none")]
    pub all_of: Option<BTreeSet<String>>,
}

impl RoleRequirement {
    pub fn one_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            one_of: Some(roles.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn any_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            any_of: Some(roles.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn all_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            all_of: Some(roles.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// `true` when no group is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.one_of.is_none() && self.any_of.is_none() && self.all_of.is_none()
    }
}

/// An operation as declared by the merged contract, before handler resolution.
#[derive(Debug, Clone)]
pub struct OperationMeta {
    pub method: Method,
    /// Template relative to the base path, e.g. `/users/{id}`
    pub path_template: String,
    pub operation_id: String,
    pub controller_name: String,
    pub method_name: String,
    /// Path-item parameters first, then operation parameters, then `body`
    pub parameters: Vec<ParamSpec>,
    pub required_roles: Option<RoleRequirement>,
    /// `application/json` request schema with `$ref`s expanded
    pub request_schema: Option<Value>,
    pub request_body_required: bool,
}

impl OperationMeta {
    /// Look up a declared parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_param_type_from_schema() {
        assert_eq!(
            ParamType::from_schema(Some(&json!({"type": "integer", "format": "int64"}))),
            ParamType::Integer
        );
        assert_eq!(
            ParamType::from_schema(Some(&json!({"type": "boolean"}))),
            ParamType::Boolean
        );
        assert_eq!(
            ParamType::from_schema(Some(&json!({"type": "array", "items": {"type": "string"}}))),
            ParamType::StringList
        );
        assert_eq!(
            ParamType::from_schema(Some(&json!({"type": "number"}))),
            ParamType::String
        );
        assert_eq!(ParamType::from_schema(None), ParamType::String);
    }

    #[test]
    fn test_role_requirement_deserializes_partial_groups() {
        let req: RoleRequirement = serde_json::from_value(json!({"anyOf": ["ADMIN"]})).unwrap();
        assert!(req.one_of.is_none());
        assert!(req.all_of.is_none());
        assert!(req.any_of.unwrap().contains("ADMIN"));

        let empty: RoleRequirement = serde_json::from_value(json!({})).unwrap();
        assert!(empty.is_empty());
    }
}

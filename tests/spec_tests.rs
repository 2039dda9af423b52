//! Contract loading and merging tests
//!
//! # Test Coverage
//!
//! - Merging a document with itself is a no-op
//! - Component entries from later documents win
//! - Conflicting path definitions abort the merge
//! - Directory discovery merges in lexicographic order
//! - Malformed `operationId`s abort operation derivation
//! - Parameters, request schemas and role requirements are derived per operation

mod common;

use common::*;
use http::Method;
use openapi_dispatcher::spec::{
    build_operations, merge_all, merge_all_in_directory, MergedSpec, ParamLocation, ParamType,
    SpecLoadError,
};
use serde_json::{json, Value};
use std::fs;

fn users_doc() -> Value {
    json!({
        "openapi": "3.1.0",
        "info": { "title": "Users", "version": "1.0.0" },
        "servers": [{ "url": "http://localhost:8080/api" }],
        "paths": {
            "/users/{id}": {
                "get": {
                    "operationId": "users.get",
                    "parameters": [
                        { "name": "id", "in": "path", "required": true, "schema": { "type": "integer" } }
                    ],
                    "responses": { "200": { "description": "ok" } }
                }
            }
        },
        "components": {
            "schemas": {
                "User": { "type": "object", "properties": { "name": { "type": "string" } } }
            }
        }
    })
}

fn orders_doc() -> Value {
    json!({
        "openapi": "3.1.0",
        "info": { "title": "Orders", "version": "2.0.0" },
        "paths": {
            "/orders": {
                "post": {
                    "operationId": "orders.create",
                    "responses": { "201": { "description": "created" } }
                }
            }
        },
        "components": {
            "schemas": {
                "User": { "type": "object", "required": ["name"] }
            }
        }
    })
}

#[test]
fn test_merging_a_document_with_itself_changes_nothing() {
    let once = MergedSpec::from_documents([("users.yaml", users_doc())]).unwrap();
    let twice =
        MergedSpec::from_documents([("users.yaml", users_doc()), ("users.yaml", users_doc())])
            .unwrap();
    assert_eq!(once.document(), twice.document());
}

#[test]
fn test_later_component_entries_win() {
    let merged =
        MergedSpec::from_documents([("users.yaml", users_doc()), ("orders.yaml", orders_doc())])
            .unwrap();
    let doc = merged.document();

    assert_eq!(doc["components"]["schemas"]["User"]["required"], json!(["name"]));
    assert!(doc["components"]["schemas"]["User"].get("properties").is_none());
    assert_eq!(doc["info"]["title"], "Users");
    assert!(doc["paths"]["/users/{id}"].is_object());
    assert!(doc["paths"]["/orders"].is_object());
    assert_eq!(merged.sources(), ["users.yaml", "orders.yaml"]);
    assert_eq!(merged.base_path(), "/api");
}

#[test]
fn test_conflicting_path_definitions_are_rejected() {
    let mut other = users_doc();
    other["paths"]["/users/{id}"]["get"]["operationId"] = json!("people.get");

    let err = MergedSpec::from_documents([("a.yaml", users_doc()), ("b.yaml", other)]).unwrap_err();
    match err {
        SpecLoadError::DuplicatePath {
            path,
            first,
            second,
        } => {
            assert_eq!(path, "/users/{id}");
            assert_eq!(first, "a.yaml");
            assert_eq!(second, "b.yaml");
        }
        other => panic!("expected DuplicatePath, got {other:?}"),
    }
}

#[test]
fn test_no_documents() {
    let none: [&str; 0] = [];
    assert!(matches!(merge_all(&none), Err(SpecLoadError::NoDocuments)));
}

#[test]
fn test_directory_is_merged_in_lexicographic_order() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("b_orders.json"),
        serde_json::to_string(&orders_doc()).unwrap(),
    )
    .unwrap();
    fs::write(
        dir.path().join("a_users.yaml"),
        serde_yaml::to_string(&users_doc()).unwrap(),
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "not a contract").unwrap();

    let merged = merge_all_in_directory(dir.path()).unwrap();
    assert_eq!(merged.sources().len(), 2);
    assert!(merged.sources()[0].ends_with("a_users.yaml"));
    // The first document is the base, so its info wins.
    assert_eq!(merged.document()["info"]["title"], "Users");
    assert_eq!(merged.slug(), "users");
}

#[test]
fn test_operation_id_without_method_is_rejected() {
    let mut doc = users_doc();
    doc["paths"]["/users/{id}"]["get"]["operationId"] = json!("getUser");
    let merged = MergedSpec::from_value(doc).unwrap();

    match build_operations(&merged).unwrap_err() {
        SpecLoadError::MalformedOperationId {
            operation_id,
            method,
            path,
        } => {
            assert_eq!(operation_id, "getUser");
            assert_eq!(method, "GET");
            assert_eq!(path, "/users/{id}");
        }
        other => panic!("expected MalformedOperationId, got {other:?}"),
    }
}

#[test]
fn test_operation_id_with_three_parts_is_rejected() {
    let mut doc = users_doc();
    doc["paths"]["/users/{id}"]["get"]["operationId"] = json!("api.users.get");
    let merged = MergedSpec::from_value(doc).unwrap();
    assert!(matches!(
        build_operations(&merged),
        Err(SpecLoadError::MalformedOperationId { .. })
    ));
}

#[test]
fn test_operations_without_operation_id_are_skipped() {
    let mut doc = users_doc();
    doc["paths"]["/health"] = json!({
        "get": { "responses": { "200": { "description": "ok" } } }
    });
    let merged = MergedSpec::from_value(doc).unwrap();
    let ops = build_operations(&merged).unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].operation_id, "users.get");
}

#[test]
fn test_operations_carry_parameters_schema_and_roles() {
    let merged = merged(STORE_SPEC);
    let ops = build_operations(&merged).unwrap();
    assert_eq!(ops.len(), 13);

    let list = ops
        .iter()
        .find(|o| o.operation_id == "users.list")
        .unwrap();
    assert_eq!(list.method, Method::GET);
    assert_eq!(list.controller_name, "users");
    assert_eq!(list.method_name, "list");
    let tag = list.param("tag").unwrap();
    assert_eq!(tag.location, ParamLocation::Query);
    assert_eq!(tag.declared_type, ParamType::StringList);
    assert_eq!(list.param("limit").unwrap().declared_type, ParamType::Integer);
    assert!(list.required_roles.is_none());

    let create = ops
        .iter()
        .find(|o| o.operation_id == "users.create")
        .unwrap();
    assert!(create.request_body_required);
    let schema = create.request_schema.as_ref().unwrap();
    assert_eq!(schema["required"], json!(["name"]));
    assert_eq!(create.param("body").unwrap().location, ParamLocation::Body);

    let report = ops
        .iter()
        .find(|o| o.operation_id == "admin.report")
        .unwrap();
    let roles = report.required_roles.as_ref().unwrap();
    assert!(roles.all_of.as_ref().unwrap().contains("OPS"));
    assert!(roles.any_of.is_none());
}

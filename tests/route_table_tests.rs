//! Route table construction tests
//!
//! # Test Coverage
//!
//! - One entry per `path x verb` operation, routed on the declared template
//! - Server URLs never prefix routes; `mount_prefix` is opt-in
//! - Startup fails when a controller or one of its methods is missing
//! - Per-method timeout overrides versus the configured default
//! - Role requirements travel with the operation
//! - Declared argument lists versus default parameter binding

mod common;

use common::*;
use http::Method;
use openapi_dispatcher::binder::Arg;
use openapi_dispatcher::config::DispatcherConfig;
use openapi_dispatcher::registry::{Controller, HandlerRegistry, MethodOptions, RegistryError};
use openapi_dispatcher::router::{RouteLookup, RouteTable, RouteTableError};
use openapi_dispatcher::spec::MergedSpec;
use std::sync::Arc;
use std::time::Duration;

const PETS: &str = r#"
openapi: 3.1.0
info:
  title: Pets
  version: "1.0"
servers:
  - url: https://pets.example.com/v2/
paths:
  /pets:
    get:
      operationId: pets.list
      responses:
        "200":
          description: ok
    post:
      operationId: pets.create
      responses:
        "201":
          description: created
  /pets/{petId}:
    get:
      operationId: pets.get
      parameters:
        - name: petId
          in: path
          required: true
          schema:
            type: string
      responses:
        "200":
          description: ok
"#;

fn pets(methods: &[&str]) -> Controller {
    methods.iter().fold(Controller::new("pets"), |c, m| {
        c.method(*m, MethodOptions::new(), |_| async { Ok(()) })
    })
}

#[test]
fn test_one_entry_per_operation() {
    let table = store_table(Default::default());
    assert_eq!(table.len(), 13);
    assert_eq!(table.mount_prefix(), "");

    let ids: Vec<&str> = table.operations().map(|op| op.operation_id()).collect();
    assert!(ids.contains(&"users.rename"));
    assert!(ids.contains(&"misc.panic"));
}

#[test]
fn test_routes_match_declared_templates_not_server_path() {
    let registry = Arc::new(HandlerRegistry::from_controllers([pets(&[
        "list", "create", "get",
    ])]));
    let table =
        RouteTable::build(&merged(PETS), registry, &DispatcherConfig::default()).unwrap();
    assert_eq!(table.mount_prefix(), "");

    match table.lookup(&Method::GET, "/pets/rex") {
        RouteLookup::Found(m) => {
            assert_eq!(m.operation.operation_id(), "pets.get");
            assert_eq!(m.get_path_param("petId"), Some("rex"));
        }
        other => panic!("expected a match, got {other:?}"),
    }
    assert!(matches!(
        table.lookup(&Method::GET, "/v2/pets/rex"),
        RouteLookup::NotFound
    ));
}

#[test]
fn test_later_document_servers_do_not_move_routes() {
    let orders = serde_json::json!({
        "openapi": "3.1.0",
        "info": { "title": "Orders", "version": "1.0" },
        "servers": [{ "url": "https://orders.example.com/shop" }],
        "paths": {
            "/orders": {
                "get": {
                    "operationId": "orders.list",
                    "responses": { "200": { "description": "ok" } }
                }
            }
        }
    });
    let pets_doc: serde_json::Value = serde_yaml::from_str(PETS).unwrap();
    let merged = MergedSpec::from_documents([("pets.yaml", pets_doc), ("orders.json", orders)])
        .unwrap();
    let orders_controller =
        Controller::new("orders").method("list", MethodOptions::new(), |_| async { Ok(()) });
    let registry = Arc::new(HandlerRegistry::from_controllers([
        pets(&["list", "create", "get"]),
        orders_controller,
    ]));
    let table = RouteTable::build(&merged, registry, &DispatcherConfig::default()).unwrap();

    assert!(matches!(
        table.lookup(&Method::GET, "/pets"),
        RouteLookup::Found(_)
    ));
    assert!(matches!(
        table.lookup(&Method::GET, "/orders"),
        RouteLookup::Found(_)
    ));
}

#[test]
fn test_configured_mount_prefix_is_opt_in() {
    let registry = Arc::new(HandlerRegistry::from_controllers([pets(&[
        "list", "create", "get",
    ])]));
    let config = DispatcherConfig {
        mount_prefix: "/v1/".to_string(),
        ..DispatcherConfig::default()
    };
    let table = RouteTable::build(&merged(PETS), registry, &config).unwrap();
    assert_eq!(table.mount_prefix(), "/v1");

    assert!(matches!(
        table.lookup(&Method::GET, "/v1/pets/rex"),
        RouteLookup::Found(_)
    ));
    assert!(matches!(
        table.lookup(&Method::GET, "/pets/rex"),
        RouteLookup::NotFound
    ));
}

#[test]
fn test_missing_controller_fails_build() {
    let registry = Arc::new(HandlerRegistry::from_controllers(Vec::new()));
    let err = RouteTable::build(&merged(PETS), registry, &DispatcherConfig::default()).unwrap_err();
    match err {
        RouteTableError::Registry(RegistryError::HandlerNotFound { controller }) => {
            assert_eq!(controller, "pets");
        }
        other => panic!("expected HandlerNotFound, got {other:?}"),
    }
}

#[test]
fn test_missing_method_fails_build() {
    let registry = Arc::new(HandlerRegistry::from_controllers([pets(&["list", "get"])]));
    let err = RouteTable::build(&merged(PETS), registry, &DispatcherConfig::default()).unwrap_err();
    assert!(err.to_string().contains("no method 'create'"), "{err}");
    match err {
        RouteTableError::Registry(RegistryError::HandlerMethodNotFound { controller, method }) => {
            assert_eq!(controller, "pets");
            assert_eq!(method, "create");
        }
        other => panic!("expected HandlerMethodNotFound, got {other:?}"),
    }
}

#[test]
fn test_timeout_override_and_default() {
    let config = DispatcherConfig {
        default_timeout_ms: 2_500,
        ..DispatcherConfig::default()
    };
    let controller = Controller::new("pets")
        .method("list", MethodOptions::new(), |_| async { Ok(()) })
        .method(
            "create",
            MethodOptions::new().timeout(Duration::from_millis(250)),
            |_| async { Ok(()) },
        )
        .method("get", MethodOptions::new(), |_| async { Ok(()) });
    let registry = Arc::new(HandlerRegistry::from_controllers([controller]));
    let table = RouteTable::build(&merged(PETS), registry, &config).unwrap();

    assert_eq!(table.operation("pets.create").unwrap().timeout_millis(), 250);
    assert_eq!(
        table.operation("pets.list").unwrap().timeout(),
        Duration::from_millis(2_500)
    );
}

#[test]
fn test_roles_travel_with_operation() {
    let table = store_table(Default::default());
    let report = table.operation("admin.report").unwrap();
    let roles = report.required_roles().unwrap();
    assert!(roles.all_of.as_ref().unwrap().contains("ADMIN"));
    assert!(table.operation("users.get").unwrap().required_roles().is_none());
}

#[test]
fn test_declared_args_replace_default_binding() {
    let table = store_table(Default::default());

    let rename = table.operation("users.rename").unwrap();
    assert_eq!(
        rename.args(),
        &[Arg::param("id"), Arg::body_field("name")]
    );

    let get = table.operation("users.get").unwrap();
    assert_eq!(get.args(), &[Arg::param("id")]);

    let create = table.operation("users.create").unwrap();
    assert_eq!(create.args(), &[Arg::Body]);
}

#[test]
fn test_same_path_different_verbs() {
    let table = store_table(Default::default());
    match table.lookup(&Method::DELETE, "/users") {
        RouteLookup::MethodNotAllowed { allowed } => {
            assert!(allowed.contains(&Method::GET));
            assert!(allowed.contains(&Method::POST));
            assert_eq!(allowed.len(), 2);
        }
        other => panic!("expected MethodNotAllowed, got {other:?}"),
    }
}

//! Unit tests for CLI commands

use crate::cli::{run, Cli, Commands, OutputFormat};
use clap::Parser;
use std::fs;

const USERS: &str = r#"
openapi: 3.1.0
info:
  title: Users
  version: "1.0"
servers:
  - url: http://localhost:8080/api
paths:
  /users/{id}:
    get:
      operationId: users.get
      x-auth-roles:
        anyOf: [ADMIN]
      parameters:
        - name: id
          in: path
          required: true
          schema:
            type: integer
      responses:
        "200":
          description: ok
"#;

const ORDERS: &str = r#"
openapi: 3.1.0
info:
  title: Orders
  version: "1.0"
paths:
  /orders:
    post:
      operationId: orders.create
      responses:
        "201":
          description: created
"#;

#[test]
fn test_routes_command_parses_repeated_specs() {
    let cli = Cli::try_parse_from([
        "dispatch-cli",
        "routes",
        "--spec",
        "a.yaml",
        "--spec",
        "b.yaml",
        "--format",
        "json",
    ])
    .unwrap();
    match cli.command {
        Commands::Routes { source, format } => {
            assert_eq!(source.specs.len(), 2);
            assert!(source.spec_dir.is_none());
            assert_eq!(format, OutputFormat::Json);
        }
        Commands::Merge { .. } => panic!("Expected Routes command"),
    }
}

#[test]
fn test_merge_requires_out() {
    assert!(Cli::try_parse_from(["dispatch-cli", "merge", "--spec", "a.yaml"]).is_err());
}

#[test]
fn test_routes_text_lists_declared_templates() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a_users.yaml"), USERS).unwrap();
    fs::write(dir.path().join("b_orders.yaml"), ORDERS).unwrap();

    let cli = Cli::try_parse_from([
        "dispatch-cli",
        "routes",
        "--spec-dir",
        dir.path().to_str().unwrap(),
    ])
    .unwrap();
    let mut out = Vec::new();
    run(cli, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    // The server URL's path is not a routing prefix.
    assert!(text.contains("/users/{id}"), "{text}");
    assert!(!text.contains("/api/"), "{text}");
    assert!(text.contains("users.get"));
    assert!(text.contains(r#"{"anyOf":["ADMIN"]}"#));
    assert!(text.contains("orders.create"));
    assert!(text.contains("2 operation(s)"));
}

#[test]
fn test_routes_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let spec = dir.path().join("users.yaml");
    fs::write(&spec, USERS).unwrap();

    let cli = Cli::try_parse_from([
        "dispatch-cli",
        "routes",
        "--spec",
        spec.to_str().unwrap(),
        "--format",
        "json",
    ])
    .unwrap();
    let mut out = Vec::new();
    run(cli, &mut out).unwrap();
    let rows: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(rows[0]["method"], "GET");
    assert_eq!(rows[0]["controller"], "users");
    assert_eq!(rows[0]["handler_method"], "get");
    assert_eq!(rows[0]["roles"]["anyOf"][0], "ADMIN");
}

#[test]
fn test_merge_writes_json_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let users = dir.path().join("users.yaml");
    let orders = dir.path().join("orders.yaml");
    fs::write(&users, USERS).unwrap();
    fs::write(&orders, ORDERS).unwrap();
    let target = dir.path().join("merged.json");

    let cli = Cli::try_parse_from([
        "dispatch-cli",
        "merge",
        "--spec",
        users.to_str().unwrap(),
        "--spec",
        orders.to_str().unwrap(),
        "--out",
        target.to_str().unwrap(),
    ])
    .unwrap();
    let mut out = Vec::new();
    run(cli, &mut out).unwrap();

    let merged: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&target).unwrap()).unwrap();
    assert_eq!(merged["info"]["title"], "Users");
    assert!(merged["paths"]["/users/{id}"].is_object());
    assert!(merged["paths"]["/orders"].is_object());
    assert!(String::from_utf8(out).unwrap().contains("Merged 2 document(s)"));
}

#[test]
fn test_missing_source_is_an_error() {
    let cli = Cli::try_parse_from(["dispatch-cli", "routes"]).unwrap();
    let mut out = Vec::new();
    let err = run(cli, &mut out).unwrap_err();
    assert!(err.to_string().contains("no specification given"));
}

#[test]
fn test_routes_honour_configured_mount_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let spec = dir.path().join("users.yaml");
    fs::write(&spec, USERS).unwrap();
    let config = dir.path().join("dispatch.yaml");
    fs::write(&config, "mount_prefix: /v1/\n").unwrap();

    let cli = Cli::try_parse_from([
        "dispatch-cli",
        "routes",
        "--config",
        config.to_str().unwrap(),
        "--spec",
        spec.to_str().unwrap(),
        "--format",
        "json",
    ])
    .unwrap();
    let mut out = Vec::new();
    run(cli, &mut out).unwrap();
    let rows: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(rows[0]["path"], "/v1/users/{id}");
}

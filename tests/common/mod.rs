//! Shared fixtures for integration tests: a sample contract, sample
//! controllers and request helpers.

#![allow(dead_code)]

use bytes::Bytes;
use http::{Method, Request, Response};
use openapi_dispatcher::auth::Principal;
use openapi_dispatcher::binder::{Arg, Args};
use openapi_dispatcher::config::DispatcherConfig;
use openapi_dispatcher::error::ApiError;
use openapi_dispatcher::registry::{Controller, HandlerRegistry, MethodOptions, Reply};
use openapi_dispatcher::spec::MergedSpec;
use openapi_dispatcher::RouteTable;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Contract used across the dispatcher, binder and server tests.
pub const STORE_SPEC: &str = r##"
openapi: 3.1.0
info:
  title: Store API
  version: "1.0.0"
servers:
  - url: http://localhost:8080/api
paths:
  /users:
    get:
      operationId: users.list
      parameters:
        - name: tag
          in: query
          schema:
            type: array
            items:
              type: string
        - name: limit
          in: query
          schema:
            type: integer
        - name: active
          in: query
          schema:
            type: boolean
      responses:
        "200":
          description: ok
    post:
      operationId: users.create
      requestBody:
        required: true
        content:
          application/json:
            schema:
              $ref: "#/components/schemas/NewUser"
      responses:
        "201":
          description: created
  /users/{id}:
    get:
      operationId: users.get
      parameters:
        - name: id
          in: path
          required: true
          schema:
            type: integer
      responses:
        "200":
          description: ok
  /users/{id}/name:
    put:
      operationId: users.rename
      parameters:
        - name: id
          in: path
          required: true
          schema:
            type: integer
      requestBody:
        content:
          application/json:
            schema:
              type: object
      responses:
        "204":
          description: renamed
  /admin/report:
    get:
      operationId: admin.report
      x-auth-roles:
        allOf: [ADMIN, OPS]
      responses:
        "200":
          description: ok
  /admin/audit:
    get:
      operationId: admin.audit
      x-auth-roles:
        oneOf: [ADMIN, OPS]
      responses:
        "200":
          description: ok
  /slow:
    get:
      operationId: misc.slow
      responses:
        "200":
          description: ok
  /text:
    get:
      operationId: misc.text
      responses:
        "200":
          description: ok
  /empty:
    post:
      operationId: misc.empty
      responses:
        "200":
          description: ok
  /created:
    post:
      operationId: misc.created
      responses:
        "201":
          description: created
  /manual:
    get:
      operationId: misc.manual
      responses:
        "202":
          description: accepted
  /fail/{kind}:
    get:
      operationId: misc.fail
      parameters:
        - name: kind
          in: path
          required: true
          schema:
            type: string
      responses:
        "200":
          description: ok
  /panic:
    get:
      operationId: misc.panic
      responses:
        "200":
          description: ok
components:
  schemas:
    NewUser:
      type: object
      required: [name]
      properties:
        name:
          type: string
        age:
          type: integer
"##;

/// Parse a YAML contract into a merged spec.
pub fn merged(yaml: &str) -> MergedSpec {
    let value: Value = serde_yaml::from_str(yaml).unwrap();
    MergedSpec::from_value(value).unwrap()
}

/// Deadline of `misc.slow`.
pub const SLOW_TIMEOUT: Duration = Duration::from_millis(100);

async fn list_users(args: Args) -> Result<Reply, ApiError> {
    Reply::json(&json!({
        "tags": args.strings("tag")?,
        "limit": args.opt_int("limit")?,
        "active": args.opt_bool("active")?,
    }))
}

async fn create_user(args: Args) -> Result<Reply, ApiError> {
    let body = args.json("body")?;
    args.context().set_status(http::StatusCode::CREATED);
    Reply::json(&json!({ "id": 7, "name": body["name"] }))
}

async fn get_user(args: Args) -> Result<Reply, ApiError> {
    let id = args.int("id")?;
    if id == 404 {
        return Err(ApiError::not_found("User not found").with_detail(id));
    }
    Reply::json(&json!({ "id": id, "name": format!("user-{id}") }))
}

async fn rename_user(args: Args) -> Result<(), ApiError> {
    let _id = args.int("id")?;
    let _name = args.string("name")?;
    args.context().set_status(http::StatusCode::NO_CONTENT);
    Ok(())
}

async fn report(args: Args) -> Result<Reply, ApiError> {
    let who = args
        .context()
        .principal()
        .and_then(|p| p.subject.clone())
        .unwrap_or_default();
    Reply::json(&json!({ "report": "ok", "for": who }))
}

async fn audit(_args: Args) -> Result<Reply, ApiError> {
    Reply::json(&json!({ "audit": true }))
}

/// Sleeps well past its deadline, publishing its cancellation token first.
pub fn slow_controller_method(
    seen: Arc<parking_lot::Mutex<Option<CancellationToken>>>,
) -> impl Fn(Args) -> futures::future::BoxFuture<'static, Result<Reply, ApiError>>
       + Send
       + Sync
       + 'static {
    move |args: Args| {
        let seen = Arc::clone(&seen);
        Box::pin(async move {
            *seen.lock() = Some(args.cancellation().clone());
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Reply::text("too late"))
        })
    }
}

async fn text(_args: Args) -> Result<String, ApiError> {
    Ok("plain hello".to_string())
}

async fn empty(_args: Args) -> Result<(), ApiError> {
    Ok(())
}

async fn created(args: Args) -> Result<(), ApiError> {
    args.context().set_status(http::StatusCode::CREATED);
    Ok(())
}

/// Ends the response itself, then returns a value the dispatcher must ignore.
async fn manual(args: Args) -> Result<Reply, ApiError> {
    let ctx = args.context();
    ctx.set_status(http::StatusCode::ACCEPTED);
    ctx.end("handled");
    Reply::json(&json!({ "ignored": true }))
}

async fn fail(args: Args) -> Result<Reply, ApiError> {
    let kind = args.string("kind")?;
    Err(match kind.as_str() {
        "conflict" => ApiError::conflict("Already exists").with_detail("users"),
        "forbidden" => ApiError::forbidden("Forbidden"),
        "limited" => ApiError::too_many_requests("Slow down"),
        "gateway" => ApiError::from_status(
            http::StatusCode::BAD_GATEWAY,
            "Upstream failed",
            vec![json!("billing")],
        ),
        _ => ApiError::from(anyhow::anyhow!("database password=hunter2 rejected")),
    })
}

async fn panics(_args: Args) -> Result<Reply, ApiError> {
    panic!("handler exploded");
}

/// Controllers implementing every operation of [`STORE_SPEC`].
pub fn store_controllers(
    slow_token: Arc<parking_lot::Mutex<Option<CancellationToken>>>,
) -> Vec<Controller> {
    vec![
        Controller::new("users")
            .method("list", MethodOptions::new(), list_users)
            .method("create", MethodOptions::new(), create_user)
            .method("get", MethodOptions::new(), get_user)
            .method(
                "rename",
                MethodOptions::new().args([Arg::param("id"), Arg::body_field("name")]),
                rename_user,
            ),
        Controller::new("admin")
            .method("report", MethodOptions::new().args([Arg::Context]), report)
            .method("audit", MethodOptions::new(), audit),
        Controller::new("misc")
            .method(
                "slow",
                MethodOptions::new().timeout(SLOW_TIMEOUT),
                slow_controller_method(slow_token),
            )
            .method("text", MethodOptions::new(), text)
            .method("empty", MethodOptions::new(), empty)
            .method("created", MethodOptions::new(), created)
            .method("manual", MethodOptions::new(), manual)
            .method("fail", MethodOptions::new(), fail)
            .method("panic", MethodOptions::new(), panics),
    ]
}

/// Route table for [`STORE_SPEC`] with default configuration.
pub fn store_table(slow_token: Arc<parking_lot::Mutex<Option<CancellationToken>>>) -> RouteTable {
    let registry = Arc::new(HandlerRegistry::from_controllers(store_controllers(
        slow_token,
    )));
    RouteTable::build(&merged(STORE_SPEC), registry, &DispatcherConfig::default()).unwrap()
}

pub fn request(method: Method, uri: &str) -> Request<Bytes> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Bytes::new())
        .unwrap()
}

pub fn json_request(method: Method, uri: &str, body: &Value) -> Request<Bytes> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Bytes::from(body.to_string()))
        .unwrap()
}

pub fn body_json(response: &Response<Bytes>) -> Value {
    serde_json::from_slice(response.body()).unwrap()
}

pub fn content_type(response: &Response<Bytes>) -> Option<&str> {
    response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
}

/// A fresh principal holding `roles`.
pub fn principal(roles: &[&str]) -> Principal {
    Principal::new(roles.iter().copied(), std::time::SystemTime::now())
}

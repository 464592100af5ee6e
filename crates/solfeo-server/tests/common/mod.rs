#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use solfeo_common::types::{ActorRef, ActorRole, Channel, Recipient, RosterStatus};
use solfeo_notify::plugin::{TransportRegistry, TransportSpec};
use solfeo_server::app;
use solfeo_server::auth::create_token;
use solfeo_server::config::ServerConfig;
use solfeo_server::state::AppState;
use solfeo_storage::directory::{NewClass, RosterMember};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

pub const TEST_SECRET: &str = "test-secret";

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

impl TestContext {
    pub fn token(&self, sub: &str, role: ActorRole) -> String {
        create_token(TEST_SECRET, sub, sub, role, 3600).expect("token should encode")
    }

    pub fn admin(&self) -> String {
        self.token("admin-1", ActorRole::Admin)
    }

    pub fn teacher(&self) -> String {
        self.token("t1", ActorRole::Teacher)
    }

    pub fn student(&self, id: &str) -> String {
        self.token(id, ActorRole::Student)
    }
}

pub fn build_test_context() -> Result<TestContext> {
    build_test_context_with(Vec::new())
}

/// Fresh stores in a temp dir, seeded with admin-1, staff-1, teacher t1 and
/// class c1 "Guitar 101" (Alice and Bob active, Carla inactive).
pub fn build_test_context_with(transports: Vec<TransportSpec>) -> Result<TestContext> {
    solfeo_common::id::init(1, 1);

    let temp_dir = tempfile::tempdir()?;
    let mut config = ServerConfig {
        data_dir: temp_dir.path().to_string_lossy().to_string(),
        transports,
        ..Default::default()
    };
    config.notify.school_name = "Escuela Solfeo".to_string();
    config.notify.default_country_code = Some("34".to_string());
    config.notify.delivery_timeout_secs = 5;

    let state = AppState::build(
        config,
        &TransportRegistry::default(),
        TEST_SECRET.to_string(),
        CancellationToken::new(),
    )?;
    seed_directory(&state)?;

    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        app,
    })
}

fn seed_directory(state: &AppState) -> Result<()> {
    let directory = &state.directory;
    for (id, name, role) in [
        ("admin-1", "La Dirección", ActorRole::Admin),
        ("staff-1", "Secretaría", ActorRole::Staff),
        ("t1", "Marta López", ActorRole::Teacher),
    ] {
        directory.upsert_actor(&ActorRef {
            id: id.to_string(),
            display_name: name.to_string(),
            role,
        })?;
    }
    directory.upsert_student(&student("s1", "Alice", Some("alice@example.com"), Some("600111222"), true))?;
    directory.upsert_student(&student("s2", "Bob", None, Some("+34 600 333 444"), true))?;
    directory.upsert_student(&student("s3", "Carla", Some("carla@example.com"), None, true))?;
    directory.upsert_class(&NewClass {
        id: "c1".to_string(),
        title: "Guitar 101".to_string(),
        schedule: serde_json::from_value(json!([
            {"day": "Lunes", "start": "10:00", "end": "11:00"}
        ]))?,
        room: Some("Aula 3".to_string()),
        teacher_id: Some("t1".to_string()),
        roster: vec![
            member("s1", RosterStatus::Active),
            member("s2", RosterStatus::Active),
            member("s3", RosterStatus::Inactive),
        ],
    })?;
    Ok(())
}

pub fn student(id: &str, name: &str, email: Option<&str>, phone: Option<&str>, active: bool) -> Recipient {
    Recipient {
        id: id.to_string(),
        display_name: name.to_string(),
        email: email.map(str::to_string),
        phone: phone.map(str::to_string),
        instrument: Some("guitarra".to_string()),
        level: None,
        active,
    }
}

fn member(student_id: &str, status: RosterStatus) -> RosterMember {
    RosterMember {
        student_id: student_id.to_string(),
        status,
    }
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder = builder.header("Content-Type", "application/json");

    let req_body = body.unwrap_or(Value::Null).to_string();
    let req = builder
        .body(Body::from(req_body))
        .expect("request should build");
    send(app, req).await
}

pub async fn request_no_body(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let req = builder.body(Body::empty()).expect("request should build");
    send(app, req).await
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value, Option<String>) {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}

pub fn assert_ok_envelope(json: &Value) {
    assert_eq!(json["err_code"], 0);
    assert!(json["err_msg"].is_string());
    assert!(json.get("trace_id").is_some());
}

pub fn assert_err_envelope(json: &Value, err_code: i32) {
    assert_eq!(json["err_code"], err_code);
    assert!(json["err_msg"].is_string());
    assert!(json.get("trace_id").is_some());
    assert!(json.get("data").is_some());
    assert!(json["data"].is_null());
}

pub fn decode_data<T: DeserializeOwned>(json: &Value) -> T {
    serde_json::from_value(json["data"].clone()).expect("data should decode")
}

/// Creates a draft as admin-1 and returns its id.
pub async fn create_draft(ctx: &TestContext, body: Value) -> String {
    let token = ctx.admin();
    let (status, resp, _) = request_json(&ctx.app, "POST", "/v1/messages", Some(&token), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{resp}");
    resp["data"]["id"]
        .as_str()
        .expect("id should exist")
        .to_string()
}

/// Polls an inbox until it holds `expected` messages (receipts may be
/// written by a background task).
pub async fn wait_for_inbox(ctx: &TestContext, owner: &str, expected: usize) -> Vec<Value> {
    let token = ctx.token(owner, ActorRole::Student);
    for _ in 0..50 {
        let (_, body, _) =
            request_no_body(&ctx.app, "GET", &format!("/v1/students/{owner}/messages"), Some(&token)).await;
        let items = body["data"].as_array().cloned().unwrap_or_default();
        if items.len() >= expected {
            return items;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("inbox of {owner} never reached {expected} messages");
}

// ── WhatsApp bridge double ──

#[derive(Clone, Default)]
pub struct BridgeCalls(pub Arc<Mutex<Vec<Value>>>);

impl BridgeCalls {
    pub fn phones(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|v| v["phone"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|v| v["message"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

async fn bridge_send(State(calls): State<BridgeCalls>, Json(body): Json<Value>) -> Json<Value> {
    let id = {
        let mut guard = calls.0.lock().unwrap();
        guard.push(body);
        guard.len()
    };
    Json(json!({"success": true, "id": format!("wa-{id}")}))
}

/// Starts an in-process WhatsApp Web bridge and returns its transport spec.
pub async fn start_whatsapp_bridge() -> (TransportSpec, BridgeCalls) {
    let calls = BridgeCalls::default();
    let router = Router::new()
        .route("/send", post(bridge_send))
        .with_state(calls.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let spec = TransportSpec {
        channel: Channel::Whatsapp,
        transport_type: "whatsapp_web".to_string(),
        id: "wa-bridge".to_string(),
        config: json!({"base_url": format!("http://{addr}")}),
    };
    (spec, calls)
}

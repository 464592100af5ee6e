mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{
    assert_err_envelope, assert_ok_envelope, build_test_context, build_test_context_with,
    create_draft, decode_data, request_json, request_no_body, start_whatsapp_bridge,
    wait_for_inbox, TEST_SECRET,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use solfeo_common::types::{ActorRole, Message, MessageStatus};
use solfeo_server::auth::Claims;

fn internal_notice(subject: &str, body: &str) -> Value {
    json!({
        "recipient_rule": {"kind": "all_students"},
        "subject": subject,
        "body": body,
        "message_type": "announcement",
        "priority": "high",
        "delivery_channels": {"internal": true}
    })
}

// ── health & auth ──

#[tokio::test]
async fn health_is_public_and_traced() -> Result<()> {
    let ctx = build_test_context()?;
    let (status, body, trace_id) = request_no_body(&ctx.app, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert_eq!(body["data"]["storage_status"], "ok");
    assert_eq!(body["data"]["transports"]["email"], json!([]));
    let trace_id = trace_id.expect("trace id header");
    assert_eq!(trace_id.len(), 16);
    assert_eq!(body["trace_id"], trace_id);
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() -> Result<()> {
    let ctx = build_test_context()?;

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/messages", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1002);

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/messages", Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1002);

    let now = chrono::Utc::now().timestamp() as u64;
    let expired = encode(
        &Header::default(),
        &Claims {
            sub: "admin-1".into(),
            name: "admin".into(),
            role: ActorRole::Admin,
            iat: now - 7200,
            exp: now - 3600,
        },
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )?;
    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/messages", Some(&expired)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1003);
    Ok(())
}

#[tokio::test]
async fn me_returns_token_claims() -> Result<()> {
    let ctx = build_test_context()?;
    let token = ctx.teacher();
    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sub"], "t1");
    assert_eq!(body["data"]["role"], "teacher");
    Ok(())
}

// ── messages ──

#[tokio::test]
async fn students_cannot_manage_messages() -> Result<()> {
    let ctx = build_test_context()?;
    let token = ctx.student("s1");
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/messages",
        Some(&token),
        Some(internal_notice("Hola", "Texto")),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_err_envelope(&body, 1006);
    Ok(())
}

#[tokio::test]
async fn create_rejects_invalid_drafts() -> Result<()> {
    let ctx = build_test_context()?;
    let token = ctx.admin();

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/messages",
        Some(&token),
        Some(internal_notice("   ", "Texto")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);

    let long_subject = "a".repeat(201);
    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/messages",
        Some(&token),
        Some(internal_notice(&long_subject, "Texto")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut no_channels = internal_notice("Hola", "Texto");
    no_channels["delivery_channels"] = json!({"internal": false});
    let (status, _, _) =
        request_json(&ctx.app, "POST", "/v1/messages", Some(&token), Some(no_channels)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn send_then_read_flow() -> Result<()> {
    let ctx = build_test_context()?;
    let admin = ctx.admin();
    let id = create_draft(&ctx, internal_notice("Concierto", "Hola {{nombre}}, nos vemos el viernes.")).await;

    let (status, body, _) =
        request_no_body(&ctx.app, "POST", &format!("/v1/messages/{id}/send"), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["message"]["status"], "sent");
    // All three students are active in the directory.
    assert_eq!(body["data"]["results"]["internos"]["enviados"], 3);
    assert_eq!(body["data"]["results"]["email"]["enviados"], 0);
    assert_eq!(body["data"]["results"]["detalles"].as_array().map(Vec::len), Some(3));

    let alice = ctx.student("s1");
    let (_, inbox, _) = request_no_body(&ctx.app, "GET", "/v1/students/s1/messages", Some(&alice)).await;
    let items: Vec<Message> = decode_data(&inbox);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].body, "Hola Alice, nos vemos el viernes.");

    let (_, count, _) =
        request_no_body(&ctx.app, "GET", "/v1/students/s1/messages/unread-count", Some(&alice)).await;
    assert_eq!(count["data"]["unread"], 1);

    for _ in 0..2 {
        let (status, body, _) =
            request_no_body(&ctx.app, "POST", &format!("/v1/messages/{id}/read"), Some(&alice)).await;
        assert_eq!(status, StatusCode::OK);
        let message: Message = decode_data(&body);
        assert_eq!(message.read_by.len(), 1);
        assert_eq!(message.read_by[0].recipient_id, "s1");
    }

    let (_, count, _) =
        request_no_body(&ctx.app, "GET", "/v1/students/s1/messages/unread-count", Some(&alice)).await;
    assert_eq!(count["data"]["unread"], 0);

    let (_, unread, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/students/s1/messages?unread_only=true",
        Some(&alice),
    )
    .await;
    assert_eq!(unread["data"], json!([]));

    // Sent messages are immutable.
    let (status, body, _) =
        request_no_body(&ctx.app, "POST", &format!("/v1/messages/{id}/send"), Some(&admin)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_err_envelope(&body, 1005);
    let (status, _, _) =
        request_no_body(&ctx.app, "DELETE", &format!("/v1/messages/{id}"), Some(&admin)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn students_only_touch_their_own_inbox() -> Result<()> {
    let ctx = build_test_context()?;
    let admin = ctx.admin();
    let id = create_draft(
        &ctx,
        json!({
            "recipient_rule": {"kind": "specific_student", "student_id": "s2"},
            "subject": "Tutoría",
            "body": "Hola {{nombre}}",
        }),
    )
    .await;
    let (status, _, _) =
        request_no_body(&ctx.app, "POST", &format!("/v1/messages/{id}/send"), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);

    let alice = ctx.student("s1");
    let (status, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/students/s2/messages", Some(&alice)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_err_envelope(&body, 1006);

    let (status, _, _) = request_no_body(
        &ctx.app,
        "POST",
        &format!("/v1/messages/{id}/read?student_id=s2"),
        Some(&alice),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Not delivered to Alice.
    let (status, body, _) =
        request_no_body(&ctx.app, "POST", &format!("/v1/messages/{id}/read"), Some(&alice)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);

    // Staff may record a receipt on a student's behalf.
    let (status, body, _) = request_no_body(
        &ctx.app,
        "POST",
        &format!("/v1/messages/{id}/read?student_id=s2"),
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["read_by"][0]["recipient_id"], "s2");
    Ok(())
}

#[tokio::test]
async fn list_filters_and_pages() -> Result<()> {
    let ctx = build_test_context()?;
    let admin = ctx.admin();
    let first = create_draft(&ctx, internal_notice("Uno", "Texto")).await;
    create_draft(&ctx, internal_notice("Dos", "Texto")).await;
    create_draft(&ctx, internal_notice("Tres", "Texto")).await;
    let (status, _, _) =
        request_no_body(&ctx.app, "POST", &format!("/v1/messages/{first}/send"), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/messages?status=draft&limit=1", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["limit"], 1);
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"]["items"][0]["status"], "draft");

    let (_, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/messages?status=sent", Some(&admin)).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], first.as_str());
    Ok(())
}

#[tokio::test]
async fn drafts_can_be_deleted() -> Result<()> {
    let ctx = build_test_context()?;
    let admin = ctx.admin();
    let id = create_draft(&ctx, internal_notice("Borrador", "Texto")).await;

    let (status, body, _) =
        request_no_body(&ctx.app, "DELETE", &format!("/v1/messages/{id}"), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);

    let (status, body, _) =
        request_no_body(&ctx.app, "GET", &format!("/v1/messages/{id}"), Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);
    Ok(())
}

#[tokio::test]
async fn unresolvable_rule_leaves_the_draft() -> Result<()> {
    let ctx = build_test_context()?;
    let admin = ctx.admin();
    let id = create_draft(
        &ctx,
        json!({
            "recipient_rule": {"kind": "specific_class", "class_id": "c-missing"},
            "subject": "Ensayo",
            "body": "Texto",
        }),
    )
    .await;

    let (status, body, _) =
        request_no_body(&ctx.app, "POST", &format!("/v1/messages/{id}/send"), Some(&admin)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_err_envelope(&body, 1201);

    let (_, body, _) = request_no_body(&ctx.app, "GET", &format!("/v1/messages/{id}"), Some(&admin)).await;
    let message: Message = decode_data(&body);
    assert_eq!(message.status, MessageStatus::Draft);
    assert!(message.delivered_to.is_empty());
    Ok(())
}

// ── class notifications ──

#[tokio::test]
async fn class_cancellation_fans_out_and_audits() -> Result<()> {
    let (bridge, calls) = start_whatsapp_bridge().await;
    let ctx = build_test_context_with(vec![bridge])?;
    let token = ctx.teacher();

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/classes/c1/notifications/cancellation",
        Some(&token),
        Some(json!({"reason": "Profesora enferma"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let data = &body["data"];
    assert_eq!(data["success"], true);
    let results = &data["results"];
    assert_eq!(results["internos"], json!({"enviados": 2, "errores": 0}));
    // Alice has an email address but no email transport is configured.
    assert_eq!(results["email"], json!({"enviados": 0, "errores": 1}));
    assert_eq!(results["whatsapp"], json!({"enviados": 2, "errores": 0}));

    let details = results["detalles"].as_array().cloned().unwrap_or_default();
    let ids: Vec<&str> = details.iter().filter_map(|d| d["recipient_id"].as_str()).collect();
    assert_eq!(ids, vec!["s1", "s2"]);
    assert_eq!(details[0]["errors"], json!(["Email: no transport configured"]));
    assert_eq!(details[1]["errors"], json!([]));

    assert_eq!(calls.phones(), vec!["34600111222", "34600333444"]);
    let texts = calls.messages();
    assert!(texts[0].starts_with("*Escuela Solfeo*"));
    assert!(texts[0].contains("Guitar 101"));
    assert!(texts[0].contains("Profesora enferma"));
    assert!(texts[0].contains("Alice"));

    let alice_inbox = wait_for_inbox(&ctx, "s1", 1).await;
    assert!(alice_inbox[0]["subject"]
        .as_str()
        .unwrap_or_default()
        .contains("Guitar 101"));

    let teacher_inbox = wait_for_inbox(&ctx, "t1", 1).await;
    assert_eq!(teacher_inbox.len(), 1);
    assert_eq!(teacher_inbox[0]["message_type"], "info");

    // Inactive roster entries are not notified.
    let carla = ctx.student("s3");
    let (_, body, _) = request_no_body(&ctx.app, "GET", "/v1/students/s3/messages", Some(&carla)).await;
    assert_eq!(body["data"], json!([]));
    Ok(())
}

#[tokio::test]
async fn time_change_requires_both_times() -> Result<()> {
    let ctx = build_test_context()?;
    let token = ctx.admin();
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/classes/c1/notifications/time-change",
        Some(&token),
        Some(json!({"old_time": "10:00", "new_time": " "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["err_code"], 1001);
    assert_eq!(body["data"]["success"], false);
    assert!(body["data"]["error"].is_string());
    Ok(())
}

#[tokio::test]
async fn cancellation_rejects_oversized_reason() -> Result<()> {
    let ctx = build_test_context()?;
    let token = ctx.admin();
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/classes/c1/notifications/cancellation",
        Some(&token),
        Some(json!({"reason": "x".repeat(2500)})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["err_code"], 1001);
    assert_eq!(body["data"]["success"], false);

    let (_, list, _) = request_no_body(&ctx.app, "GET", "/v1/messages", Some(&token)).await;
    assert_eq!(list["data"]["total"], 0, "{list}");
    Ok(())
}

#[tokio::test]
async fn unknown_class_reports_failure() -> Result<()> {
    let ctx = build_test_context()?;
    let token = ctx.admin();
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/classes/c-missing/notifications/time-change",
        Some(&token),
        Some(json!({"old_time": "10:00", "new_time": "12:00"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["err_code"], 1201);
    assert_eq!(body["data"]["success"], false);
    assert!(body["data"].get("results").is_none());
    Ok(())
}

#[tokio::test]
async fn time_change_without_transports_still_reaches_inboxes() -> Result<()> {
    let ctx = build_test_context()?;
    let token = ctx.admin();
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/classes/c1/notifications/time-change",
        Some(&token),
        Some(json!({"old_time": "Lunes 10:00", "new_time": "Lunes 12:00"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["results"]["internos"]["enviados"], 2);
    assert_eq!(body["data"]["results"]["whatsapp"]["errores"], 2);

    let inbox = wait_for_inbox(&ctx, "s2", 1).await;
    assert!(inbox[0]["body"].as_str().unwrap_or_default().contains("Lunes 12:00"));
    // Audit goes to the teacher and to the acting admin.
    wait_for_inbox(&ctx, "t1", 1).await;
    wait_for_inbox(&ctx, "admin-1", 1).await;
    Ok(())
}

#[tokio::test]
async fn students_cannot_announce_class_events() -> Result<()> {
    let ctx = build_test_context()?;
    let token = ctx.student("s1");
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/classes/c1/notifications/cancellation",
        Some(&token),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_err_envelope(&body, 1006);
    Ok(())
}

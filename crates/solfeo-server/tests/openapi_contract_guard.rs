mod common;

use anyhow::{anyhow, Result};
use common::{build_test_context, request_no_body};
use std::collections::BTreeSet;

#[tokio::test]
async fn openapi_paths_should_match_the_route_table() -> Result<()> {
    let ctx = build_test_context()?;
    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/openapi.json", None).await;
    assert_eq!(status, axum::http::StatusCode::OK);

    let Some(paths) = body["paths"].as_object() else {
        return Err(anyhow!("openapi paths should be object"));
    };

    let mut exposed: BTreeSet<String> = BTreeSet::new();
    for (path, methods) in paths {
        let Some(methods) = methods.as_object() else {
            return Err(anyhow!("path methods should be object for {path}"));
        };
        for method in methods.keys() {
            exposed.insert(format!("{} {path}", method.to_ascii_uppercase()));
        }
    }

    let expected: BTreeSet<String> = [
        "GET /v1/health",
        "GET /v1/auth/me",
        "POST /v1/messages",
        "GET /v1/messages",
        "GET /v1/messages/{id}",
        "DELETE /v1/messages/{id}",
        "POST /v1/messages/{id}/send",
        "POST /v1/messages/{id}/read",
        "GET /v1/students/{id}/messages",
        "GET /v1/students/{id}/messages/unread-count",
        "POST /v1/classes/{id}/notifications/cancellation",
        "POST /v1/classes/{id}/notifications/time-change",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();

    assert_eq!(exposed, expected);
    assert!(body["components"]["securitySchemes"]["bearer_auth"].is_object());
    Ok(())
}

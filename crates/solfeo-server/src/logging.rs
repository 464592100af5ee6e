use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use std::fmt::Write;
use std::time::Instant;

/// Trace id of the current request, stored in request extensions.
#[derive(Clone)]
pub struct TraceId(pub String);

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

/// 16 hex characters (8 random bytes).
fn generate_trace_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    let mut s = String::with_capacity(16);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

const MAX_BODY_LOG_CHARS: usize = 200;

/// Bodies on these prefixes are never logged.
const SENSITIVE_PREFIXES: &[&str] = &["/v1/auth/"];

fn truncate_body(bytes: &[u8], max: usize) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.len() > max => {
            let mut end = max;
            while end > 0 && !s.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &s[..end])
        }
        Ok(s) => s.to_string(),
        Err(_) => "<non-utf8 body>".to_string(),
    }
}

fn format_elapsed(elapsed_us: u128) -> String {
    if elapsed_us < 1000 {
        format!("{elapsed_us}µs")
    } else if elapsed_us < 1_000_000 {
        format!("{}ms", elapsed_us / 1000)
    } else {
        format!("{:.1}s", elapsed_us as f64 / 1_000_000.0)
    }
}

fn is_sensitive(path: &str) -> bool {
    SENSITIVE_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Buffers a body so it can be both logged and passed on.
async fn buffer_body(body: Body, limit: usize) -> axum::body::Bytes {
    axum::body::to_bytes(body, limit).await.unwrap_or_default()
}

fn snippet(bytes: &[u8]) -> Option<String> {
    (!bytes.is_empty()).then(|| truncate_body(bytes, MAX_BODY_LOG_CHARS))
}

fn log_request(trace_id: &str, method: &str, url: &str, user_agent: &str, body: Option<&str>) {
    match body {
        Some(body) => tracing::info!(
            trace_id = %trace_id,
            method = %method,
            path = %url,
            body = %body,
            ua = %user_agent,
            "--> request"
        ),
        None => tracing::info!(
            trace_id = %trace_id,
            method = %method,
            path = %url,
            ua = %user_agent,
            "--> request"
        ),
    }
}

fn log_response(trace_id: &str, status: StatusCode, elapsed: &str, body: Option<&str>) {
    let code = status.as_u16();
    let body = body.unwrap_or_default();
    if status.is_server_error() {
        tracing::error!(trace_id = %trace_id, status = code, elapsed = %elapsed, body = %body, "<-- response");
    } else if status.is_client_error() {
        tracing::warn!(trace_id = %trace_id, status = code, elapsed = %elapsed, body = %body, "<-- response");
    } else if body.is_empty() {
        tracing::info!(trace_id = %trace_id, status = code, elapsed = %elapsed, "<-- response");
    } else {
        tracing::info!(trace_id = %trace_id, status = code, elapsed = %elapsed, body = %body, "<-- response");
    }
}

/// Request/response logging middleware.
///
/// Assigns a [`TraceId`], logs both directions with truncated JSON bodies
/// and echoes the id in `X-Trace-Id`.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = generate_trace_id();
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let method = req.method().to_string();
    let url = match req.uri().query() {
        Some(q) if !q.is_empty() => format!("{}?{q}", req.uri().path()),
        _ => req.uri().path().to_string(),
    };
    let sensitive = is_sensitive(req.uri().path());
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let req = if !sensitive && matches!(method.as_str(), "POST" | "PUT" | "PATCH") {
        let (parts, body) = req.into_parts();
        let bytes = buffer_body(body, 1024 * 1024).await;
        log_request(&trace_id, &method, &url, &user_agent, snippet(&bytes).as_deref());
        Request::from_parts(parts, Body::from(bytes))
    } else {
        log_request(&trace_id, &method, &url, &user_agent, None);
        req
    };

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = format_elapsed(start.elapsed().as_micros());

    let (parts, body) = response.into_parts();
    let is_json = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    let bytes = buffer_body(body, usize::MAX).await;
    let logged = if !sensitive && is_json { snippet(&bytes) } else { None };
    log_response(&trace_id, parts.status, &elapsed, logged.as_deref());

    let mut response = Response::from_parts(parts, Body::from(bytes));
    if let Ok(val) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert("X-Trace-Id", val);
    }
    response
}

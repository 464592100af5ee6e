pub mod messages;
pub mod notifications;
pub mod pagination;

use crate::logging::TraceId;
use crate::state::{AppState, TransportSummary};
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use solfeo_notify::error::NotifyError;
use solfeo_storage::{ActorDirectory, StorageError};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Error envelope.
#[derive(Serialize, ToSchema)]
pub struct ApiError {
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
}

/// Response envelope shared by every route.
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// 0 on success
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
    pub data: Option<T>,
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedData<T>
where
    T: Serialize,
{
    pub items: Vec<T>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

pub fn success_response<T>(status: StatusCode, trace_id: &str, data: T) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            err_code: 0,
            err_msg: "success".to_string(),
            trace_id: trace_id.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

pub fn success_empty_response(status: StatusCode, trace_id: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: 0,
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

pub fn success_paginated_response<T>(
    status: StatusCode,
    trace_id: &str,
    items: Vec<T>,
    total: u64,
    limit: usize,
    offset: usize,
) -> Response
where
    T: Serialize,
{
    success_response(
        status,
        trace_id,
        PaginatedData {
            items,
            total,
            limit,
            offset,
        },
    )
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "unauthorized" => 1002,
        "token_expired" => 1003,
        "not_found" => 1004,
        "conflict" => 1005,
        "forbidden" => 1006,
        "notification_failed" => 1201,
        "storage_error" => 1501,
        "internal_error" => 1500,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

/// Error envelope that still carries a payload.
pub fn error_response_with_data<T>(
    status: StatusCode,
    trace_id: &str,
    code: &str,
    msg: &str,
    data: T,
) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

/// Maps a service error onto the HTTP envelope.
pub fn notify_error_response(trace_id: &str, err: &NotifyError) -> Response {
    let (status, code) = match err {
        NotifyError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        NotifyError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        NotifyError::InvalidState(_) => (StatusCode::CONFLICT, "conflict"),
        NotifyError::Resolution(_) | NotifyError::Delivery(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "notification_failed")
        }
        NotifyError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "notification_failed"),
        NotifyError::Storage(storage) => match storage {
            StorageError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            StorageError::VersionConflict { .. } | StorageError::InvalidState { .. } => {
                (StatusCode::CONFLICT, "conflict")
            }
            _ => {
                tracing::error!(trace_id = %trace_id, error = %err, "Storage failure");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    trace_id,
                    "storage_error",
                    "storage error",
                );
            }
        },
        _ => {
            tracing::error!(trace_id = %trace_id, error = %err, "Internal failure");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                trace_id,
                "internal_error",
                "internal error",
            );
        }
    };
    error_response(status, trace_id, code, &err.to_string())
}

#[derive(Serialize, ToSchema)]
struct HealthResponse {
    version: String,
    uptime_secs: i64,
    /// "ok" when the directory store answers
    storage_status: String,
    transports: TransportSummary,
}

/// Service health. No authentication required.
#[utoipa::path(
    get,
    path = "/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    )
)]
async fn health(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let uptime = (Utc::now() - state.start_time).num_seconds();
    let storage_status = match state.directory.find_any_admin() {
        Ok(_) => "ok".to_string(),
        Err(e) => {
            tracing::error!(trace_id = %*trace_id, error = %e, "Directory health check failed");
            "error".to_string()
        }
    };
    success_response(
        StatusCode::OK,
        &trace_id,
        HealthResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: uptime,
            storage_status,
            transports: state.transports.as_ref().clone(),
        },
    )
}

pub fn public_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(health))
}

pub fn protected_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(crate::auth::me))
        .merge(messages::message_routes())
        .merge(notifications::notification_routes())
}

use crate::api::{error_response_with_data, success_response, ApiError};
use crate::auth::{forbidden, Claims};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use solfeo_notify::dispatcher::OutcomeReport;
use solfeo_notify::error::NotifyError;
use solfeo_notify::orchestrator::NotificationResponse;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Debug, Default, Deserialize, ToSchema)]
struct CancellationRequest {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
struct TimeChangeRequest {
    old_time: String,
    new_time: String,
}

/// Wraps the orchestration result as `{success, results}` or
/// `{success: false, error}`. A run that produced a report is a success
/// even when some channels failed.
fn notification_result(trace_id: &str, result: Result<OutcomeReport, NotifyError>) -> Response {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(NotifyError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
        Err(NotifyError::Resolution(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        Err(NotifyError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let response = NotificationResponse::from(result);
    if response.success {
        return success_response(status, trace_id, response);
    }
    let msg = response
        .error
        .clone()
        .unwrap_or_else(|| "notification failed".to_string());
    let code = if status == StatusCode::BAD_REQUEST {
        "bad_request"
    } else {
        "notification_failed"
    };
    tracing::warn!(trace_id = %trace_id, error = %msg, "Class notification failed");
    error_response_with_data(status, trace_id, code, &msg, response)
}

/// Announces a class cancellation to every active student of the class.
#[utoipa::path(
    post,
    path = "/v1/classes/{id}/notifications/cancellation",
    tag = "Class Notifications",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Class id")),
    request_body = CancellationRequest,
    responses(
        (status = 200, description = "Per-channel and per-recipient outcome", body = NotificationResponse),
        (status = 403, description = "Staff or teachers only", body = ApiError),
        (status = 422, description = "Class could not be loaded", body = ApiError)
    )
)]
async fn class_cancellation(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(class_id): Path<String>,
    Json(body): Json<CancellationRequest>,
) -> impl IntoResponse {
    if !claims.can_notify_classes() {
        return forbidden(&trace_id, &claims);
    }
    let cancel = state.shutdown.child_token();
    let result = state
        .orchestrator
        .notify_class_cancellation(
            &class_id,
            body.reason.as_deref(),
            Some(claims.sub.as_str()),
            &cancel,
        )
        .await;
    notification_result(&trace_id, result)
}

/// Announces a new class time to every active student of the class.
#[utoipa::path(
    post,
    path = "/v1/classes/{id}/notifications/time-change",
    tag = "Class Notifications",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Class id")),
    request_body = TimeChangeRequest,
    responses(
        (status = 200, description = "Per-channel and per-recipient outcome", body = NotificationResponse),
        (status = 400, description = "Missing times", body = ApiError),
        (status = 403, description = "Staff or teachers only", body = ApiError),
        (status = 422, description = "Class could not be loaded", body = ApiError)
    )
)]
async fn class_time_change(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(class_id): Path<String>,
    Json(body): Json<TimeChangeRequest>,
) -> impl IntoResponse {
    if !claims.can_notify_classes() {
        return forbidden(&trace_id, &claims);
    }
    let cancel = state.shutdown.child_token();
    let result = state
        .orchestrator
        .notify_class_time_change(
            &class_id,
            &body.old_time,
            &body.new_time,
            Some(claims.sub.as_str()),
            &cancel,
        )
        .await;
    notification_result(&trace_id, result)
}

pub fn notification_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(class_cancellation))
        .routes(routes!(class_time_change))
}

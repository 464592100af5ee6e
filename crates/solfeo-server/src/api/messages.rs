use crate::api::pagination::{InboxParams, PaginationParams};
use crate::api::{
    notify_error_response, success_empty_response, success_paginated_response, success_response,
    ApiError,
};
use crate::auth::{forbidden, require_staff, Claims};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use solfeo_common::types::{Message, MessageStatus, MessageType, NewMessage};
use solfeo_notify::service::{SendOutcome, MAX_INBOX_LIMIT};
use solfeo_storage::MessageFilter;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
struct MessageListParams {
    #[param(required = false)]
    status: Option<MessageStatus>,
    #[param(required = false)]
    message_type: Option<MessageType>,
    #[param(required = false)]
    sender_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
struct ReadParams {
    /// Recipient to mark; staff only, defaults to the caller
    #[param(required = false)]
    student_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
struct UnreadCount {
    unread: u64,
}

/// Creates a draft message sent by the caller.
#[utoipa::path(
    post,
    path = "/v1/messages",
    tag = "Messages",
    security(("bearer_auth" = [])),
    request_body = NewMessage,
    responses(
        (status = 201, description = "Draft created", body = Message),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 403, description = "Staff only", body = ApiError)
    )
)]
async fn create_message(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(body): Json<NewMessage>,
) -> impl IntoResponse {
    if let Err(resp) = require_staff(&claims, &trace_id) {
        return resp;
    }
    match state.messages.create_message(body, &claims.sub) {
        Ok(message) => success_response(StatusCode::CREATED, &trace_id, message),
        Err(e) => notify_error_response(&trace_id, &e),
    }
}

/// Lists messages, newest first.
#[utoipa::path(
    get,
    path = "/v1/messages",
    tag = "Messages",
    security(("bearer_auth" = [])),
    params(MessageListParams, PaginationParams),
    responses(
        (status = 200, description = "Paginated messages", body = Vec<Message>),
        (status = 403, description = "Staff only", body = ApiError)
    )
)]
async fn list_messages(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(params): Query<MessageListParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    if let Err(resp) = require_staff(&claims, &trace_id) {
        return resp;
    }
    let filter = MessageFilter {
        status: params.status,
        message_type: params.message_type,
        sender_id: params.sender_id,
    };
    let limit = pagination.limit().clamp(1, MAX_INBOX_LIMIT);
    let offset = pagination.offset();
    match state.messages.list_messages(&filter, limit, offset) {
        Ok((items, total)) => {
            success_paginated_response(StatusCode::OK, &trace_id, items, total, limit, offset)
        }
        Err(e) => notify_error_response(&trace_id, &e),
    }
}

#[utoipa::path(
    get,
    path = "/v1/messages/{id}",
    tag = "Messages",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message", body = Message),
        (status = 404, description = "Unknown message", body = ApiError)
    )
)]
async fn get_message(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Err(resp) = require_staff(&claims, &trace_id) {
        return resp;
    }
    match state.messages.get_message(&id) {
        Ok(message) => success_response(StatusCode::OK, &trace_id, message),
        Err(e) => notify_error_response(&trace_id, &e),
    }
}

/// Deletes a draft. Sent messages cannot be deleted.
#[utoipa::path(
    delete,
    path = "/v1/messages/{id}",
    tag = "Messages",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Message id")),
    responses(
        (status = 200, description = "Draft deleted"),
        (status = 404, description = "Unknown message", body = ApiError),
        (status = 409, description = "Message already sent", body = ApiError)
    )
)]
async fn delete_message(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Err(resp) = require_staff(&claims, &trace_id) {
        return resp;
    }
    match state.messages.delete_message(&id) {
        Ok(()) => success_empty_response(StatusCode::OK, &trace_id, "deleted"),
        Err(e) => notify_error_response(&trace_id, &e),
    }
}

/// Sends a draft and delivers it to every resolved recipient.
#[utoipa::path(
    post,
    path = "/v1/messages/{id}/send",
    tag = "Messages",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message sent with per-recipient outcome", body = SendOutcome),
        (status = 409, description = "Message already sent", body = ApiError),
        (status = 422, description = "Recipients could not be resolved", body = ApiError)
    )
)]
async fn send_message(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Err(resp) = require_staff(&claims, &trace_id) {
        return resp;
    }
    let cancel = state.shutdown.child_token();
    match state.messages.send_message(&id, &cancel).await {
        Ok(outcome) => success_response(StatusCode::OK, &trace_id, outcome),
        Err(e) => notify_error_response(&trace_id, &e),
    }
}

/// Inbox of a student (or a teacher's audit inbox), newest first.
#[utoipa::path(
    get,
    path = "/v1/students/{id}/messages",
    tag = "Inbox",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Student id"), InboxParams),
    responses(
        (status = 200, description = "Inbox messages", body = Vec<Message>),
        (status = 403, description = "Another student's inbox", body = ApiError)
    )
)]
async fn student_messages(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<InboxParams>,
) -> impl IntoResponse {
    if !claims.can_access_inbox(&id) {
        return forbidden(&trace_id, &claims);
    }
    match state.messages.get_student_messages(&id, params.options()) {
        Ok(items) => success_response(StatusCode::OK, &trace_id, items),
        Err(e) => notify_error_response(&trace_id, &e),
    }
}

#[utoipa::path(
    get,
    path = "/v1/students/{id}/messages/unread-count",
    tag = "Inbox",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Student id")),
    responses(
        (status = 200, description = "Unread message count", body = UnreadCount),
        (status = 403, description = "Another student's inbox", body = ApiError)
    )
)]
async fn unread_count(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if !claims.can_access_inbox(&id) {
        return forbidden(&trace_id, &claims);
    }
    match state.messages.unread_count(&id) {
        Ok(unread) => success_response(StatusCode::OK, &trace_id, UnreadCount { unread }),
        Err(e) => notify_error_response(&trace_id, &e),
    }
}

/// Records a read receipt. Repeated calls keep the first receipt.
#[utoipa::path(
    post,
    path = "/v1/messages/{id}/read",
    tag = "Inbox",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Message id"), ReadParams),
    responses(
        (status = 200, description = "Message with its read receipts", body = Message),
        (status = 403, description = "Another student's receipt", body = ApiError),
        (status = 404, description = "Message not delivered to this student", body = ApiError)
    )
)]
async fn mark_read(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ReadParams>,
) -> impl IntoResponse {
    let student_id = params.student_id.unwrap_or_else(|| claims.sub.clone());
    if !claims.can_access_inbox(&student_id) {
        return forbidden(&trace_id, &claims);
    }
    match state.messages.mark_as_read(&id, &student_id) {
        Ok(message) => success_response(StatusCode::OK, &trace_id, message),
        Err(e) => notify_error_response(&trace_id, &e),
    }
}

pub fn message_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(create_message, list_messages))
        .routes(routes!(get_message, delete_message))
        .routes(routes!(send_message))
        .routes(routes!(student_messages))
        .routes(routes!(unread_count))
        .routes(routes!(mark_read))
}

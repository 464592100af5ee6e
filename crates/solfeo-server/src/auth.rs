use axum::body::Body;
use axum::extract::{Extension, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use solfeo_common::types::ActorRole;
use utoipa::ToSchema;

use crate::api::{error_response, success_response};
use crate::logging::TraceId;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Claims {
    /// Actor or student id.
    pub sub: String,
    pub name: String,
    pub role: ActorRole,
    pub iat: u64,
    pub exp: u64,
}

impl Claims {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    /// Staff and teachers may announce class events.
    pub fn can_notify_classes(&self) -> bool {
        self.is_staff() || self.role == ActorRole::Teacher
    }

    /// Staff may act on any inbox; everyone else only on their own.
    pub fn can_access_inbox(&self, owner_id: &str) -> bool {
        self.is_staff() || self.sub == owner_id
    }
}

pub fn create_token(
    secret: &str,
    subject: &str,
    name: &str,
    role: ActorRole,
    expire_secs: u64,
) -> anyhow::Result<String> {
    let now = chrono::Utc::now().timestamp() as u64;
    let claims = Claims {
        sub: subject.to_string(),
        name: name.to_string(),
        role,
        iat: now,
        exp: now + expire_secs,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn validate_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Rejects callers without a staff role.
pub fn require_staff(claims: &Claims, trace_id: &str) -> Result<(), Response> {
    if claims.is_staff() {
        Ok(())
    } else {
        Err(forbidden(trace_id, claims))
    }
}

pub fn forbidden(trace_id: &str, claims: &Claims) -> Response {
    tracing::warn!(trace_id = %trace_id, sub = %claims.sub, role = %claims.role, "Request forbidden");
    error_response(
        StatusCode::FORBIDDEN,
        trace_id,
        "forbidden",
        "insufficient permissions",
    )
}

/// JWT middleware: validates the bearer token and stores its [`Claims`]
/// in request extensions.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) if !token.is_empty() => token,
        _ => {
            let msg = if auth_header.is_none() {
                "missing authorization header"
            } else {
                "invalid authorization header"
            };
            return error_response(StatusCode::UNAUTHORIZED, &trace_id, "unauthorized", msg);
        }
    };

    match validate_token(&state.jwt_secret, token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            if matches!(e.kind(), jsonwebtoken::errors::ErrorKind::ExpiredSignature) {
                return error_response(
                    StatusCode::UNAUTHORIZED,
                    &trace_id,
                    "token_expired",
                    "token expired",
                );
            }
            error_response(StatusCode::UNAUTHORIZED, &trace_id, "unauthorized", "invalid token")
        }
    }
}

/// Returns the claims of the calling token.
#[utoipa::path(
    get,
    path = "/v1/auth/me",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Claims of the current token", body = Claims),
        (status = 401, description = "Unauthenticated", body = crate::api::ApiError)
    )
)]
pub async fn me(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    success_response(StatusCode::OK, &trace_id, claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_keeps_role() {
        let token = create_token("secret", "t1", "Ana", ActorRole::Teacher, 60).unwrap();
        let claims = validate_token("secret", &token).unwrap();
        assert_eq!(claims.sub, "t1");
        assert_eq!(claims.role, ActorRole::Teacher);
        assert!(claims.can_notify_classes());
        assert!(!claims.is_staff());
        assert!(claims.can_access_inbox("t1"));
        assert!(!claims.can_access_inbox("s1"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = create_token("secret", "s1", "Alice", ActorRole::Student, 60).unwrap();
        assert!(validate_token("other", &token).is_err());
    }
}

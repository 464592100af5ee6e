use crate::state::AppState;
use crate::{api, auth, logging, openapi};
use axum::middleware;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "solfeo API",
        description = "Music school messaging and class notifications",
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Auth", description = "Token inspection"),
        (name = "Messages", description = "Drafts, sending and staff listings"),
        (name = "Inbox", description = "Student inboxes and read receipts"),
        (name = "Class Notifications", description = "Class cancellation and time change notices")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(utoipa::openapi::security::Http::new(
                utoipa::openapi::security::HttpAuthScheme::Bearer,
            )),
        );
    }
}

pub fn build_http_app(state: AppState) -> Router {
    let (public_router, public_spec) = api::public_routes().split_for_parts();
    let (protected_router, protected_spec) = api::protected_routes().split_for_parts();

    let mut merged_spec = ApiDoc::openapi();
    merged_spec.merge(public_spec);
    merged_spec.merge(protected_spec);
    let spec = Arc::new(merged_spec);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    public_router
        .merge(protected_router.layer(middleware::from_fn_with_state(
            state.clone(),
            auth::jwt_auth_middleware,
        )))
        .with_state(state)
        .merge(openapi::json_route(spec))
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging))
}

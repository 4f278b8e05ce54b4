//! Router construction for the admin server.

use std::any::Any;

use axum::{
    http::StatusCode,
    middleware as axum_mw,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers;
use crate::middleware::require_admin_token;
use crate::state::AppState;

/// Build the full axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Privileged routes, guarded by the admin token when one is configured
    let admin = Router::new()
        .route(
            "/approve-registration",
            post(handlers::registrations::approve_registration),
        )
        .route(
            "/registrations",
            get(handlers::registrations::list_registrations),
        )
        .route(
            "/registrations/:id",
            delete(handlers::registrations::reject_registration),
        )
        .route("/create-user", post(handlers::accounts::create_user))
        .route("/test-email", post(handlers::email::send_test_email))
        .route_layer(axum_mw::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ));

    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    Router::new()
        .route("/api/health", get(handlers::health::health))
        .nest("/api/admin", admin)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(cors),
        )
        .with_state(state)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(%detail, "handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "success": false, "error": detail })),
    )
        .into_response()
}

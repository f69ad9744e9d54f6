use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::rest::{auth, events, health, invoke, stream};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .server
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ]);

    // Public routes (no auth required)
    let public_routes = Router::new().route("/api/health", get(health::health));

    // Protected routes (bearer token when one is configured)
    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/invoke", post(invoke::invoke))
        .route("/api/events", get(events::events))
        .route("/api/stream/{id}", post(stream::start))
        .route("/api/stream/{id}/events", get(stream::events))
        .route("/api/stream/{id}/cancel", post(stream::cancel))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

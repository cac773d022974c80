//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{fetch, health, hooks, lifecycle};
use crate::state::AppState;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Routes (verified user id from the identity-aware proxy)
/// - `POST /routes/create` - Register a route with its schedule
/// - `PUT /routes/update` - Partial update with forecast invalidation
/// - `DELETE /routes/delete` - Remove a route and its counters
/// - `GET /routes/fetch` - Profile plus all routes, schedules and forecasts
///
/// ## Hooks (identity provider)
/// - `POST /hooks/post-confirmation` - Create the user profile
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/health", get(health::health))
        // Route lifecycle
        .route("/routes/create", post(lifecycle::create_route))
        .route("/routes/update", put(lifecycle::update_route))
        .route("/routes/delete", delete(lifecycle::delete_route))
        .route("/routes/fetch", get(fetch::fetch_routes))
        // Identity hooks
        .route("/hooks/post-confirmation", post(hooks::post_confirmation))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

//! Route table for the termination control plane.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the application router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/health", get(handlers::api_health));

    let termination_routes = Router::new()
        .route("/api/terminations", post(handlers::terminations::start))
        .route(
            "/api/terminations/{execution_id}",
            get(handlers::terminations::get),
        )
        .route(
            "/api/terminations/{execution_id}/summary",
            get(handlers::terminations::summary),
        );

    let account_routes = Router::new()
        .route("/api/accounts/{account_id}", get(handlers::accounts::get))
        .route(
            "/api/accounts/{account_id}/executions",
            get(handlers::accounts::executions),
        );

    Router::new()
        .merge(health_routes)
        .merge(termination_routes)
        .merge(account_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

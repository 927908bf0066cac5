pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod lobby;
pub mod rate_limit;
pub mod room_loop;
pub mod room_registry;
pub mod scheduler;
pub mod state;
pub mod ws;

use axum::Router;
use axum::http::Method;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let state = AppState::new(config);
    (router(state.clone()), state)
}

/// Routes for an existing state. Tests use this to inject their own
/// profile store.
pub fn router(state: AppState) -> Router<()> {
    // API routes (behind bearer auth middleware)
    let api_routes = Router::new()
        .route("/rooms", get(api::list_rooms))
        .route("/catalog", get(api::get_catalog))
        .route("/leaderboard", get(api::get_leaderboard))
        .route("/profiles/{name}", get(api::get_profile))
        .route("/scores", post(api::submit_score))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_layer,
        ));

    // Read-only lobby data; browsers on other origins may fetch it
    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health_check))
        .nest("/api/v1", api_routes)
        .layer(cors)
        .with_state(state)
}

/// Middleware wrapper that injects AuthConfig into request extensions for the
/// bearer auth middleware.
async fn bearer_auth_layer(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut request: axum::extract::Request,
    next: middleware::Next,
) -> Result<axum::response::Response, axum::http::StatusCode> {
    request.extensions_mut().insert(state.auth.clone());
    auth::bearer_auth_middleware(request.headers().clone(), request, next).await
}

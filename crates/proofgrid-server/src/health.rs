use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: usize,
    pub rooms: RoomStats,
}

#[derive(Serialize)]
pub struct RoomStats {
    pub active: usize,
    pub players: usize,
}

/// Server status, live socket count, and room totals.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.ws_connection_count.load(Ordering::Relaxed);
    let (active, players) = state.rooms.read().await.stats();

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        connections,
        rooms: RoomStats { active, players },
    })
}

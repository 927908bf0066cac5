use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use proofgrid_core::catalog::{CATALOG, CATALOG_VERSION, Cell};
use proofgrid_core::player::normalize_display_name;
use proofgrid_core::profile::{ProfileError, ProfileScore};
use proofgrid_core::room::{GameMode, RoomInfo};

use crate::error::AppError;
use crate::state::AppState;

/// Rows returned by the all-time leaderboard.
const LEADERBOARD_LIMIT: usize = 10;

#[derive(Debug, Default, Deserialize)]
pub struct RoomsQuery {
    /// Optional mode filter. Legacy names are accepted.
    pub mode: Option<String>,
}

/// GET /api/v1/rooms: rooms still waiting for players.
pub async fn list_rooms(
    State(state): State<AppState>,
    Query(query): Query<RoomsQuery>,
) -> Result<Json<Vec<RoomInfo>>, AppError> {
    let mode = match query.mode.as_deref() {
        None => None,
        Some(raw) => Some(
            GameMode::from_str_opt(raw)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown mode: {raw}")))?,
        ),
    };
    let rooms = state.rooms.read().await.waiting_rooms();
    Ok(Json(
        rooms
            .into_iter()
            .filter(|r| mode.is_none_or(|m| r.mode == m))
            .collect(),
    ))
}

#[derive(Debug, Serialize)]
pub struct ShapeView {
    pub name: &'static str,
    pub cells: &'static [Cell],
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub version: u32,
    pub grid_size: usize,
    pub shapes: Vec<ShapeView>,
}

/// GET /api/v1/catalog: every shape a challenge can be drawn from.
pub async fn get_catalog(State(state): State<AppState>) -> Json<CatalogResponse> {
    Json(CatalogResponse {
        version: CATALOG_VERSION,
        grid_size: state.config.game.grid_size,
        shapes: CATALOG
            .iter()
            .map(|s| ShapeView {
                name: s.name,
                cells: s.cells,
            })
            .collect(),
    })
}

/// GET /api/v1/leaderboard: top all-time-high scores.
pub async fn get_leaderboard(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProfileScore>>, AppError> {
    let profiles = Arc::clone(&state.profiles);
    let top = tokio::task::spawn_blocking(move || profiles.top(LEADERBOARD_LIMIT)).await??;
    Ok(Json(top))
}

/// GET /api/v1/profiles/{name}: one player's all-time high.
pub async fn get_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ProfileScore>, AppError> {
    let profiles = Arc::clone(&state.profiles);
    let lookup = name.clone();
    let score = tokio::task::spawn_blocking(move || profiles.high_score(&lookup)).await??;
    match score {
        Some(high_score) => Ok(Json(ProfileScore {
            display_name: name,
            high_score,
        })),
        None => Err(AppError::NotFound(format!("No profile for {name}"))),
    }
}

/// Score from a single-player session.
#[derive(Debug, Deserialize)]
pub struct SubmitScoreBody {
    pub name: String,
    pub score: i64,
}

#[derive(Debug, Serialize)]
pub struct SubmitScoreResponse {
    pub display_name: String,
    pub high_score: u32,
    pub new_high: bool,
}

/// POST /api/v1/scores: record a solo score if it beats the player's high.
pub async fn submit_score(
    State(state): State<AppState>,
    Json(body): Json<SubmitScoreBody>,
) -> Result<Json<SubmitScoreResponse>, AppError> {
    let name = normalize_display_name(&body.name)
        .ok_or_else(|| AppError::BadRequest("Invalid player name".to_string()))?;
    let score = u32::try_from(body.score)
        .map_err(|_| AppError::BadRequest("Invalid score".to_string()))?;

    let profiles = Arc::clone(&state.profiles);
    let owned = name.clone();
    let (new_high, high_score) = tokio::task::spawn_blocking(move || {
        let new_high = profiles.record_if_higher(&owned, score)?;
        let best = profiles.high_score(&owned)?.unwrap_or(score);
        Ok::<_, ProfileError>((new_high, best))
    })
    .await??;

    if new_high {
        tracing::info!(name = %name, score, "New all-time high");
    }
    Ok(Json(SubmitScoreResponse {
        display_name: name,
        high_score,
        new_high,
    }))
}

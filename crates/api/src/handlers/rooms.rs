//! Read-only views of realtime room state.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    pub room_count: usize,
    pub client_count: usize,
}

/// GET /songs/{song_id}/participants
///
/// Participants currently in the song's room, in join order.
pub async fn list_participants(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let participants = state.rooms.room_clients(&song_id).await;
    Ok(Json(DataResponse::ok(participants)))
}

/// GET /rooms/stats
pub async fn room_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let stats = RoomStats {
        room_count: state.rooms.room_count().await,
        client_count: state.rooms.client_count().await,
    };
    Ok(Json(DataResponse::ok(stats)))
}

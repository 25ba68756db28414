pub mod annotation;
pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /health                                  service health
/// /ws                                      WebSocket (realtime collaboration)
///
/// /songs/{song_id}/annotations             list (?profile_id), create, delete (?profile_id)
/// /songs/{song_id}/annotations/bulk        bulk create
/// /songs/{song_id}/participants            current room members
///
/// /annotations/{id}                        get, update, soft delete
/// /annotations/{id}/restore                undo soft delete
///
/// /rooms/stats                             room and client counts
///
/// /compression/stats                       size stats for a payload
/// /compression/batch                       optimize + compress many paths
/// /compression/decompress                  fail-open decompress
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        // WebSocket endpoint.
        .route("/ws", get(ws::ws_handler))
        // Song-scoped annotations and presence.
        .nest(
            "/songs",
            annotation::song_router().route(
                "/{song_id}/participants",
                get(handlers::rooms::list_participants),
            ),
        )
        .nest("/annotations", annotation::router())
        .route("/rooms/stats", get(handlers::rooms::room_stats))
        // Codec diagnostics.
        .route("/compression/stats", post(handlers::compression::stats))
        .route("/compression/batch", post(handlers::compression::batch))
        .route(
            "/compression/decompress",
            post(handlers::compression::decompress_value),
        )
}

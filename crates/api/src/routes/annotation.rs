//! Route definitions for annotations.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::annotation;
use crate::state::AppState;

/// Song-scoped annotation routes, merged into `/songs`.
///
/// ```text
/// GET    /{song_id}/annotations          list_song_annotations (?profile_id)
/// POST   /{song_id}/annotations          create_song_annotation
/// DELETE /{song_id}/annotations          delete_song_annotations (?profile_id, required)
/// POST   /{song_id}/annotations/bulk     bulk_create_song_annotations
/// ```
pub fn song_router() -> Router<AppState> {
    Router::new()
        .route(
            "/{song_id}/annotations",
            get(annotation::list_song_annotations)
                .post(annotation::create_song_annotation)
                .delete(annotation::delete_song_annotations),
        )
        .route(
            "/{song_id}/annotations/bulk",
            post(annotation::bulk_create_song_annotations),
        )
}

/// Routes for a single annotation, nested under `/annotations`.
///
/// ```text
/// GET    /{id}            get_annotation
/// PUT    /{id}            update_annotation
/// DELETE /{id}            delete_annotation (soft)
/// POST   /{id}/restore    restore_annotation
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/{id}",
            get(annotation::get_annotation)
                .put(annotation::update_annotation)
                .delete(annotation::delete_annotation),
        )
        .route("/{id}/restore", post(annotation::restore_annotation))
}

//! Handlers for sheet-music annotations.
//!
//! Stored SVG is packed by the repository on write; every response here
//! carries the unpacked path so clients never see the storage encoding.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use cantor_core::compression::decompress;
use cantor_core::types::EntityId;
use cantor_db::models::annotation::{Annotation, CreateAnnotation, UpdateAnnotation};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/* --------------------------------------------------------------------------
   Request / response types
   -------------------------------------------------------------------------- */

/// Optional `?profile_id=` filter for song-scoped endpoints.
#[derive(Debug, Deserialize)]
pub struct ProfileFilter {
    pub profile_id: Option<String>,
}

/// Body of `POST /songs/{song_id}/annotations/bulk`.
#[derive(Debug, Deserialize)]
pub struct BulkCreateRequest {
    pub annotations: Vec<CreateAnnotation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedCount {
    pub deleted: u64,
}

fn unpack(mut annotation: Annotation) -> Annotation {
    annotation.svg_path = decompress(&annotation.svg_path);
    annotation
}

fn unpack_all(annotations: Vec<Annotation>) -> Vec<Annotation> {
    annotations.into_iter().map(unpack).collect()
}

/* --------------------------------------------------------------------------
   Song-scoped handlers
   -------------------------------------------------------------------------- */

/// GET /songs/{song_id}/annotations
///
/// Live annotations for a song, oldest first, optionally for one author.
pub async fn list_song_annotations(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
    Query(filter): Query<ProfileFilter>,
) -> AppResult<impl IntoResponse> {
    let annotations = match filter.profile_id {
        Some(profile_id) => {
            state
                .annotations
                .find_by_song_and_profile(&song_id, &profile_id)
                .await?
        }
        None => state.annotations.find_by_song(&song_id).await?,
    };
    Ok(Json(DataResponse::ok(unpack_all(annotations))))
}

/// POST /songs/{song_id}/annotations
///
/// The path's song id wins over any `songId` in the body.
pub async fn create_song_annotation(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
    Json(mut input): Json<CreateAnnotation>,
) -> AppResult<impl IntoResponse> {
    input.song_id = song_id;
    let annotation = state.annotations.create(input).await?;

    tracing::info!(
        annotation_id = %annotation.id,
        song_id = %annotation.song_id,
        profile_id = %annotation.profile_id,
        "Annotation created"
    );

    Ok((StatusCode::CREATED, Json(DataResponse::ok(unpack(annotation)))))
}

/// POST /songs/{song_id}/annotations/bulk
///
/// All-or-nothing: one invalid item rejects the batch.
pub async fn bulk_create_song_annotations(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
    Json(body): Json<BulkCreateRequest>,
) -> AppResult<impl IntoResponse> {
    let inputs: Vec<CreateAnnotation> = body
        .annotations
        .into_iter()
        .map(|mut input| {
            input.song_id = song_id.clone();
            input
        })
        .collect();

    let annotations = state.annotations.create_bulk(inputs).await?;
    tracing::info!(song_id = %song_id, count = annotations.len(), "Annotations bulk created");

    Ok((StatusCode::CREATED, Json(DataResponse::ok(unpack_all(annotations)))))
}

/// DELETE /songs/{song_id}/annotations?profile_id=
///
/// Soft-deletes every annotation the profile drew on the song.
pub async fn delete_song_annotations(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
    Query(filter): Query<ProfileFilter>,
) -> AppResult<impl IntoResponse> {
    let profile_id = filter
        .profile_id
        .ok_or_else(|| AppError::BadRequest("profile_id query parameter is required".into()))?;

    let deleted = state
        .annotations
        .delete_by_profile_and_song(&profile_id, &song_id)
        .await?;

    tracing::info!(song_id = %song_id, profile_id = %profile_id, deleted, "Annotations deleted");

    Ok(Json(DataResponse::ok(DeletedCount { deleted })))
}

/* --------------------------------------------------------------------------
   Annotation-scoped handlers
   -------------------------------------------------------------------------- */

/// GET /annotations/{id}
pub async fn get_annotation(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<impl IntoResponse> {
    let annotation = state.annotations.find_by_id(id).await?;
    Ok(Json(DataResponse::ok(unpack(annotation))))
}

/// PUT /annotations/{id}
pub async fn update_annotation(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    Json(input): Json<UpdateAnnotation>,
) -> AppResult<impl IntoResponse> {
    let annotation = state.annotations.update(id, input).await?;
    tracing::info!(annotation_id = %id, version = annotation.version, "Annotation updated");
    Ok(Json(DataResponse::ok(unpack(annotation))))
}

/// DELETE /annotations/{id}
pub async fn delete_annotation(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<impl IntoResponse> {
    state.annotations.soft_delete(id).await?;
    tracing::info!(annotation_id = %id, "Annotation soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /annotations/{id}/restore
pub async fn restore_annotation(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<impl IntoResponse> {
    let annotation = state.annotations.restore(id).await?;
    tracing::info!(annotation_id = %id, "Annotation restored");
    Ok(Json(DataResponse::ok(unpack(annotation))))
}

//! Repository for sheet-music annotations.

use std::sync::Arc;

use cantor_core::annotation::{
    validate_opacity, validate_required, validate_stroke_width, AnnotationTool, DEFAULT_COLOR,
};
use cantor_core::compression::pack_svg;
use cantor_core::error::CoreError;
use cantor_core::types::EntityId;
use chrono::Utc;

use super::RepoError;
use crate::models::annotation::{
    Annotation, AnnotationFilter, CreateAnnotation, UpdateAnnotation,
};
use crate::store::Store;

const ENTITY: &str = "annotation";

/// Validated access to annotation rows.
///
/// SVG written through the repository is optimized, checksummed, and (when
/// compression is enabled) gzip+base64 packed before it reaches the store.
/// Reads return the stored form; callers unpack it with
/// [`cantor_core::compression::decompress`].
#[derive(Clone)]
pub struct AnnotationRepo {
    store: Arc<dyn Store<Annotation>>,
    compress_svg: bool,
}

impl AnnotationRepo {
    /// Create a repository with SVG compression enabled.
    pub fn new(store: Arc<dyn Store<Annotation>>) -> Self {
        Self {
            store,
            compress_svg: true,
        }
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress_svg = enabled;
        self
    }

    /// Validate and insert a single annotation.
    pub async fn create(&self, input: CreateAnnotation) -> Result<Annotation, RepoError> {
        let row = self.build_row(input)?;
        let mut inserted = self.store.insert(vec![row]).await?;
        inserted
            .pop()
            .ok_or_else(|| CoreError::Internal("insert returned no rows".to_string()).into())
    }

    /// Validate every input, then insert them all in one batch.
    ///
    /// A single invalid item rejects the whole batch; the error message is
    /// prefixed with the item's index.
    pub async fn create_bulk(
        &self,
        inputs: Vec<CreateAnnotation>,
    ) -> Result<Vec<Annotation>, RepoError> {
        let mut rows = Vec::with_capacity(inputs.len());
        for (i, input) in inputs.into_iter().enumerate() {
            let row = self.build_row(input).map_err(|err| match err {
                CoreError::Validation(msg) => {
                    CoreError::Validation(format!("annotations[{i}]: {msg}"))
                }
                other => other,
            })?;
            rows.push(row);
        }
        if rows.is_empty() {
            return Ok(rows);
        }
        Ok(self.store.insert(rows).await?)
    }

    /// Fetch a live annotation.
    pub async fn find_by_id(&self, id: EntityId) -> Result<Annotation, RepoError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found(ENTITY, id).into())
    }

    /// Live annotations for a song, oldest first.
    pub async fn find_by_song(&self, song_id: &str) -> Result<Vec<Annotation>, RepoError> {
        validate_required("songId", song_id)?;
        Ok(self
            .store
            .find_all(&AnnotationFilter::by_song(song_id))
            .await?)
    }

    /// Live annotations for a song authored by one profile, oldest first.
    pub async fn find_by_song_and_profile(
        &self,
        song_id: &str,
        profile_id: &str,
    ) -> Result<Vec<Annotation>, RepoError> {
        validate_required("songId", song_id)?;
        validate_required("profileId", profile_id)?;
        Ok(self
            .store
            .find_all(&AnnotationFilter::by_song_and_profile(song_id, profile_id))
            .await?)
    }

    /// Apply a partial update. Bumps `version` and refreshes `updatedAt`;
    /// concurrent writers are not detected (last write wins).
    pub async fn update(
        &self,
        id: EntityId,
        input: UpdateAnnotation,
    ) -> Result<Annotation, RepoError> {
        let mut row = self.find_by_id(id).await?;

        if let Some(svg_path) = input.svg_path {
            validate_required("svgPath", &svg_path)?;
            let packed = pack_svg(&svg_path, self.compress_svg);
            row.svg_path = packed.svg_path;
            row.compressed_size = packed.compressed_size;
            row.checksum = Some(packed.checksum);
        }
        if let Some(tool) = input.tool {
            row.tool = tool.parse::<AnnotationTool>()?;
        }
        if let Some(color) = input.color {
            validate_required("color", &color)?;
            row.color = color;
        }
        if let Some(width) = input.stroke_width {
            validate_stroke_width(width)?;
            row.stroke_width = Some(width);
        }
        if let Some(opacity) = input.opacity {
            validate_opacity(opacity)?;
            row.opacity = Some(opacity);
        }
        if let Some(visible) = input.visible {
            row.visible = visible;
        }
        if let Some(page_number) = input.page_number {
            row.page_number = Some(page_number);
        }
        if let Some(metadata) = input.metadata {
            row.metadata = Some(serialize_metadata(&metadata)?);
        }

        row.version += 1;
        row.updated_at = Utc::now();

        self.store
            .update(row)
            .await?
            .ok_or_else(|| CoreError::not_found(ENTITY, id).into())
    }

    /// Soft-delete one annotation.
    pub async fn soft_delete(&self, id: EntityId) -> Result<(), RepoError> {
        let affected = self
            .store
            .soft_delete(&AnnotationFilter::by_id(id), Utc::now())
            .await?;
        if affected == 0 {
            return Err(CoreError::not_found(ENTITY, id).into());
        }
        Ok(())
    }

    /// Soft-delete every live annotation a profile authored on a song.
    /// Returns the number of rows deleted.
    pub async fn delete_by_profile_and_song(
        &self,
        profile_id: &str,
        song_id: &str,
    ) -> Result<u64, RepoError> {
        validate_required("profileId", profile_id)?;
        validate_required("songId", song_id)?;
        let affected = self
            .store
            .soft_delete(
                &AnnotationFilter::by_song_and_profile(song_id, profile_id),
                Utc::now(),
            )
            .await?;
        tracing::debug!(profile_id, song_id, affected, "Soft-deleted profile annotations");
        Ok(affected)
    }

    /// Undo a soft delete.
    pub async fn restore(&self, id: EntityId) -> Result<Annotation, RepoError> {
        self.store
            .restore(id)
            .await?
            .ok_or_else(|| CoreError::not_found(ENTITY, id).into())
    }

    /// Validate a create DTO and turn it into a new row.
    fn build_row(&self, input: CreateAnnotation) -> Result<Annotation, CoreError> {
        validate_required("songId", &input.song_id)?;
        validate_required("profileId", &input.profile_id)?;
        validate_required("svgPath", &input.svg_path)?;
        let tool = input.tool.parse::<AnnotationTool>()?;
        if let Some(width) = input.stroke_width {
            validate_stroke_width(width)?;
        }
        if let Some(opacity) = input.opacity {
            validate_opacity(opacity)?;
        }
        let metadata = input
            .metadata
            .as_ref()
            .map(serialize_metadata)
            .transpose()?;

        let packed = pack_svg(&input.svg_path, self.compress_svg);
        let now = Utc::now();

        Ok(Annotation {
            id: EntityId::new_v4(),
            song_id: input.song_id,
            profile_id: input.profile_id,
            svg_path: packed.svg_path,
            color: input
                .color
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            tool,
            stroke_width: input.stroke_width,
            opacity: input.opacity,
            visible: input.visible.unwrap_or(true),
            page_number: input.page_number,
            metadata,
            version: 1,
            compressed_size: packed.compressed_size,
            checksum: Some(packed.checksum),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }
}

fn serialize_metadata(metadata: &serde_json::Value) -> Result<String, CoreError> {
    serde_json::to_string(metadata)
        .map_err(|e| CoreError::Internal(format!("Failed to serialize metadata: {e}")))
}

//! Annotation model and DTOs.

use cantor_core::annotation::AnnotationTool;
use cantor_core::types::{EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::store::Entity;

/// A row from the `annotations` table.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: EntityId,
    pub song_id: String,
    /// Authoring profile.
    pub profile_id: String,
    /// Optimized SVG, possibly gzip+base64 encoded.
    pub svg_path: String,
    pub color: String,
    #[sqlx(try_from = "String")]
    pub tool: AnnotationTool,
    pub stroke_width: Option<f64>,
    pub opacity: Option<f64>,
    pub visible: bool,
    pub page_number: Option<i32>,
    /// JSON-encoded metadata.
    pub metadata: Option<String>,
    pub version: i32,
    pub compressed_size: Option<i32>,
    pub checksum: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

/// DTO for creating a new annotation.
///
/// Missing text fields deserialize as empty strings so they surface as
/// validation errors rather than body parse failures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateAnnotation {
    pub song_id: String,
    pub profile_id: String,
    pub svg_path: String,
    pub color: Option<String>,
    pub tool: String,
    pub stroke_width: Option<f64>,
    pub opacity: Option<f64>,
    pub visible: Option<bool>,
    pub page_number: Option<i32>,
    pub metadata: Option<serde_json::Value>,
}

/// DTO for updating an annotation. Only `Some` fields are applied.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateAnnotation {
    pub svg_path: Option<String>,
    pub color: Option<String>,
    pub tool: Option<String>,
    pub stroke_width: Option<f64>,
    pub opacity: Option<f64>,
    pub visible: Option<bool>,
    pub page_number: Option<i32>,
    pub metadata: Option<serde_json::Value>,
}

/// Row filter for annotation queries. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationFilter {
    pub id: Option<EntityId>,
    pub song_id: Option<String>,
    pub profile_id: Option<String>,
}

impl AnnotationFilter {
    pub fn by_id(id: EntityId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn by_song(song_id: impl Into<String>) -> Self {
        Self {
            song_id: Some(song_id.into()),
            ..Self::default()
        }
    }

    pub fn by_song_and_profile(song_id: impl Into<String>, profile_id: impl Into<String>) -> Self {
        Self {
            song_id: Some(song_id.into()),
            profile_id: Some(profile_id.into()),
            ..Self::default()
        }
    }
}

impl Entity for Annotation {
    const TABLE: &'static str = "annotations";
    type Filter = AnnotationFilter;

    fn id(&self) -> EntityId {
        self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn deleted_at(&self) -> Option<Timestamp> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, at: Option<Timestamp>) {
        self.deleted_at = at;
    }

    fn touch(&mut self, at: Timestamp) {
        self.updated_at = at;
    }

    fn matches(&self, filter: &AnnotationFilter) -> bool {
        filter.id.map_or(true, |id| id == self.id)
            && filter
                .song_id
                .as_deref()
                .map_or(true, |song_id| song_id == self.song_id)
            && filter
                .profile_id
                .as_deref()
                .map_or(true, |profile_id| profile_id == self.profile_id)
    }
}

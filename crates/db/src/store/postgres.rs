//! PostgreSQL-backed annotation store.

use async_trait::async_trait;
use cantor_core::types::{EntityId, Timestamp};

use super::Store;
use crate::models::annotation::{Annotation, AnnotationFilter};
use crate::{DbError, DbPool};

/// Column list for annotations queries.
const COLUMNS: &str = "id, song_id, profile_id, svg_path, color, tool, stroke_width, opacity, \
    visible, page_number, metadata, version, compressed_size, checksum, \
    created_at, updated_at, deleted_at";

/// `NULL` filter parameters match every row.
const FILTER: &str = "($1::uuid IS NULL OR id = $1) \
    AND ($2::text IS NULL OR song_id = $2) \
    AND ($3::text IS NULL OR profile_id = $3)";

/// Stores [`Annotation`] rows in the `annotations` table.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store<Annotation> for PgStore {
    async fn insert(&self, rows: Vec<Annotation>) -> Result<Vec<Annotation>, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(rows.len());

        let query = format!(
            "INSERT INTO annotations
                (id, song_id, profile_id, svg_path, color, tool, stroke_width, opacity,
                 visible, page_number, metadata, version, compressed_size, checksum,
                 created_at, updated_at, deleted_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
             RETURNING {COLUMNS}"
        );

        for row in &rows {
            let stored = sqlx::query_as::<_, Annotation>(&query)
                .bind(row.id)
                .bind(&row.song_id)
                .bind(&row.profile_id)
                .bind(&row.svg_path)
                .bind(&row.color)
                .bind(row.tool.as_str())
                .bind(row.stroke_width)
                .bind(row.opacity)
                .bind(row.visible)
                .bind(row.page_number)
                .bind(&row.metadata)
                .bind(row.version)
                .bind(row.compressed_size)
                .bind(&row.checksum)
                .bind(row.created_at)
                .bind(row.updated_at)
                .bind(row.deleted_at)
                .fetch_one(&mut *tx)
                .await?;
            inserted.push(stored);
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn find_by_id(&self, id: EntityId) -> Result<Option<Annotation>, DbError> {
        let query =
            format!("SELECT {COLUMNS} FROM annotations WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query_as::<_, Annotation>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_all(&self, filter: &AnnotationFilter) -> Result<Vec<Annotation>, DbError> {
        let query = format!(
            "SELECT {COLUMNS} FROM annotations
             WHERE {FILTER} AND deleted_at IS NULL
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, Annotation>(&query)
            .bind(filter.id)
            .bind(filter.song_id.as_deref())
            .bind(filter.profile_id.as_deref())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn update(&self, row: Annotation) -> Result<Option<Annotation>, DbError> {
        let query = format!(
            "UPDATE annotations SET
                svg_path = $2, color = $3, tool = $4, stroke_width = $5, opacity = $6,
                visible = $7, page_number = $8, metadata = $9, version = $10,
                compressed_size = $11, checksum = $12, updated_at = $13
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Annotation>(&query)
            .bind(row.id)
            .bind(&row.svg_path)
            .bind(&row.color)
            .bind(row.tool.as_str())
            .bind(row.stroke_width)
            .bind(row.opacity)
            .bind(row.visible)
            .bind(row.page_number)
            .bind(&row.metadata)
            .bind(row.version)
            .bind(row.compressed_size)
            .bind(&row.checksum)
            .bind(row.updated_at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(updated)
    }

    async fn soft_delete(&self, filter: &AnnotationFilter, at: Timestamp) -> Result<u64, DbError> {
        let query = format!(
            "UPDATE annotations SET deleted_at = $4
             WHERE {FILTER} AND deleted_at IS NULL"
        );
        let result = sqlx::query(&query)
            .bind(filter.id)
            .bind(filter.song_id.as_deref())
            .bind(filter.profile_id.as_deref())
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn restore(&self, id: EntityId) -> Result<Option<Annotation>, DbError> {
        let query = format!(
            "UPDATE annotations SET deleted_at = NULL, updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NOT NULL
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, Annotation>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn hard_delete(&self, id: EntityId) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM annotations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

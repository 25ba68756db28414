//! In-process [`Store`] used by tests and by servers started without a
//! database.

use async_trait::async_trait;
use cantor_core::types::{EntityId, Timestamp};
use chrono::Utc;
use tokio::sync::RwLock;

use super::{Entity, Store};
use crate::DbError;

/// Rows kept in insertion order behind a single lock.
pub struct MemoryStore<E> {
    rows: RwLock<Vec<E>>,
}

impl<E> MemoryStore<E> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }
}

impl<E> Default for MemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> Store<E> for MemoryStore<E> {
    async fn insert(&self, rows: Vec<E>) -> Result<Vec<E>, DbError> {
        let mut stored = self.rows.write().await;

        // Check the whole batch before touching the table.
        for (i, row) in rows.iter().enumerate() {
            let id = row.id();
            let clashes_with_table = stored.iter().any(|existing| existing.id() == id);
            let clashes_with_batch = rows[..i].iter().any(|earlier| earlier.id() == id);
            if clashes_with_table || clashes_with_batch {
                return Err(DbError::Duplicate {
                    table: E::TABLE,
                    id,
                });
            }
        }

        stored.extend(rows.iter().cloned());
        Ok(rows)
    }

    async fn find_by_id(&self, id: EntityId) -> Result<Option<E>, DbError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|row| row.id() == id && row.is_live())
            .cloned())
    }

    async fn find_all(&self, filter: &E::Filter) -> Result<Vec<E>, DbError> {
        let rows = self.rows.read().await;
        let mut found: Vec<E> = rows
            .iter()
            .filter(|row| row.is_live() && row.matches(filter))
            .cloned()
            .collect();
        // Stable, so rows created in the same instant keep insertion order.
        found.sort_by_key(|row| row.created_at());
        Ok(found)
    }

    async fn update(&self, row: E) -> Result<Option<E>, DbError> {
        let mut rows = self.rows.write().await;
        let Some(slot) = rows
            .iter_mut()
            .find(|existing| existing.id() == row.id() && existing.is_live())
        else {
            return Ok(None);
        };
        *slot = row.clone();
        Ok(Some(row))
    }

    async fn soft_delete(&self, filter: &E::Filter, at: Timestamp) -> Result<u64, DbError> {
        let mut rows = self.rows.write().await;
        let mut affected = 0;
        for row in rows
            .iter_mut()
            .filter(|row| row.is_live() && row.matches(filter))
        {
            row.set_deleted_at(Some(at));
            affected += 1;
        }
        Ok(affected)
    }

    async fn restore(&self, id: EntityId) -> Result<Option<E>, DbError> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows
            .iter_mut()
            .find(|row| row.id() == id && !row.is_live())
        else {
            return Ok(None);
        };
        row.set_deleted_at(None);
        row.touch(Utc::now());
        Ok(Some(row.clone()))
    }

    async fn hard_delete(&self, id: EntityId) -> Result<bool, DbError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| row.id() != id);
        Ok(rows.len() < before)
    }
}

//! Generic persistence interface.
//!
//! A [`Store`] persists one kind of [`Entity`], keyed by UUID. Reads never
//! return soft-deleted rows; `restore` and `hard_delete` are the only
//! operations that look past `deleted_at`.

use async_trait::async_trait;
use cantor_core::types::{EntityId, Timestamp};

use crate::DbError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A soft-deletable row with typed fields.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Table (or collection) name.
    const TABLE: &'static str;

    /// Equality filter used by [`Store::find_all`] and [`Store::soft_delete`].
    type Filter: Send + Sync;

    fn id(&self) -> EntityId;
    fn created_at(&self) -> Timestamp;
    fn deleted_at(&self) -> Option<Timestamp>;
    fn set_deleted_at(&mut self, at: Option<Timestamp>);

    /// Refresh the row's modification timestamp.
    fn touch(&mut self, at: Timestamp);

    /// Whether the row satisfies `filter`, ignoring `deleted_at`.
    fn matches(&self, filter: &Self::Filter) -> bool;

    fn is_live(&self) -> bool {
        self.deleted_at().is_none()
    }
}

#[async_trait]
pub trait Store<E: Entity>: Send + Sync {
    /// Insert all rows atomically: either every row is stored or none is.
    async fn insert(&self, rows: Vec<E>) -> Result<Vec<E>, DbError>;

    /// Fetch a live row.
    async fn find_by_id(&self, id: EntityId) -> Result<Option<E>, DbError>;

    /// Live rows matching `filter`, oldest first.
    async fn find_all(&self, filter: &E::Filter) -> Result<Vec<E>, DbError>;

    /// Replace a live row. Returns `None` if there is no live row with that id.
    async fn update(&self, row: E) -> Result<Option<E>, DbError>;

    /// Mark live rows matching `filter` deleted. Returns the affected count.
    async fn soft_delete(&self, filter: &E::Filter, at: Timestamp) -> Result<u64, DbError>;

    /// Clear `deleted_at` on a soft-deleted row.
    async fn restore(&self, id: EntityId) -> Result<Option<E>, DbError>;

    /// Permanently remove a row, live or not.
    async fn hard_delete(&self, id: EntityId) -> Result<bool, DbError>;
}

//! Repository layer.
//!
//! Repositories hold a shared [`Store`](crate::store::Store) and add
//! validation and domain-shaped queries on top of it.

use cantor_core::error::CoreError;

use crate::DbError;

pub mod annotation_repo;

pub use annotation_repo::AnnotationRepo;

/// Errors returned by repositories: domain failures (validation, not found)
/// or backend failures.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

use std::sync::Arc;

use cantor_db::models::annotation::Annotation;
use cantor_db::repositories::AnnotationRepo;
use cantor_db::store::{MemoryStore, PgStore, Store};
use cantor_db::DbPool;

use crate::config::ServerConfig;
use crate::ws::{EventRouter, RoomRegistry, RouterSettings};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool; `None` when running on the in-memory store.
    pub pool: Option<DbPool>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Annotation persistence.
    pub annotations: AnnotationRepo,
    /// Room membership for connected clients.
    pub rooms: Arc<RoomRegistry>,
    /// Realtime protocol router shared by all sockets.
    pub events: Arc<EventRouter>,
}

impl AppState {
    /// Wire up the stores, registry, and router. Uses PostgreSQL when a pool
    /// is given, otherwise an in-memory store.
    pub fn new(config: ServerConfig, pool: Option<DbPool>) -> Self {
        let store: Arc<dyn Store<Annotation>> = match &pool {
            Some(pool) => Arc::new(PgStore::new(pool.clone())),
            None => Arc::new(MemoryStore::<Annotation>::new()),
        };
        let annotations =
            AnnotationRepo::new(store).with_compression(config.realtime.compress_annotations);

        let rooms = Arc::new(RoomRegistry::new());
        let events = Arc::new(EventRouter::new(
            Arc::clone(&rooms),
            annotations.clone(),
            RouterSettings {
                persist_strokes: config.realtime.persist_strokes,
                command_expiry_secs: config.realtime.command_expiry_secs,
            },
        ));

        Self {
            pool,
            config: Arc::new(config),
            annotations,
            rooms,
            events,
        }
    }
}

//! WebSocket infrastructure for realtime collaboration.
//!
//! Provides room membership, the protocol router, heartbeat pings, and the
//! HTTP upgrade handler used by Axum routes.

pub mod connection;
mod handler;
mod heartbeat;
pub mod rooms;
pub mod router;

pub use connection::ConnectionHandle;
pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use rooms::RoomRegistry;
pub use router::{
    CommandTargetResolver, EventRouter, FrameOutcome, RouterSettings, Session, SessionState,
};

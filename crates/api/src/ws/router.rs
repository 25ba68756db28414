//! Realtime protocol state machine.
//!
//! One [`Session`] exists per WebSocket. The [`EventRouter`] is shared by all
//! sessions: it validates inbound frames against the session state, updates
//! the [`RoomRegistry`], fans out events, and persists completed strokes.
//!
//! ```text
//! Connected --connect--> Joined{room, profile} --disconnect/close--> Disconnected
//!     ^                    |  ^
//!     |                    +--+ connect (room switch)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use cantor_core::annotation::{points_to_svg_path, validate_required};
use cantor_core::collaboration::{
    ClientFrame, CommandTarget, DrawingEvent, ParticipantInfo, ServerFrame,
    DEFAULT_PROFILE_COLOR,
};
use cantor_db::models::annotation::CreateAnnotation;
use cantor_db::repositories::AnnotationRepo;
use serde_json::json;
use tokio_util::task::TaskTracker;

use super::connection::ConnectionHandle;
use super::rooms::RoomRegistry;

/// Where a session is in the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Socket open, no room joined yet.
    Connected,
    /// Registered in `room_key` as `profile_id`.
    Joined { room_key: String, profile_id: String },
    /// Terminal. Later frames are ignored.
    Disconnected,
}

/// Per-connection protocol state.
#[derive(Debug)]
pub struct Session {
    connection: ConnectionHandle,
    state: SessionState,
}

impl Session {
    pub fn new(connection: ConnectionHandle) -> Self {
        Self {
            connection,
            state: SessionState::Connected,
        }
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }
}

/// What the transport should do after a frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    Close,
}

/// Resolves the audience of a `command-send` frame to profile ids.
///
/// Role data (leaders, sessions) lives outside this service, so deployments
/// plug in their own resolver. The sender is always excluded afterwards.
#[async_trait]
pub trait CommandTargetResolver: Send + Sync {
    async fn resolve(
        &self,
        rooms: &RoomRegistry,
        room_key: &str,
        target: CommandTarget,
    ) -> Vec<String>;
}

/// Resolves every target to the whole room.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoomWideResolver;

#[async_trait]
impl CommandTargetResolver for RoomWideResolver {
    async fn resolve(
        &self,
        rooms: &RoomRegistry,
        room_key: &str,
        _target: CommandTarget,
    ) -> Vec<String> {
        rooms
            .room_clients(room_key)
            .await
            .into_iter()
            .map(|participant| participant.profile_id)
            .collect()
    }
}

/// Tunables for the event router.
#[derive(Debug, Clone, Copy)]
pub struct RouterSettings {
    pub persist_strokes: bool,
    pub command_expiry_secs: i64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            persist_strokes: true,
            command_expiry_secs: cantor_core::collaboration::COMMAND_EXPIRY_SECS,
        }
    }
}

/// Dispatches inbound frames for every session.
pub struct EventRouter {
    rooms: Arc<RoomRegistry>,
    annotations: AnnotationRepo,
    resolver: Arc<dyn CommandTargetResolver>,
    settings: RouterSettings,
    tasks: TaskTracker,
}

impl EventRouter {
    pub fn new(
        rooms: Arc<RoomRegistry>,
        annotations: AnnotationRepo,
        settings: RouterSettings,
    ) -> Self {
        Self {
            rooms,
            annotations,
            resolver: Arc::new(RoomWideResolver),
            settings,
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn CommandTargetResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    /// Wait until every in-flight stroke persistence task has finished.
    pub async fn wait_for_pending(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Parse and handle one text frame.
    pub async fn handle_text(&self, session: &mut Session, text: &str) -> FrameOutcome {
        if session.state == SessionState::Disconnected {
            return FrameOutcome::Close;
        }
        match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => self.handle_frame(session, frame).await,
            Err(e) => {
                tracing::debug!(conn_id = %session.connection.id(), error = %e, "Unparseable frame");
                session
                    .connection
                    .send_frame(&ServerFrame::error(format!("Invalid frame: {e}")));
                FrameOutcome::Continue
            }
        }
    }

    /// Handle one decoded frame.
    pub async fn handle_frame(&self, session: &mut Session, frame: ClientFrame) -> FrameOutcome {
        match frame {
            _ if session.state == SessionState::Disconnected => FrameOutcome::Close,

            ClientFrame::Connect {
                song_id,
                profile_id,
                profile_name,
                profile_color,
            } => {
                self.connect(session, song_id, profile_id, profile_name, profile_color)
                    .await;
                FrameOutcome::Continue
            }

            ClientFrame::Disconnect => {
                self.disconnect(session).await;
                FrameOutcome::Close
            }

            ClientFrame::Ping => {
                if matches!(session.state, SessionState::Joined { .. }) {
                    self.rooms.update_activity(session.connection.id()).await;
                }
                session.connection.send_frame(&ServerFrame::Pong);
                FrameOutcome::Continue
            }

            frame => {
                let SessionState::Joined {
                    room_key,
                    profile_id,
                } = session.state.clone()
                else {
                    session.connection.send_frame(&ServerFrame::error(
                        "Send a connect frame before anything else",
                    ));
                    return FrameOutcome::Continue;
                };

                let registered = self.rooms.update_activity(session.connection.id()).await;
                if registered != Some((profile_id.clone(), room_key.clone())) {
                    return self
                        .reject(session, "Session is no longer registered in a room")
                        .await;
                }
                self.dispatch(session, &room_key, &profile_id, frame).await
            }
        }
    }

    /// Leave the room (if any) and end the session. Idempotent.
    pub async fn disconnect(&self, session: &mut Session) {
        if session.state == SessionState::Disconnected {
            return;
        }
        self.rooms.leave(session.connection.id()).await;
        session.state = SessionState::Disconnected;
    }

    /// Refresh activity for transport-level liveness (WebSocket pongs).
    pub async fn touch(&self, session: &Session) {
        if matches!(session.state, SessionState::Joined { .. }) {
            self.rooms.update_activity(session.connection.id()).await;
        }
    }

    async fn connect(
        &self,
        session: &mut Session,
        song_id: String,
        profile_id: String,
        profile_name: String,
        profile_color: Option<String>,
    ) {
        let valid = validate_required("songId", &song_id)
            .and_then(|()| validate_required("profileId", &profile_id));
        if let Err(e) = valid {
            session.connection.send_frame(&ServerFrame::error(e.to_string()));
            return;
        }

        let info = ParticipantInfo {
            profile_name: if profile_name.trim().is_empty() {
                profile_id.clone()
            } else {
                profile_name
            },
            profile_color: profile_color
                .filter(|color| !color.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PROFILE_COLOR.to_string()),
            profile_id: profile_id.clone(),
        };

        let participants = self
            .rooms
            .join(session.connection.clone(), info, &song_id)
            .await;

        session.state = SessionState::Joined {
            room_key: song_id.clone(),
            profile_id,
        };
        session.connection.send_frame(&ServerFrame::RoomJoined {
            room_key: song_id,
            participants,
        });
    }

    async fn dispatch(
        &self,
        session: &mut Session,
        room_key: &str,
        profile_id: &str,
        frame: ClientFrame,
    ) -> FrameOutcome {
        match frame {
            ClientFrame::PageChange { page_number } => {
                let frame = ServerFrame::PageChanged {
                    profile_id: profile_id.to_string(),
                    page_number,
                };
                self.rooms
                    .broadcast_to_room(room_key, Some(profile_id), &frame)
                    .await;
            }

            ClientFrame::Drawing { event } => {
                if event.song_id != room_key || event.profile_id != profile_id {
                    return self
                        .reject(session, "Drawing event does not belong to this session")
                        .await;
                }
                let persist = event.is_complete && self.settings.persist_strokes;
                let frame = ServerFrame::Drawing {
                    profile_id: profile_id.to_string(),
                    event: event.clone(),
                };
                self.rooms
                    .broadcast_to_room(room_key, Some(profile_id), &frame)
                    .await;
                if persist {
                    self.persist_stroke(room_key, profile_id, event);
                }
            }

            ClientFrame::CommandSend {
                target,
                command,
                payload,
            } => {
                if command.trim().is_empty() {
                    session
                        .connection
                        .send_frame(&ServerFrame::error("command is required"));
                    return FrameOutcome::Continue;
                }
                let recipients = self.resolver.resolve(&self.rooms, room_key, target).await;
                let frame = ServerFrame::command(
                    profile_id,
                    target,
                    command,
                    payload,
                    self.settings.command_expiry_secs,
                );
                let mut delivered = 0;
                for recipient in recipients.iter().filter(|r| r.as_str() != profile_id) {
                    if self.rooms.send_to(recipient, &frame).await {
                        delivered += 1;
                    }
                }
                tracing::debug!(profile_id, room_key, ?target, delivered, "Command sent");
            }

            // Session-level frames are handled before dispatch.
            ClientFrame::Connect { .. } | ClientFrame::Disconnect | ClientFrame::Ping => {}
        }
        FrameOutcome::Continue
    }

    /// Leave, report `message`, and close the socket.
    async fn reject(&self, session: &mut Session, message: &str) -> FrameOutcome {
        tracing::warn!(conn_id = %session.connection.id(), message, "Closing session");
        self.rooms.leave(session.connection.id()).await;
        session.connection.send_frame(&ServerFrame::error(message));
        session.connection.close();
        session.state = SessionState::Disconnected;
        FrameOutcome::Close
    }

    /// Store a completed stroke in the background and tell its author.
    fn persist_stroke(&self, room_key: &str, profile_id: &str, event: DrawingEvent) {
        let Some(svg_path) = points_to_svg_path(&event.points) else {
            tracing::debug!(drawing_id = %event.id, "Skipping empty stroke");
            return;
        };

        let input = CreateAnnotation {
            song_id: room_key.to_string(),
            profile_id: profile_id.to_string(),
            svg_path,
            color: event.tool_settings.color.clone(),
            tool: event.tool.as_str().to_string(),
            stroke_width: event.tool_settings.stroke_width,
            opacity: event.tool_settings.opacity,
            visible: Some(true),
            page_number: i32::try_from(event.page_number).ok(),
            metadata: Some(json!({
                "drawingId": event.id,
                "toolSettings": event.tool_settings,
            })),
        };

        let annotations = self.annotations.clone();
        let rooms = Arc::clone(&self.rooms);
        let room_key = room_key.to_string();
        let profile_id = profile_id.to_string();
        let drawing_id = event.id;

        self.tasks.spawn(async move {
            match annotations.create(input).await {
                Ok(annotation) => {
                    tracing::debug!(
                        annotation_id = %annotation.id,
                        drawing_id = %drawing_id,
                        room_key = %room_key,
                        "Stroke persisted"
                    );
                    let saved = ServerFrame::AnnotationSaved {
                        drawing_id,
                        annotation_id: annotation.id,
                    };
                    rooms.send_to(&profile_id, &saved).await;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        drawing_id = %drawing_id,
                        room_key = %room_key,
                        "Failed to persist stroke"
                    );
                }
            }
        });
    }
}

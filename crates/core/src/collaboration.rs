//! Realtime collaboration wire protocol.
//!
//! Frames are JSON objects with an internally-tagged `"type"` discriminator
//! so the browser client can route by type string. Inbound frame names use
//! kebab-case (`page-change`), outbound event names use `noun:verb`
//! (`participant:joined`).

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::annotation::{AnnotationTool, Point};
use crate::types::{EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// How long a broadcast command stays actionable on clients (in seconds).
pub const COMMAND_EXPIRY_SECS: i64 = 30;

/// Presence color assigned when a client does not pick one.
pub const DEFAULT_PROFILE_COLOR: &str = "#3B82F6";

// ---------------------------------------------------------------------------
// Shared payloads
// ---------------------------------------------------------------------------

/// Public presence information about a room participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub profile_id: String,
    pub profile_name: String,
    pub profile_color: String,
}

/// Rendering settings attached to a stroke. Unknown keys are preserved so
/// newer clients can pass extra settings through older servers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One progressive update of an in-flight stroke.
///
/// Frames sharing an `id` describe the same stroke; the frame with
/// `is_complete` set is the one eligible for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawingEvent {
    pub id: String,
    pub song_id: String,
    pub page_number: u32,
    pub profile_id: String,
    pub tool: AnnotationTool,
    pub points: Vec<Point>,
    #[serde(default)]
    pub tool_settings: ToolSettings,
    #[serde(default)]
    pub is_complete: bool,
}

/// Audience of a `command-send` frame. Resolving a target to concrete
/// profiles needs role data and is delegated to the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandTarget {
    All,
    Leaders,
    Sessions,
}

// ---------------------------------------------------------------------------
// Inbound frames
// ---------------------------------------------------------------------------

/// Frames a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Join the room of a song. Must be the first frame on a connection.
    #[serde(rename = "connect", rename_all = "camelCase")]
    Connect {
        song_id: String,
        profile_id: String,
        profile_name: String,
        #[serde(default)]
        profile_color: Option<String>,
    },

    /// The client turned to another page of the sheet music.
    #[serde(rename = "page-change", rename_all = "camelCase")]
    PageChange { page_number: u32 },

    /// A progressive or final stroke update.
    #[serde(rename = "drawing-event")]
    Drawing { event: DrawingEvent },

    /// A command for (a subset of) the room, e.g. "next song".
    #[serde(rename = "command-send")]
    CommandSend {
        target: CommandTarget,
        command: String,
        #[serde(default)]
        payload: serde_json::Value,
    },

    #[serde(rename = "ping")]
    Ping,

    /// Leave the room and end the session.
    #[serde(rename = "disconnect")]
    Disconnect,
}

// ---------------------------------------------------------------------------
// Outbound frames
// ---------------------------------------------------------------------------

/// Frames the server sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Sent to a joining client: who is already in the room.
    #[serde(rename = "room:joined", rename_all = "camelCase")]
    RoomJoined {
        room_key: String,
        participants: Vec<ParticipantInfo>,
    },

    #[serde(rename = "participant:joined")]
    ParticipantJoined { participant: ParticipantInfo },

    #[serde(rename = "participant:left", rename_all = "camelCase")]
    ParticipantLeft {
        profile_id: String,
        profile_name: String,
    },

    #[serde(rename = "page:changed", rename_all = "camelCase")]
    PageChanged { profile_id: String, page_number: u32 },

    #[serde(rename = "drawing:event", rename_all = "camelCase")]
    Drawing {
        profile_id: String,
        event: DrawingEvent,
    },

    #[serde(rename = "command:received", rename_all = "camelCase")]
    CommandReceived {
        command_id: EntityId,
        from_profile_id: String,
        target: CommandTarget,
        command: String,
        payload: serde_json::Value,
        sent_at: Timestamp,
        expires_at: Timestamp,
    },

    /// Sent to a stroke's author once it has been persisted.
    #[serde(rename = "annotation:saved", rename_all = "camelCase")]
    AnnotationSaved {
        drawing_id: String,
        annotation_id: EntityId,
    },

    #[serde(rename = "pong")]
    Pong,

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerFrame {
    /// Build an `error` frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Build a `command:received` frame stamped now, expiring after
    /// `expiry_secs`.
    pub fn command(
        from_profile_id: impl Into<String>,
        target: CommandTarget,
        command: impl Into<String>,
        payload: serde_json::Value,
        expiry_secs: i64,
    ) -> Self {
        let sent_at = Utc::now();
        Self::CommandReceived {
            command_id: uuid::Uuid::new_v4(),
            from_profile_id: from_profile_id.into(),
            target,
            command: command.into(),
            payload,
            sent_at,
            expires_at: sent_at + chrono::Duration::seconds(expiry_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

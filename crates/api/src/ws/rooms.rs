//! Room membership for realtime collaboration.
//!
//! A room is keyed by song id and holds the participants currently viewing
//! that song, in join order. Each profile has at most one live connection:
//! joining again from a new connection evicts the old one.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::Message;
use cantor_core::collaboration::{ParticipantInfo, ServerFrame};
use indexmap::IndexSet;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::connection::{encode, ConnectionHandle};

/// A registered connection.
struct Participant {
    connection: ConnectionHandle,
    info: ParticipantInfo,
    room_key: String,
    last_activity: Instant,
}

#[derive(Default)]
struct RegistryState {
    /// connection id -> profile id
    by_connection: HashMap<String, String>,
    /// profile id -> participant
    participants: HashMap<String, Participant>,
    /// room key -> member profile ids, in join order
    rooms: HashMap<String, IndexSet<String>>,
}

impl RegistryState {
    /// Remove a participant from every map, announcing the departure to
    /// whoever is left in the room. The room is dropped once empty.
    fn remove_participant(&mut self, profile_id: &str) -> Option<Participant> {
        let participant = self.participants.remove(profile_id)?;
        self.by_connection.remove(participant.connection.id());

        let remaining = match self.rooms.get_mut(&participant.room_key) {
            Some(members) => {
                members.shift_remove(profile_id);
                members.len()
            }
            None => 0,
        };

        if remaining == 0 {
            self.rooms.remove(&participant.room_key);
            tracing::debug!(room_key = %participant.room_key, "Room closed");
        } else {
            let frame = ServerFrame::ParticipantLeft {
                profile_id: participant.info.profile_id.clone(),
                profile_name: participant.info.profile_name.clone(),
            };
            self.deliver(&participant.room_key, None, &frame);
        }

        Some(participant)
    }

    /// Send `frame` to every member of a room except `exclude`.
    fn deliver(&self, room_key: &str, exclude: Option<&str>, frame: &ServerFrame) -> usize {
        let Some(members) = self.rooms.get(room_key) else {
            return 0;
        };
        let Some(message) = encode(frame) else {
            return 0;
        };
        members
            .iter()
            .filter(|profile_id| Some(profile_id.as_str()) != exclude)
            .filter_map(|profile_id| self.participants.get(profile_id))
            .filter(|participant| participant.connection.send(message.clone()))
            .count()
    }
}

/// Tracks which connections are in which rooms.
///
/// Thread-safe via a single interior `RwLock`; designed to be wrapped in
/// `Arc` and shared across the application.
pub struct RoomRegistry {
    state: RwLock<RegistryState>,
}

impl RoomRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Admit a connection into a room.
    ///
    /// If the connection is already registered it leaves its current room
    /// first. If the profile is live on another connection, that connection
    /// is evicted and closed. Existing members are told about the joiner
    /// before this returns.
    ///
    /// Returns the members that were already in the room, in join order.
    pub async fn join(
        &self,
        connection: ConnectionHandle,
        info: ParticipantInfo,
        room_key: &str,
    ) -> Vec<ParticipantInfo> {
        let mut state = self.state.write().await;

        if let Some(previous_profile) = state.by_connection.get(connection.id()).cloned() {
            state.remove_participant(&previous_profile);
        }

        if let Some(evicted) = state.remove_participant(&info.profile_id) {
            tracing::info!(
                profile_id = %info.profile_id,
                conn_id = %evicted.connection.id(),
                "Evicting previous connection for profile"
            );
            evicted.connection.close();
        }

        let existing: Vec<ParticipantInfo> = state
            .rooms
            .get(room_key)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|profile_id| state.participants.get(profile_id))
                    .map(|participant| participant.info.clone())
                    .collect()
            })
            .unwrap_or_default();

        let profile_id = info.profile_id.clone();
        state
            .by_connection
            .insert(connection.id().to_string(), profile_id.clone());
        state.participants.insert(
            profile_id.clone(),
            Participant {
                connection,
                info: info.clone(),
                room_key: room_key.to_string(),
                last_activity: Instant::now(),
            },
        );
        state
            .rooms
            .entry(room_key.to_string())
            .or_default()
            .insert(profile_id.clone());

        state.deliver(
            room_key,
            Some(profile_id.as_str()),
            &ServerFrame::ParticipantJoined { participant: info },
        );

        tracing::info!(
            profile_id = %profile_id,
            room_key,
            members = existing.len() + 1,
            "Participant joined room"
        );

        existing
    }

    /// Remove a connection from its room. Unknown connections are a no-op.
    pub async fn leave(&self, connection_id: &str) -> Option<ParticipantInfo> {
        let mut state = self.state.write().await;
        let profile_id = state.by_connection.get(connection_id)?.clone();
        let participant = state.remove_participant(&profile_id)?;
        tracing::info!(
            profile_id = %profile_id,
            room_key = %participant.room_key,
            "Participant left room"
        );
        Some(participant.info)
    }

    /// Send `frame` to every member of a room except `exclude_profile_id`.
    /// Returns the number of connections it was queued on.
    pub async fn broadcast_to_room(
        &self,
        room_key: &str,
        exclude_profile_id: Option<&str>,
        frame: &ServerFrame,
    ) -> usize {
        self.state
            .read()
            .await
            .deliver(room_key, exclude_profile_id, frame)
    }

    /// Send `frame` to every member of a room.
    pub async fn broadcast_to_room_all(&self, room_key: &str, frame: &ServerFrame) -> usize {
        self.broadcast_to_room(room_key, None, frame).await
    }

    /// Unicast to a profile's live connection. Dropped silently if the
    /// profile is not connected.
    pub async fn send_to(&self, profile_id: &str, frame: &ServerFrame) -> bool {
        let state = self.state.read().await;
        state
            .participants
            .get(profile_id)
            .is_some_and(|participant| participant.connection.send_frame(frame))
    }

    /// Mark a connection active. Returns its `(profile_id, room_key)`
    /// registration, or `None` if it is no longer registered.
    pub async fn update_activity(&self, connection_id: &str) -> Option<(String, String)> {
        let mut state = self.state.write().await;
        let profile_id = state.by_connection.get(connection_id)?.clone();
        let participant = state.participants.get_mut(&profile_id)?;
        participant.last_activity = Instant::now();
        Some((profile_id, participant.room_key.clone()))
    }

    /// Evict every participant idle for longer than `timeout`, closing
    /// their connections. Returns the evicted profile ids.
    pub async fn cleanup_inactive(&self, timeout: Duration) -> Vec<String> {
        let mut state = self.state.write().await;
        let now = Instant::now();

        let stale: Vec<String> = state
            .participants
            .iter()
            .filter(|(_, participant)| now.duration_since(participant.last_activity) > timeout)
            .map(|(profile_id, _)| profile_id.clone())
            .collect();

        for profile_id in &stale {
            if let Some(participant) = state.remove_participant(profile_id) {
                tracing::info!(
                    profile_id = %profile_id,
                    room_key = %participant.room_key,
                    "Evicting idle participant"
                );
                participant.connection.close();
            }
        }

        stale
    }

    /// Number of non-empty rooms.
    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }

    /// Number of registered participants.
    pub async fn client_count(&self) -> usize {
        self.state.read().await.participants.len()
    }

    /// Members of a room, in join order.
    pub async fn room_clients(&self, room_key: &str) -> Vec<ParticipantInfo> {
        let state = self.state.read().await;
        state
            .rooms
            .get(room_key)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|profile_id| state.participants.get(profile_id))
                    .map(|participant| participant.info.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Send a Ping frame to every registered connection.
    pub async fn ping_all(&self) -> usize {
        let state = self.state.read().await;
        state
            .participants
            .values()
            .filter(|participant| participant.connection.ping())
            .count()
    }

    /// Send a Close frame to every connection, then clear all rooms.
    pub async fn shutdown_all(&self) -> usize {
        let mut state = self.state.write().await;
        let count = state.participants.len();
        for participant in state.participants.values() {
            let _ = participant.connection.send(Message::Close(None));
        }
        *state = RegistryState::default();
        tracing::info!(count, "Closed all room connections");
        count
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

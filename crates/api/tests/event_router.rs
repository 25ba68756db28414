//! Tests for the realtime `EventRouter` protocol state machine.
//!
//! Each session is driven with JSON text frames exactly as a socket would
//! deliver them; outbound frames are read back from the connection channel.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::Message;
use cantor_api::ws::{
    CommandTargetResolver, ConnectionHandle, EventRouter, FrameOutcome, RoomRegistry,
    RouterSettings, Session, SessionState,
};
use cantor_core::collaboration::CommandTarget;
use cantor_core::compression::{decompress, optimize};
use cantor_core::types::{EntityId, Timestamp};
use cantor_db::models::annotation::{Annotation, AnnotationFilter};
use cantor_db::repositories::AnnotationRepo;
use cantor_db::store::{MemoryStore, Store};
use cantor_db::DbError;
use chrono::{DateTime, Utc};
use common::{drain_frames, frame_types, received_close};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

struct Harness {
    events: EventRouter,
    annotations: AnnotationRepo,
}

fn harness_with(settings: RouterSettings) -> Harness {
    let store = Arc::new(MemoryStore::<Annotation>::new());
    let annotations = AnnotationRepo::new(store);
    let events = EventRouter::new(Arc::new(RoomRegistry::new()), annotations.clone(), settings);
    Harness {
        events,
        annotations,
    }
}

fn harness() -> Harness {
    harness_with(RouterSettings::default())
}

fn session() -> (Session, UnboundedReceiver<Message>) {
    let (connection, rx) = ConnectionHandle::channel();
    (Session::new(connection), rx)
}

async fn send(events: &EventRouter, session: &mut Session, frame: Value) -> FrameOutcome {
    events.handle_text(session, &frame.to_string()).await
}

async fn connect(
    events: &EventRouter,
    profile_id: &str,
    song_id: &str,
) -> (Session, UnboundedReceiver<Message>) {
    let (mut session, rx) = session();
    let outcome = send(
        events,
        &mut session,
        json!({
            "type": "connect",
            "songId": song_id,
            "profileId": profile_id,
            "profileName": format!("Name {profile_id}"),
        }),
    )
    .await;
    assert_eq!(outcome, FrameOutcome::Continue);
    (session, rx)
}

fn drawing(song_id: &str, profile_id: &str, is_complete: bool) -> Value {
    json!({
        "type": "drawing-event",
        "event": {
            "id": "stroke-1",
            "songId": song_id,
            "pageNumber": 2,
            "profileId": profile_id,
            "tool": "pen",
            "points": [{"x": 1.0, "y": 2.0}, {"x": 3.5, "y": 4.25}],
            "toolSettings": {"color": "#ff0000", "strokeWidth": 2.0},
            "isComplete": is_complete,
        }
    })
}

// ---------------------------------------------------------------------------
// Test: connect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_joiner_sees_first_and_first_is_notified() {
    let h = harness();

    let (session_a, mut rx_a) = connect(&h.events, "A", "song-1").await;
    let frames_a = drain_frames(&mut rx_a);
    assert_eq!(frame_types(&frames_a), vec!["room:joined"]);
    assert_eq!(frames_a[0]["roomKey"], "song-1");
    assert_eq!(frames_a[0]["participants"], json!([]));

    let (_session_b, mut rx_b) = connect(&h.events, "B", "song-1").await;
    let frames_b = drain_frames(&mut rx_b);
    assert_eq!(frame_types(&frames_b), vec!["room:joined"]);
    assert_eq!(frames_b[0]["participants"][0]["profileId"], "A");
    assert_eq!(frames_b[0]["participants"][0]["profileColor"], "#3B82F6");

    let frames_a = drain_frames(&mut rx_a);
    assert_eq!(frame_types(&frames_a), vec!["participant:joined"]);
    assert_eq!(frames_a[0]["participant"]["profileId"], "B");

    assert_eq!(
        session_a.state(),
        &SessionState::Joined {
            room_key: "song-1".into(),
            profile_id: "A".into()
        }
    );
}

#[tokio::test]
async fn connect_with_blank_song_is_rejected() {
    let h = harness();
    let (mut session, mut rx) = session();

    send(
        &h.events,
        &mut session,
        json!({"type": "connect", "songId": "", "profileId": "A", "profileName": "A"}),
    )
    .await;

    let frames = drain_frames(&mut rx);
    assert_eq!(frame_types(&frames), vec!["error"]);
    assert_eq!(session.state(), &SessionState::Connected);
    assert_eq!(h.events.rooms().client_count().await, 0);
}

#[tokio::test]
async fn connect_while_joined_switches_rooms() {
    let h = harness();
    let (mut session_a, _rx_a) = connect(&h.events, "A", "song-1").await;
    let (_session_b, mut rx_b) = connect(&h.events, "B", "song-1").await;

    send(
        &h.events,
        &mut session_a,
        json!({"type": "connect", "songId": "song-2", "profileId": "A", "profileName": "A"}),
    )
    .await;

    assert_eq!(frame_types(&drain_frames(&mut rx_b)), vec!["participant:left"]);
    assert_eq!(h.events.rooms().room_clients("song-2").await.len(), 1);
    assert_eq!(h.events.rooms().room_clients("song-1").await.len(), 1);
}

// ---------------------------------------------------------------------------
// Test: frames before connect / malformed frames
// ---------------------------------------------------------------------------

#[tokio::test]
async fn frame_before_connect_gets_error() {
    let h = harness();
    let (mut session, mut rx) = session();

    let outcome = send(
        &h.events,
        &mut session,
        json!({"type": "page-change", "pageNumber": 1}),
    )
    .await;

    assert_eq!(outcome, FrameOutcome::Continue);
    assert_eq!(frame_types(&drain_frames(&mut rx)), vec!["error"]);
    assert_eq!(session.state(), &SessionState::Connected);
}

#[tokio::test]
async fn unparseable_frame_gets_error_and_keeps_state() {
    let h = harness();
    let (mut session, mut rx) = connect(&h.events, "A", "song-1").await;
    drain_frames(&mut rx);

    let outcome = h.events.handle_text(&mut session, "{not json").await;
    assert_eq!(outcome, FrameOutcome::Continue);

    let outcome = send(&h.events, &mut session, json!({"type": "teleport"})).await;
    assert_eq!(outcome, FrameOutcome::Continue);

    assert_eq!(frame_types(&drain_frames(&mut rx)), vec!["error", "error"]);
    assert!(matches!(session.state(), SessionState::Joined { .. }));
}

#[tokio::test]
async fn ping_gets_pong() {
    let h = harness();
    let (mut session, mut rx) = session();

    send(&h.events, &mut session, json!({"type": "ping"})).await;
    assert_eq!(frame_types(&drain_frames(&mut rx)), vec!["pong"]);
}

// ---------------------------------------------------------------------------
// Test: page changes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn page_change_goes_to_peers_only() {
    let h = harness();
    let (mut session_a, mut rx_a) = connect(&h.events, "A", "song-1").await;
    let (_session_b, mut rx_b) = connect(&h.events, "B", "song-1").await;
    drain_frames(&mut rx_a);
    drain_frames(&mut rx_b);

    send(
        &h.events,
        &mut session_a,
        json!({"type": "page-change", "pageNumber": 4}),
    )
    .await;

    assert!(drain_frames(&mut rx_a).is_empty());
    let frames_b = drain_frames(&mut rx_b);
    assert_eq!(frame_types(&frames_b), vec!["page:changed"]);
    assert_eq!(frames_b[0]["profileId"], "A");
    assert_eq!(frames_b[0]["pageNumber"], 4);
}

// ---------------------------------------------------------------------------
// Test: drawing events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completed_stroke_is_broadcast_then_persisted() {
    let h = harness();
    let (mut session_a, mut rx_a) = connect(&h.events, "A", "song-1").await;
    let (_session_b, mut rx_b) = connect(&h.events, "B", "song-1").await;
    drain_frames(&mut rx_a);
    drain_frames(&mut rx_b);

    send(&h.events, &mut session_a, drawing("song-1", "A", true)).await;

    let frames_b = drain_frames(&mut rx_b);
    assert_eq!(frame_types(&frames_b), vec!["drawing:event"]);
    assert_eq!(frames_b[0]["event"]["id"], "stroke-1");

    h.events.wait_for_pending().await;

    let stored = h.annotations.find_by_song("song-1").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].profile_id, "A");
    assert_eq!(stored[0].color, "#ff0000");
    assert_eq!(stored[0].page_number, Some(2));
    assert_eq!(
        decompress(&stored[0].svg_path),
        optimize("M 1 2 L 3.5 4.25")
    );
    assert!(stored[0]
        .metadata
        .as_deref()
        .is_some_and(|m| m.contains("stroke-1")));

    // Only the author hears about the save.
    let frames_a = drain_frames(&mut rx_a);
    assert_eq!(frame_types(&frames_a), vec!["annotation:saved"]);
    assert_eq!(frames_a[0]["drawingId"], "stroke-1");
    assert_eq!(frames_a[0]["annotationId"], stored[0].id.to_string());
    assert!(drain_frames(&mut rx_b).is_empty());
}

/// A store whose database is unreachable.
struct UnavailableStore;

fn unavailable() -> DbError {
    DbError::Sqlx(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl Store<Annotation> for UnavailableStore {
    async fn insert(&self, _rows: Vec<Annotation>) -> Result<Vec<Annotation>, DbError> {
        Err(unavailable())
    }

    async fn find_by_id(&self, _id: EntityId) -> Result<Option<Annotation>, DbError> {
        Err(unavailable())
    }

    async fn find_all(&self, _filter: &AnnotationFilter) -> Result<Vec<Annotation>, DbError> {
        Err(unavailable())
    }

    async fn update(&self, _row: Annotation) -> Result<Option<Annotation>, DbError> {
        Err(unavailable())
    }

    async fn soft_delete(
        &self,
        _filter: &AnnotationFilter,
        _at: Timestamp,
    ) -> Result<u64, DbError> {
        Err(unavailable())
    }

    async fn restore(&self, _id: EntityId) -> Result<Option<Annotation>, DbError> {
        Err(unavailable())
    }

    async fn hard_delete(&self, _id: EntityId) -> Result<bool, DbError> {
        Err(unavailable())
    }
}

#[tokio::test]
async fn failed_persistence_still_broadcasts_stroke() {
    let events = EventRouter::new(
        Arc::new(RoomRegistry::new()),
        AnnotationRepo::new(Arc::new(UnavailableStore)),
        RouterSettings::default(),
    );
    let (mut session_a, mut rx_a) = connect(&events, "A", "song-1").await;
    let (_session_b, mut rx_b) = connect(&events, "B", "song-1").await;
    drain_frames(&mut rx_a);
    drain_frames(&mut rx_b);

    let outcome = send(&events, &mut session_a, drawing("song-1", "A", true)).await;
    events.wait_for_pending().await;

    assert_eq!(outcome, FrameOutcome::Continue);
    let frames_b = drain_frames(&mut rx_b);
    assert_eq!(frame_types(&frames_b), vec!["drawing:event"]);
    assert_eq!(frames_b[0]["event"]["id"], "stroke-1");

    // No save confirmation, and the author stays in the room.
    assert!(drain_frames(&mut rx_a).is_empty());
    assert!(matches!(session_a.state(), SessionState::Joined { .. }));
    assert_eq!(events.rooms().room_clients("song-1").await.len(), 2);
}

#[tokio::test]
async fn in_progress_stroke_is_not_persisted() {
    let h = harness();
    let (mut session_a, _rx_a) = connect(&h.events, "A", "song-1").await;

    send(&h.events, &mut session_a, drawing("song-1", "A", false)).await;
    h.events.wait_for_pending().await;

    assert!(h.annotations.find_by_song("song-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn stroke_persistence_can_be_disabled() {
    let h = harness_with(RouterSettings {
        persist_strokes: false,
        ..RouterSettings::default()
    });
    let (mut session_a, _rx_a) = connect(&h.events, "A", "song-1").await;
    let (_session_b, mut rx_b) = connect(&h.events, "B", "song-1").await;
    drain_frames(&mut rx_b);

    send(&h.events, &mut session_a, drawing("song-1", "A", true)).await;
    h.events.wait_for_pending().await;

    assert_eq!(frame_types(&drain_frames(&mut rx_b)), vec!["drawing:event"]);
    assert!(h.annotations.find_by_song("song-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn drawing_for_another_room_disconnects_session() {
    let h = harness();
    let (mut session_a, mut rx_a) = connect(&h.events, "A", "song-1").await;
    let (_session_b, mut rx_b) = connect(&h.events, "B", "song-1").await;
    drain_frames(&mut rx_a);
    drain_frames(&mut rx_b);

    let outcome = send(&h.events, &mut session_a, drawing("song-2", "A", true)).await;

    assert_eq!(outcome, FrameOutcome::Close);
    assert_eq!(session_a.state(), &SessionState::Disconnected);
    let frames_a = drain_frames(&mut rx_a);
    assert_eq!(frame_types(&frames_a), vec!["error"]);
    assert!(received_close(&mut rx_a));

    // No stroke leaked to the peer; the author left instead.
    assert_eq!(frame_types(&drain_frames(&mut rx_b)), vec!["participant:left"]);
    assert!(h.events.rooms().room_clients("song-2").await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn command_reaches_everyone_but_sender_with_expiry() {
    let h = harness();
    let (mut session_a, mut rx_a) = connect(&h.events, "A", "song-1").await;
    let (_session_b, mut rx_b) = connect(&h.events, "B", "song-1").await;
    let (_session_c, mut rx_c) = connect(&h.events, "C", "song-1").await;
    drain_frames(&mut rx_a);
    drain_frames(&mut rx_b);
    drain_frames(&mut rx_c);

    send(
        &h.events,
        &mut session_a,
        json!({"type": "command-send", "target": "all", "command": "next-song", "payload": {"index": 2}}),
    )
    .await;

    assert!(drain_frames(&mut rx_a).is_empty());
    for rx in [&mut rx_b, &mut rx_c] {
        let frames = drain_frames(rx);
        assert_eq!(frame_types(&frames), vec!["command:received"]);
        let frame = &frames[0];
        assert_eq!(frame["fromProfileId"], "A");
        assert_eq!(frame["command"], "next-song");
        assert_eq!(frame["payload"]["index"], 2);

        let sent: DateTime<Utc> = frame["sentAt"].as_str().unwrap().parse().unwrap();
        let expires: DateTime<Utc> = frame["expiresAt"].as_str().unwrap().parse().unwrap();
        assert_eq!((expires - sent).num_seconds(), 30);
    }
}

struct OnlyProfile(&'static str);

#[async_trait]
impl CommandTargetResolver for OnlyProfile {
    async fn resolve(
        &self,
        _rooms: &RoomRegistry,
        _room_key: &str,
        _target: CommandTarget,
    ) -> Vec<String> {
        vec![self.0.to_string()]
    }
}

#[tokio::test]
async fn command_targets_come_from_resolver() {
    let store = Arc::new(MemoryStore::<Annotation>::new());
    let events = EventRouter::new(
        Arc::new(RoomRegistry::new()),
        AnnotationRepo::new(store),
        RouterSettings::default(),
    )
    .with_resolver(Arc::new(OnlyProfile("C")));

    let (mut session_a, _rx_a) = connect(&events, "A", "song-1").await;
    let (_session_b, mut rx_b) = connect(&events, "B", "song-1").await;
    let (_session_c, mut rx_c) = connect(&events, "C", "song-1").await;
    drain_frames(&mut rx_b);
    drain_frames(&mut rx_c);

    send(
        &events,
        &mut session_a,
        json!({"type": "command-send", "target": "leaders", "command": "pause"}),
    )
    .await;

    assert!(drain_frames(&mut rx_b).is_empty());
    let frames_c = drain_frames(&mut rx_c);
    assert_eq!(frame_types(&frames_c), vec!["command:received"]);
    assert_eq!(frames_c[0]["target"], "leaders");
}

// ---------------------------------------------------------------------------
// Test: disconnect and eviction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disconnect_leaves_room_and_ignores_later_frames() {
    let h = harness();
    let (mut session_a, mut rx_a) = connect(&h.events, "A", "song-1").await;
    let (_session_b, mut rx_b) = connect(&h.events, "B", "song-1").await;
    drain_frames(&mut rx_a);
    drain_frames(&mut rx_b);

    let outcome = send(&h.events, &mut session_a, json!({"type": "disconnect"})).await;
    assert_eq!(outcome, FrameOutcome::Close);
    assert_eq!(frame_types(&drain_frames(&mut rx_b)), vec!["participant:left"]);

    let outcome = send(
        &h.events,
        &mut session_a,
        json!({"type": "page-change", "pageNumber": 2}),
    )
    .await;
    assert_eq!(outcome, FrameOutcome::Close);
    assert!(drain_frames(&mut rx_a).is_empty());
    assert!(drain_frames(&mut rx_b).is_empty());

    // Transport close after an explicit disconnect is harmless.
    h.events.disconnect(&mut session_a).await;
    assert_eq!(h.events.rooms().client_count().await, 1);
}

#[tokio::test]
async fn evicted_session_is_closed_on_next_frame() {
    let h = harness();
    let (mut old_session, mut rx_old) = connect(&h.events, "A", "song-1").await;
    let (_new_session, _rx_new) = connect(&h.events, "A", "song-1").await;
    assert!(received_close(&mut rx_old));

    let outcome = send(
        &h.events,
        &mut old_session,
        json!({"type": "page-change", "pageNumber": 2}),
    )
    .await;

    assert_eq!(outcome, FrameOutcome::Close);
    assert_eq!(old_session.state(), &SessionState::Disconnected);

    // The replacement connection is still registered.
    let members = h.events.rooms().room_clients("song-1").await;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].profile_id, "A");
}

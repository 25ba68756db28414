use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use cantor_core::collaboration::ServerFrame;
use futures::{SinkExt, Stream, StreamExt};
use tokio::time::Instant;

use crate::state::AppState;
use crate::ws::connection::ConnectionHandle;
use crate::ws::router::{EventRouter, FrameOutcome, Session, SessionState};

/// How long the sender task may keep flushing after the receiver loop ends.
const SEND_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is driven by the [`EventRouter`] on the
/// current task, with a spawned sender task draining outbound frames.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let join_timeout = state.config.realtime.join_timeout();
    ws.on_upgrade(move |socket| handle_socket(socket, state.events, join_timeout))
}

/// What the receive loop got from the socket.
#[derive(Debug)]
enum Inbound {
    Message(Result<Message, axum::Error>),
    /// The peer hung up.
    Ended,
    /// Still not joined when the deadline passed.
    JoinTimedOut,
}

/// Wait for the next inbound message. Until the session has joined a room
/// the wait is bounded by `join_deadline`; joined sessions are kept alive by
/// the heartbeat and idle sweep instead.
async fn next_inbound<S>(stream: &mut S, session: &Session, join_deadline: Instant) -> Inbound
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    if session.state() != &SessionState::Connected {
        return stream.next().await.map_or(Inbound::Ended, Inbound::Message);
    }
    match tokio::time::timeout_at(join_deadline, stream.next()).await {
        Ok(Some(result)) => Inbound::Message(result),
        Ok(None) => Inbound::Ended,
        Err(_) => Inbound::JoinTimedOut,
    }
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Spawns a sender task that forwards messages from the connection channel.
///   2. Feeds inbound text frames to the router, closing sockets that do
///      not join within `join_timeout`.
///   3. Leaves the room on disconnect, whatever the reason.
async fn handle_socket(socket: WebSocket, events: Arc<EventRouter>, join_timeout: Duration) {
    let (connection, mut rx) = ConnectionHandle::channel();
    let conn_id = connection.id().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let mut session = Session::new(connection);
    let join_deadline = Instant::now() + join_timeout;

    // Receiver loop: process inbound messages.
    loop {
        let result = match next_inbound(&mut stream, &session, join_deadline).await {
            Inbound::Message(result) => result,
            Inbound::Ended => break,
            Inbound::JoinTimedOut => {
                tracing::info!(conn_id = %conn_id, "No connect frame before join deadline");
                session
                    .connection()
                    .send_frame(&ServerFrame::error("Join timed out"));
                session.connection().close();
                break;
            }
        };
        let outcome = match result {
            Ok(Message::Text(text)) => events.handle_text(&mut session, text.as_str()).await,
            Ok(Message::Binary(_)) => {
                session
                    .connection()
                    .send_frame(&ServerFrame::error("Binary frames are not supported"));
                FrameOutcome::Continue
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Heartbeat received");
                events.touch(&session).await;
                FrameOutcome::Continue
            }
            Ok(Message::Close(_)) => FrameOutcome::Close,
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                FrameOutcome::Close
            }
        };
        if outcome == FrameOutcome::Close {
            break;
        }
    }

    // Clean up: leave the room, then let queued frames flush.
    events.disconnect(&mut session).await;
    drop(session);
    if tokio::time::timeout(SEND_DRAIN_TIMEOUT, &mut send_task)
        .await
        .is_err()
    {
        send_task.abort();
    }
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

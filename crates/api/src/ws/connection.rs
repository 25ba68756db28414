use axum::body::Bytes;
use axum::extract::ws::Message;
use cantor_core::collaboration::ServerFrame;
use tokio::sync::mpsc;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Outbound side of one WebSocket connection.
///
/// Cloning is cheap; all clones feed the same socket sender task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: String,
    sender: WsSender,
}

impl ConnectionHandle {
    pub fn new(id: impl Into<String>, sender: WsSender) -> Self {
        Self {
            id: id.into(),
            sender,
        }
    }

    /// Create a handle with a fresh id, returning the receiver the socket
    /// sender task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(uuid::Uuid::new_v4().to_string(), tx), rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the sender task is still accepting messages.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queue a raw message. Returns `false` if the connection is gone.
    pub fn send(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }

    /// Serialize and queue a protocol frame.
    pub fn send_frame(&self, frame: &ServerFrame) -> bool {
        encode(frame).is_some_and(|message| self.send(message))
    }

    pub fn ping(&self) -> bool {
        self.send(Message::Ping(Bytes::new()))
    }

    /// Ask the sender task to close the socket.
    pub fn close(&self) {
        let _ = self.sender.send(Message::Close(None));
    }
}

/// Serialize a frame to a text message once so it can be fanned out.
pub fn encode(frame: &ServerFrame) -> Option<Message> {
    match serde_json::to_string(frame) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server frame");
            None
        }
    }
}

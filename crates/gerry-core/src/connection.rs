// Outbound side of a client connection.
//
// The transport owns the socket; the session only ever holds a `Connection`,
// which enqueues already-serialized JSON frames for the transport's writer
// task. Enqueueing never blocks: a closed or full queue is reported, not
// raised, and the frame is dropped.

use std::fmt;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::protocol::ServerMessage;

/// Frames buffered per socket before further frames are dropped. Bounds the
/// memory a client that stops reading can pin.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Opaque identifier for one accepted socket. Unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Handle for sending frames to one client.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<String>,
}

impl Connection {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<String>) -> Self {
        Connection { id, tx }
    }

    /// Create a connection together with the receiving end of its queue.
    pub fn channel(id: ConnectionId) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        (Connection::new(id, tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Serialize and enqueue a message. Returns `false` if it could not be
    /// delivered.
    pub fn send(&self, msg: &ServerMessage) -> bool {
        match encode(msg) {
            Some(text) => self.send_text(text),
            None => false,
        }
    }

    /// Enqueue an already-serialized frame.
    pub fn send_text(&self, text: String) -> bool {
        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Dropping frame for {}: outbound queue full", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Dropping frame for {}: connection closed", self.id);
                false
            }
        }
    }
}

/// Serialize a message once for delivery to one or more connections.
pub fn encode(msg: &ServerMessage) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Failed to serialize outbound message: {}", e);
            None
        }
    }
}

/// Send one message to every connection. Each delivery is independent: a
/// closed connection is skipped and the rest still receive the frame.
/// Returns the number of successful deliveries.
pub fn broadcast<'a, I>(connections: I, msg: &ServerMessage) -> usize
where
    I: IntoIterator<Item = &'a Connection>,
{
    let Some(text) = encode(msg) else {
        return 0;
    };
    connections
        .into_iter()
        .filter(|conn| conn.send_text(text.clone()))
        .count()
}

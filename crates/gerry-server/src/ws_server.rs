// WebSocket server for the player pages and the admin console.
//
// Each accepted socket runs on its own task. The reader forwards text frames
// to the app loop as `WsEvent`s; a writer task drains the connection's
// outbound queue onto the socket. No game state lives here.

use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use gerry_core::connection::{Connection, ConnectionId};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

pub const PLAYER_PATH: &str = "/ws/player";
pub const ADMIN_PATH: &str = "/ws/admin";

/// Which endpoint a socket connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Player,
    Admin,
}

impl Role {
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            PLAYER_PATH => Some(Role::Player),
            ADMIN_PATH => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Events emitted by the WebSocket server to the application layer.
#[derive(Debug)]
pub enum WsEvent {
    /// A client completed the handshake. `conn` is its outbound handle.
    Connected {
        conn: Connection,
        role: Role,
        addr: String,
    },
    /// A text frame was received (raw JSON string).
    Message {
        conn: ConnectionId,
        role: Role,
        text: String,
    },
    /// The client went away.
    Disconnected { conn: ConnectionId, role: Role },
}

/// Upper bound on the pause after repeated accept failures.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Accept connections forever, forwarding events through `tx`.
///
/// Returns when `tx` is closed (the app loop has exited). Accept errors such
/// as an aborted handshake or fd exhaustion are logged and retried after a
/// growing pause.
pub async fn run(listener: TcpListener, tx: mpsc::Sender<WsEvent>) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on {local_addr}");

    let mut next_id = 0u64;
    let mut failures = 0u32;
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => {
                failures = 0;
                accepted
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = accept_backoff(failures);
                warn!("Accept failed ({e}), retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                if tx.is_closed() {
                    break;
                }
                continue;
            }
        };
        if tx.is_closed() {
            break;
        }
        next_id += 1;
        let id = ConnectionId(next_id);
        debug!("Accepted TCP connection from {addr} as {id}");
        tokio::spawn(serve_connection(stream, addr.to_string(), id, tx.clone()));
    }

    Ok(())
}

/// Pause before retrying after the given number of consecutive accept
/// failures.
fn accept_backoff(failures: u32) -> Duration {
    let millis = 5u64 << failures.min(8);
    Duration::from_millis(millis).min(ACCEPT_BACKOFF_MAX)
}

fn not_found(path: &str) -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some(format!("no websocket endpoint at {path}")));
    *resp.status_mut() = StatusCode::NOT_FOUND;
    resp
}

/// Drive one socket from handshake to close.
async fn serve_connection(
    stream: TcpStream,
    addr: String,
    id: ConnectionId,
    tx: mpsc::Sender<WsEvent>,
) {
    let mut role = None;
    let handshake = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        let path = req.uri().path();
        match Role::from_path(path) {
            Some(r) => {
                role = Some(r);
                Ok(resp)
            }
            None => Err(not_found(path)),
        }
    })
    .await;

    let ws_stream = match handshake {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };
    let Some(role) = role else {
        return;
    };
    info!("{role:?} connected from {addr} as {id}");

    let (mut write, read) = ws_stream.split();
    let (conn, mut outbound) = Connection::channel(id);

    if tx
        .send(WsEvent::Connected {
            conn,
            role,
            addr: addr.clone(),
        })
        .await
        .is_err()
    {
        return;
    }

    // Ends when the session drops the connection handle or the socket fails.
    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if let Err(e) = write.send(Message::text(text)).await {
                debug!("Write to {id} failed: {e}");
                break;
            }
        }
        let _ = write.close().await;
    });

    let _ = process_message_stream(read, &tx, id, role, &addr).await;

    let _ = tx.send(WsEvent::Disconnected { conn: id, role }).await;
    writer.abort();
    info!("{role:?} {id} at {addr} disconnected");
}

/// Process raw WebSocket [`Message`] items from any [`Stream`], forwarding
/// text payloads through `tx`. Returns `Err(())` if the channel is closed
/// (receiver dropped), signalling the caller to stop.
///
/// Generic over the stream so it can be tested with in-memory streams.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<WsEvent>,
    conn: ConnectionId,
    role: Role,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let event = WsEvent::Message {
                    conn,
                    role,
                    text: text.to_string(),
                };
                if tx.send(event).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                debug!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
    Ok(())
}

// Application event loop.
//
// Owns the `GameManager` and applies websocket events to it one at a time.
// Nothing else touches game state, so each inbound frame is handled to
// completion before the next is read.

use gerry_core::connection::ConnectionId;
use gerry_core::protocol::{AdminMessage, PlayerMessage};
use gerry_core::session::GameManager;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ws_server::{Role, WsEvent};

/// Out-of-band control for the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    Shutdown,
}

/// Run the main application event loop until shutdown is requested or the
/// websocket event channel closes.
pub async fn run(
    mut ws_rx: mpsc::Receiver<WsEvent>,
    mut cmd_rx: mpsc::Receiver<AppCommand>,
    mut manager: GameManager,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    loop {
        tokio::select! {
            ws_event = ws_rx.recv() => {
                match ws_event {
                    Some(event) => handle_ws_event(&mut manager, event),
                    None => {
                        info!("WebSocket channel closed, shutting down");
                        break;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(AppCommand::Shutdown) => {
                        info!("Shutdown command received");
                        break;
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    info!("Application event loop exiting");
    Ok(())
}

fn handle_ws_event(manager: &mut GameManager, event: WsEvent) {
    match event {
        WsEvent::Connected { conn, role, addr } => {
            debug!("{:?} {} registered from {}", role, conn.id(), addr);
            match role {
                Role::Player => manager.connect_player(conn),
                Role::Admin => manager.connect_admin(conn),
            }
        }
        WsEvent::Message { conn, role, text } => match role {
            Role::Player => handle_player_message(manager, conn, &text),
            Role::Admin => handle_admin_message(manager, conn, &text),
        },
        WsEvent::Disconnected { conn, .. } => manager.disconnect(conn),
    }
}

/// Handle a frame from a player page.
fn handle_player_message(manager: &mut GameManager, conn: ConnectionId, json_str: &str) {
    let msg: PlayerMessage = match serde_json::from_str(json_str) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed to parse player message from {}: {}", conn, e);
            return;
        }
    };

    match msg {
        PlayerMessage::Identify { client_id } => {
            manager.handle_identify(conn, &client_id);
        }
        PlayerMessage::ClaimSeat { seat_id, client_id } => {
            // Refusals are already reported to the client.
            if let Err(e) = manager.handle_seat_claim(conn, seat_id, &client_id) {
                debug!("Seat claim by {} refused: {}", conn, e);
            }
        }
        PlayerMessage::Vote { party } => match manager.seat_for_connection(conn) {
            Some(seat) => {
                manager.handle_vote(seat, &party);
            }
            None => debug!("Vote from unseated connection {}", conn),
        },
        PlayerMessage::FinishRound { seat_id, score } => {
            manager.handle_score_submission(seat_id, score);
        }
    }
}

/// Handle a command from the admin console.
fn handle_admin_message(manager: &mut GameManager, conn: ConnectionId, json_str: &str) {
    if !manager.is_admin(conn) {
        debug!("Ignoring command from replaced admin {}", conn);
        return;
    }

    let msg: AdminMessage = match serde_json::from_str(json_str) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed to parse admin message from {}: {}", conn, e);
            return;
        }
    };

    match msg {
        AdminMessage::ActionNext => {
            if let Err(e) = manager.advance() {
                debug!("Advance refused: {}", e);
            }
        }
        AdminMessage::KickPlayer { seat_id } => {
            manager.kick_player(seat_id);
        }
        AdminMessage::ResetGame => manager.reset(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

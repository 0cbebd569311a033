// A claimed seat and the per-player data attached to it.

use crate::connection::ConnectionId;
use crate::protocol::{LeaderboardEntry, RosterEntry};
use crate::rounds::Choice;

/// A persistent player slot.
///
/// The record outlives its socket: on disconnect `connection` is cleared but
/// the seat (and its scores) stay until a reset or a kick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub number: u32,
    /// Durable id kept by the browser across reconnects.
    pub client_id: String,
    pub name: String,
    /// `None` while the holder is offline.
    pub connection: Option<ConnectionId>,
    pub total_score: i64,
    pub round_score: i64,
    /// Vote for the current round.
    pub vote: Option<Choice>,
}

impl Seat {
    pub fn new(number: u32, client_id: &str, connection: ConnectionId) -> Self {
        Seat {
            number,
            client_id: client_id.to_string(),
            name: display_name(number),
            connection: Some(connection),
            total_score: 0,
            round_score: 0,
            vote: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.connection.is_some()
    }

    pub fn has_voted(&self) -> bool {
        self.vote.is_some()
    }

    /// Forget the vote and round score ahead of a new round.
    pub fn clear_round(&mut self) {
        self.vote = None;
        self.round_score = 0;
    }

    /// Record the score for the current round and add it to the total.
    pub fn record_score(&mut self, score: i64) {
        self.round_score = score;
        self.total_score = self.total_score.saturating_add(score);
    }

    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            seat: self.number,
            name: self.name.clone(),
            total_score: self.total_score,
            round_score: self.round_score,
            online: self.is_online(),
            has_voted: self.has_voted(),
        }
    }

    pub fn leaderboard_entry(&self) -> LeaderboardEntry {
        LeaderboardEntry {
            name: self.name.clone(),
            score: self.total_score,
            round: self.round_score,
        }
    }
}

/// Display name for a seat number. Seats are shown one-based.
pub fn display_name(number: u32) -> String {
    format!("Desk #{}", u64::from(number) + 1)
}

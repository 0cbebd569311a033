// Wire protocol between the server, the player pages, and the admin console.
//
// Every frame is a JSON object tagged by `"type"`. Field names follow what the
// browser clients send and expect, so a few of them are camelCase.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rounds::RoundConfig;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Coarse game state gating which actions are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Login,
    Vote,
    Game,
    Results,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Login => "LOGIN",
            Phase::Vote => "VOTE",
            Phase::Game => "GAME",
            Phase::Results => "RESULTS",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Inbound: player channel
// ---------------------------------------------------------------------------

/// Messages sent by a player page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerMessage {
    /// Sent on connect with the durable client id kept in the browser.
    Identify {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    ClaimSeat {
        #[serde(rename = "seatId")]
        seat_id: u32,
        #[serde(rename = "clientId")]
        client_id: String,
    },
    /// `party` is the option label, not its index.
    Vote { party: String },
    FinishRound {
        #[serde(rename = "seatId")]
        seat_id: u32,
        score: i64,
    },
}

// ---------------------------------------------------------------------------
// Inbound: admin channel
// ---------------------------------------------------------------------------

/// Messages sent by the admin console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminMessage {
    /// Advance the state machine by one step.
    ActionNext,
    KickPlayer { seat_id: u32 },
    ResetGame,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Messages sent by the server to players and the admin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SeatMapUpdate {
        taken_seats: Vec<u32>,
    },
    RoundSetup {
        config: RoundConfig,
    },
    LoginSuccess {
        #[serde(rename = "seatId")]
        seat_id: u32,
        name: String,
    },
    Error {
        message: String,
    },
    RestoreSession {
        #[serde(rename = "seatId")]
        seat_id: u32,
        name: String,
        phase: Phase,
        /// `null` until a map has been generated.
        map_data: Option<Vec<u8>>,
        round_info: RoundConfig,
    },
    PhaseChange {
        phase: Phase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        map_data: Option<Vec<u8>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        leaderboard: Option<Vec<LeaderboardEntry>>,
    },
    GameReset,
    KickedByAdmin,
    GameOver,
    AdminUpdate(AdminSnapshot),
}

/// One row of the results screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    /// Cumulative score.
    pub score: i64,
    /// Score earned in the round just played.
    pub round: i64,
}

/// One row of the admin roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub seat: u32,
    pub name: String,
    pub total_score: i64,
    pub round_score: i64,
    pub online: bool,
    pub has_voted: bool,
}

/// Full state pushed to the admin console after every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminSnapshot {
    pub phase: Phase,
    pub round_id: String,
    pub round_index: usize,
    pub total_rounds: usize,
    pub player_count: usize,
    /// Sorted by cumulative score, highest first.
    pub players: Vec<RosterEntry>,
    /// Option label -> vote count for the current round.
    pub votes: BTreeMap<String, u32>,
    /// Whether `action_next` would currently be accepted.
    pub can_progress: bool,
    pub game_over: bool,
    pub round_info: RoundConfig,
}

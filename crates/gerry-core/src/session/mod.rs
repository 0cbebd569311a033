// Session coordinator: seats, phases, rounds, voting, scoring and fan-out.

pub mod manager;
pub mod seat;

pub use manager::GameManager;
pub use seat::Seat;

use thiserror::Error;

/// Number of cells in the global map shown during the GAME phase.
pub const MAP_SIZE: usize = 30;

/// Default number of claimable seats.
pub const DEFAULT_SEAT_COUNT: u32 = 30;

/// Tunables for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSettings {
    /// Seats are numbered `0..seat_count`.
    pub seat_count: u32,
    /// When set, VOTE cannot advance until every online seat has voted.
    pub require_all_votes: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        GameSettings {
            seat_count: DEFAULT_SEAT_COUNT,
            require_all_votes: true,
        }
    }
}

/// Rejections surfaced to the offending client as an `error` message.
///
/// The display strings are shown verbatim by the browser clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Seat Already Taken")]
    SeatTaken { seat: u32 },

    #[error("Invalid Seat")]
    InvalidSeat { seat: u32 },

    #[error("No players have joined yet")]
    NoPlayers,

    #[error("No votes have been cast yet")]
    NoVotes,

    #[error("Waiting for {waiting} online player(s) to vote")]
    VotesPending { waiting: usize },

    #[error("The game is over; reset to play again")]
    GameOver,

    #[error("at least one round is required")]
    NoRounds,
}

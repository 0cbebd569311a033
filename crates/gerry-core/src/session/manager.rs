// The session coordinator.
//
// `GameManager` is the single source of truth for a game. It is owned by one
// event loop and every handler runs to completion before the next message is
// looked at, so state is never observed half-updated. Handlers mutate first
// and fan out afterwards; all frames sent during one handler therefore
// describe the same state.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::seat::Seat;
use super::{GameSettings, SessionError, MAP_SIZE};
use crate::connection::{self, Connection, ConnectionId};
use crate::protocol::{AdminSnapshot, LeaderboardEntry, Phase, RosterEntry, ServerMessage};
use crate::rounds::{Choice, RoundConfig};

pub struct GameManager {
    settings: GameSettings,
    /// Rounds in play order. Never empty.
    rounds: Vec<RoundConfig>,
    /// Every connected player socket, seated or not.
    players: BTreeMap<ConnectionId, Connection>,
    admin: Option<Connection>,
    seats: BTreeMap<u32, Seat>,
    phase: Phase,
    round_index: usize,
    /// Vote counts for the current round's two options.
    tally: [u32; 2],
    global_map: Option<Vec<u8>>,
    /// Set once the last round's results have been followed by `game_over`.
    finished: bool,
    rng: StdRng,
}

impl GameManager {
    /// Create a session over the given round sequence.
    pub fn new(settings: GameSettings, rounds: Vec<RoundConfig>) -> Result<Self, SessionError> {
        Self::with_rng(settings, rounds, StdRng::from_os_rng())
    }

    /// Create a session with an explicit RNG (used to make the global map
    /// reproducible).
    pub fn with_rng(
        settings: GameSettings,
        rounds: Vec<RoundConfig>,
        rng: StdRng,
    ) -> Result<Self, SessionError> {
        if rounds.is_empty() {
            return Err(SessionError::NoRounds);
        }
        Ok(GameManager {
            settings,
            rounds,
            players: BTreeMap::new(),
            admin: None,
            seats: BTreeMap::new(),
            phase: Phase::Login,
            round_index: 0,
            tally: [0, 0],
            global_map: None,
            finished: false,
            rng,
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round_index(&self) -> usize {
        self.round_index
    }

    pub fn current_round(&self) -> &RoundConfig {
        &self.rounds[self.round_index]
    }

    pub fn tally(&self) -> [u32; 2] {
        self.tally
    }

    pub fn seat(&self, number: u32) -> Option<&Seat> {
        self.seats.get(&number)
    }

    pub fn seats(&self) -> impl Iterator<Item = &Seat> {
        self.seats.values()
    }

    pub fn global_map(&self) -> Option<&[u8]> {
        self.global_map.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn has_admin(&self) -> bool {
        self.admin.is_some()
    }

    /// Whether `id` is the current admin socket. A replaced console is not.
    pub fn is_admin(&self, id: ConnectionId) -> bool {
        self.admin.as_ref().is_some_and(|a| a.id() == id)
    }

    pub fn connected_players(&self) -> usize {
        self.players.len()
    }

    /// Seat currently bound to the given connection, if any.
    pub fn seat_for_connection(&self, id: ConnectionId) -> Option<u32> {
        self.seats
            .values()
            .find(|s| s.connection == Some(id))
            .map(|s| s.number)
    }

    fn taken_seats(&self) -> Vec<u32> {
        self.seats.keys().copied().collect()
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Register a player socket and send it the seat map and current round.
    pub fn connect_player(&mut self, conn: Connection) {
        info!("Player connected: {}", conn.id());
        conn.send(&ServerMessage::SeatMapUpdate {
            taken_seats: self.taken_seats(),
        });
        conn.send(&ServerMessage::RoundSetup {
            config: self.current_round().clone(),
        });
        self.players.insert(conn.id(), conn);
    }

    /// Install the admin socket, replacing any previous one.
    pub fn connect_admin(&mut self, conn: Connection) {
        if let Some(previous) = &self.admin {
            info!("Admin {} replaced by {}", previous.id(), conn.id());
        } else {
            info!("Admin connected: {}", conn.id());
        }
        self.admin = Some(conn);
        self.broadcast_admin_update();
    }

    /// Forget a closed socket. Seats bound to it go offline but are kept so
    /// the player can reconnect.
    pub fn disconnect(&mut self, id: ConnectionId) {
        if self.players.remove(&id).is_some() {
            if let Some(seat) = self.seats.values_mut().find(|s| s.connection == Some(id)) {
                info!("{} went offline ({})", seat.name, id);
                seat.connection = None;
            } else {
                debug!("Unseated player disconnected: {}", id);
            }
        }

        if self.admin.as_ref().is_some_and(|a| a.id() == id) {
            info!("Admin disconnected: {}", id);
            self.admin = None;
        }

        // Best effort: with no admin this is a no-op, and a failed send is
        // dropped like any other.
        self.broadcast_admin_update();
    }

    // -----------------------------------------------------------------------
    // Identity and seat claiming
    // -----------------------------------------------------------------------

    /// Reattach a returning client to its seat. Returns `true` when a seat
    /// matched; otherwise nothing is sent and the client is expected to claim
    /// a seat.
    pub fn handle_identify(&mut self, id: ConnectionId, client_id: &str) -> bool {
        let Some(conn) = self.players.get(&id) else {
            warn!("identify from unregistered connection {}", id);
            return false;
        };
        let Some(number) = self
            .seats
            .values()
            .find(|s| s.client_id == client_id)
            .map(|s| s.number)
        else {
            debug!("No seat for client {}, awaiting claim", client_id);
            return false;
        };

        release_connection(&mut self.seats, id, number);
        let Some(seat) = self.seats.get_mut(&number) else {
            return false;
        };
        seat.connection = Some(id);
        info!("Restored {} for client {} on {}", seat.name, client_id, id);

        conn.send(&ServerMessage::RestoreSession {
            seat_id: seat.number,
            name: seat.name.clone(),
            phase: self.phase,
            map_data: self.global_map.clone(),
            round_info: self.rounds[self.round_index].clone(),
        });
        self.broadcast_admin_update();
        true
    }

    /// Claim a seat for a client.
    ///
    /// Reclaiming one's own seat only rebinds the connection. A seat held by
    /// someone else, or out of range, is refused with an `error` message and
    /// no state change. A successful claim releases any other seat the client
    /// held.
    pub fn handle_seat_claim(
        &mut self,
        id: ConnectionId,
        seat_number: u32,
        client_id: &str,
    ) -> Result<(), SessionError> {
        let Some(conn) = self.players.get(&id).cloned() else {
            warn!("claim_seat from unregistered connection {}", id);
            return Ok(());
        };

        if seat_number >= self.settings.seat_count {
            let err = SessionError::InvalidSeat { seat: seat_number };
            warn!("Client {} asked for seat {}: {}", client_id, seat_number, err);
            conn.send(&ServerMessage::Error {
                message: err.to_string(),
            });
            return Err(err);
        }

        if let Some(seat) = self.seats.get_mut(&seat_number) {
            if seat.client_id == client_id {
                debug!("Client {} reclaimed {}", client_id, seat.name);
                seat.connection = Some(id);
                release_connection(&mut self.seats, id, seat_number);
                self.broadcast_admin_update();
                return Ok(());
            }
            let err = SessionError::SeatTaken { seat: seat_number };
            info!("Client {} refused seat {}: {}", client_id, seat_number, err);
            conn.send(&ServerMessage::Error {
                message: err.to_string(),
            });
            return Err(err);
        }

        let before = self.seats.len();
        self.seats.retain(|_, s| s.client_id != client_id);
        if self.seats.len() != before {
            info!("Client {} moved seats; previous seat released", client_id);
            self.recount_votes();
        }

        release_connection(&mut self.seats, id, seat_number);
        let seat = Seat::new(seat_number, client_id, id);
        info!("Client {} claimed {}", client_id, seat.name);
        conn.send(&ServerMessage::LoginSuccess {
            seat_id: seat_number,
            name: seat.name.clone(),
        });
        self.seats.insert(seat_number, seat);

        self.broadcast_seat_map();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Voting and scoring
    // -----------------------------------------------------------------------

    /// Record a seat's vote by option label. Unknown seats and labels that
    /// are not one of the current round's options are ignored.
    pub fn handle_vote(&mut self, seat_number: u32, label: &str) -> Option<Choice> {
        let choice = self.current_round().resolve(label);
        let Some(seat) = self.seats.get_mut(&seat_number) else {
            debug!("Vote from unknown seat {}", seat_number);
            return None;
        };
        let Some(choice) = choice else {
            debug!("Ignoring vote '{}' from {}", label, seat.name);
            return None;
        };

        seat.vote = Some(choice);
        debug!("{} voted {}", seat.name, label);
        self.recount_votes();
        self.broadcast_admin_update();
        Some(choice)
    }

    /// Record a seat's score for the current round. The value is trusted
    /// as-is; repeated submissions accumulate.
    pub fn handle_score_submission(&mut self, seat_number: u32, score: i64) {
        match self.seats.get_mut(&seat_number) {
            Some(seat) => {
                seat.record_score(score);
                info!(
                    "{} scored {} (total {})",
                    seat.name, score, seat.total_score
                );
            }
            None => debug!("Score for unknown seat {}", seat_number),
        }
        self.broadcast_admin_update();
    }

    /// Rebuild the tally from the seats' current votes.
    fn recount_votes(&mut self) {
        let mut tally = [0u32; 2];
        for choice in self.seats.values().filter_map(|s| s.vote) {
            tally[choice.index() as usize] += 1;
        }
        self.tally = tally;
    }

    fn clear_round_data(&mut self) {
        for seat in self.seats.values_mut() {
            seat.clear_round();
        }
        self.tally = [0, 0];
    }

    // -----------------------------------------------------------------------
    // Phase progression
    // -----------------------------------------------------------------------

    /// Whether `advance` would currently be accepted.
    pub fn check_advance(&self) -> Result<(), SessionError> {
        if self.finished {
            return Err(SessionError::GameOver);
        }
        match self.phase {
            Phase::Login if self.seats.is_empty() => Err(SessionError::NoPlayers),
            Phase::Vote => {
                if !self.seats.values().any(Seat::has_voted) {
                    return Err(SessionError::NoVotes);
                }
                let waiting = self
                    .seats
                    .values()
                    .filter(|s| s.is_online() && !s.has_voted())
                    .count();
                if self.settings.require_all_votes && waiting > 0 {
                    return Err(SessionError::VotesPending { waiting });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Step the state machine: LOGIN -> VOTE -> GAME -> RESULTS -> next
    /// round's VOTE, or game over after the last round. A refused step is
    /// reported to the admin and changes nothing.
    pub fn advance(&mut self) -> Result<(), SessionError> {
        if let Err(err) = self.check_advance() {
            info!("Advance from {} refused: {}", self.phase, err);
            if let Some(admin) = &self.admin {
                admin.send(&ServerMessage::Error {
                    message: err.to_string(),
                });
            }
            return Err(err);
        }

        match self.phase {
            Phase::Login => self.change_phase(Phase::Vote),
            Phase::Vote => self.change_phase(Phase::Game),
            Phase::Game => self.change_phase(Phase::Results),
            Phase::Results => self.advance_round(),
        }
        Ok(())
    }

    fn advance_round(&mut self) {
        if self.round_index + 1 < self.rounds.len() {
            self.round_index += 1;
            self.clear_round_data();
            info!(
                "Starting round {}/{}: {}",
                self.round_index + 1,
                self.rounds.len(),
                self.current_round().id
            );
            self.broadcast_to_players(&ServerMessage::RoundSetup {
                config: self.current_round().clone(),
            });
            self.change_phase(Phase::Vote);
        } else {
            info!("Last round finished, game over");
            self.finished = true;
            self.broadcast_to_players(&ServerMessage::GameOver);
            self.change_phase(Phase::Results);
        }
    }

    fn change_phase(&mut self, phase: Phase) {
        info!("Phase {} -> {}", self.phase, phase);
        self.phase = phase;

        let mut map_data = None;
        let mut leaderboard = None;
        match phase {
            // LOGIN is only re-entered through `reset`, which clears seats itself.
            Phase::Login | Phase::Vote => {
                self.global_map = None;
            }
            Phase::Game => {
                let map = self.generate_global_map();
                map_data = Some(map.clone());
                self.global_map = Some(map);
            }
            Phase::Results => {
                self.global_map = None;
                leaderboard = Some(self.leaderboard());
            }
        }

        self.broadcast_to_players(&ServerMessage::PhaseChange {
            phase,
            map_data,
            leaderboard,
        });
        self.broadcast_admin_update();
    }

    /// Build the map for the GAME phase: each cell copies the vote of the
    /// seat with that number, or is filled at random when there is none.
    pub fn generate_global_map(&mut self) -> Vec<u8> {
        (0..MAP_SIZE)
            .map(|cell| {
                let vote = u32::try_from(cell)
                    .ok()
                    .and_then(|n| self.seats.get(&n))
                    .and_then(|s| s.vote);
                match vote {
                    Some(choice) => choice.index(),
                    None => u8::from(self.rng.random_bool(0.5)),
                }
            })
            .collect()
    }

    /// All seats by cumulative score, highest first.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut seats: Vec<&Seat> = self.seats.values().collect();
        seats.sort_by(|a, b| b.total_score.cmp(&a.total_score));
        seats.into_iter().map(Seat::leaderboard_entry).collect()
    }

    // -----------------------------------------------------------------------
    // Admin actions
    // -----------------------------------------------------------------------

    /// Remove a seat, telling its holder first. Unknown seats are ignored.
    pub fn kick_player(&mut self, seat_number: u32) -> bool {
        let Some(seat) = self.seats.remove(&seat_number) else {
            debug!("Kick for empty seat {}", seat_number);
            return false;
        };
        info!("Admin kicked {} (client {})", seat.name, seat.client_id);

        if let Some(conn) = seat.connection.and_then(|id| self.players.get(&id)) {
            if !conn.send(&ServerMessage::KickedByAdmin) {
                warn!("Could not notify {} of kick", seat.name);
            }
        }

        self.recount_votes();
        self.broadcast_seat_map();
        true
    }

    /// Clear every seat and start over from the first round.
    pub fn reset(&mut self) {
        info!("Resetting game ({} seats cleared)", self.seats.len());
        self.seats.clear();
        self.phase = Phase::Login;
        self.round_index = 0;
        self.tally = [0, 0];
        self.global_map = None;
        self.finished = false;

        self.broadcast_to_players(&ServerMessage::GameReset);
        self.broadcast_admin_update();
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    fn broadcast_to_players(&self, msg: &ServerMessage) {
        let delivered = connection::broadcast(self.players.values(), msg);
        if delivered < self.players.len() {
            debug!(
                "Broadcast reached {}/{} players",
                delivered,
                self.players.len()
            );
        }
    }

    fn broadcast_seat_map(&self) {
        self.broadcast_to_players(&ServerMessage::SeatMapUpdate {
            taken_seats: self.taken_seats(),
        });
        self.broadcast_admin_update();
    }

    /// Push a fresh snapshot to the admin, if one is connected. Nothing is
    /// buffered for an absent admin and a failed send is dropped.
    pub fn broadcast_admin_update(&self) {
        if let Some(admin) = &self.admin {
            admin.send(&ServerMessage::AdminUpdate(self.admin_snapshot()));
        }
    }

    pub fn admin_snapshot(&self) -> AdminSnapshot {
        let mut players: Vec<RosterEntry> = self.seats.values().map(Seat::roster_entry).collect();
        players.sort_by(|a, b| b.total_score.cmp(&a.total_score));

        let round = self.current_round();
        let votes = BTreeMap::from([
            (round.label(Choice::First).to_string(), self.tally[0]),
            (round.label(Choice::Second).to_string(), self.tally[1]),
        ]);

        AdminSnapshot {
            phase: self.phase,
            round_id: round.id.clone(),
            round_index: self.round_index,
            total_rounds: self.rounds.len(),
            player_count: self.seats.len(),
            players,
            votes,
            can_progress: self.check_advance().is_ok(),
            game_over: self.finished,
            round_info: round.clone(),
        }
    }
}

/// Unbind `id` from every seat but `keep`. A socket drives at most one seat.
fn release_connection(seats: &mut BTreeMap<u32, Seat>, id: ConnectionId, keep: u32) {
    for seat in seats.values_mut() {
        if seat.number != keep && seat.connection == Some(id) {
            debug!("{} released by {}", seat.name, id);
            seat.connection = None;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

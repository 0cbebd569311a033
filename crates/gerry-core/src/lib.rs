// Library root: the game's round table, wire protocol, and the session
// coordinator that owns all mutable game state.

pub mod connection;
pub mod protocol;
pub mod rounds;
pub mod session;

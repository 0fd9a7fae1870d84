//! Room aggregate and game engine for blindorder.
//!
//! This crate holds the data model for one game session and the pure
//! functions that drive it. Nothing here performs I/O: the engine takes
//! a [`Room`], mutates it deterministically (randomness is injected as a
//! [`rand::Rng`] at initialization only), and reports what happened.
//!
//! # Key types
//!
//! - [`Room`] — the canonical aggregate for one session
//! - [`Player`] — a participant with a concealed hand of numbers
//! - [`GameEvent`] — an append-only audit log entry, broadcast to clients
//! - [`MoveOutcome`] — what a single move did to the room
//! - [`GameStateView`] — the read-only projection sent to clients

mod engine;
mod error;
mod types;

pub use engine::{
    add_game_event, game_state, initialize_game, make_move, reset_game,
    GameStateView, MoveOutcome,
};
pub use error::GameError;
pub use types::{
    now_millis, GameEvent, GameEventPayload, GameOutcome, Player, PlayerId,
    Room, RoomCode, RoomPhase, EVENT_RETENTION, MIN_PLAYERS, NUMBER_POOL_MAX,
};

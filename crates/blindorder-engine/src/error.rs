//! Error types for the game engine.
//!
//! The `Display` strings are user-visible: the gateway forwards them
//! verbatim in `error` messages to the requesting connection. Incorrect
//! but legal moves are NOT errors — they come back as a failed
//! [`MoveOutcome`](crate::MoveOutcome).

/// Errors produced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// A room, participant, or number the operation referred to does not
    /// exist (e.g. playing a number that is not in the hand).
    #[error("{0}")]
    NotFound(String),

    /// The operation's preconditions cannot be satisfied (too few
    /// participants, draw larger than the number universe).
    #[error("{0}")]
    Precondition(String),

    /// The operation is illegal in the room's current state (starting a
    /// game that is not in the lobby, moving after game over, a non-host
    /// invoking a host-only action).
    #[error("{0}")]
    StateConflict(String),
}

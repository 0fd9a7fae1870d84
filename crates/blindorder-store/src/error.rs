//! Error types for the session-store layer.

use blindorder_engine::{GameError, RoomCode};

use crate::DurableError;

/// Errors that can occur during room store operations.
///
/// Game-rule failures pass through unchanged so their user-facing
/// `Display` strings survive to the wire.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The engine rejected the operation (not found / precondition /
    /// state conflict).
    #[error("{0}")]
    Game(#[from] GameError),

    /// No room with this code exists, in memory or durably.
    #[error("Room not found")]
    RoomNotFound(RoomCode),

    /// Input rejected at the boundary before reaching the core.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The room's command channel is closed (room shutting down).
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),

    /// A durable-store failure on the request path (cold load, create).
    /// Write-through failures are retried and logged, never surfaced.
    #[error(transparent)]
    Durable(#[from] DurableError),
}

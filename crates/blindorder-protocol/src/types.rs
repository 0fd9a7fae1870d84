//! Message types for the realtime wire contract.
//!
//! Clients are stateless with respect to server state: every broadcast
//! carries the full [`Room`] aggregate (plus the game-state projection
//! outside the lobby) and clients replace their local view wholesale.
//! Tags serialize as kebab-case and fields as camelCase.

use blindorder_engine::{GameStateView, Room, RoomCode};
use serde::{Deserialize, Serialize};

/// Messages a client sends to the server.
///
/// Internally tagged on `"type"`, so a join looks like:
/// `{ "type": "join-room", "roomId": "K3QZ7P", "playerName": "ada" }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Enter a room, or rebind to an existing participant with the same
    /// name (reconnection).
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: RoomCode,
        player_name: String,
        #[serde(default)]
        is_host: bool,
    },

    /// Deal hands and begin play. Host only.
    #[serde(rename_all = "camelCase")]
    StartGame { room_id: RoomCode },

    /// Play one number from the sender's concealed hand.
    #[serde(rename_all = "camelCase")]
    PlayNumber { room_id: RoomCode, number: u8 },

    /// Return the room to the lobby. Host only.
    #[serde(rename_all = "camelCase")]
    ResetGame { room_id: RoomCode },

    /// Leave the room explicitly (disconnecting has the same effect).
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: RoomCode },
}

/// Messages the server sends to clients.
///
/// Adjacently tagged, so a broadcast looks like:
/// `{ "type": "room-updated", "data": { ...room aggregate... } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// The full current room aggregate; sent to every attached
    /// connection after any mutation.
    RoomUpdated(Room),

    /// The derived game-state projection; accompanies `room-updated`
    /// whenever the room is not in the lobby.
    GameStateUpdated(GameStateView),

    /// An operation failed; delivered only to the requesting connection.
    Error(String),

    /// The room was torn down (host left the lobby, or an administrative
    /// delete); delivered to every remaining connection.
    RoomDeleted { reason: String },

    /// Acknowledges an explicit `leave-room`.
    LeftRoom,
}

// =========================================================================
// Tests
// =========================================================================

//! Core data model: identifiers, the room aggregate, and game events.
//!
//! Everything in this module is serializable because the full aggregate
//! travels to clients on every `room-updated` broadcast and (in part) to
//! the durable store. Field names serialize as camelCase and state/tag
//! values as kebab-case to match the wire contract.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// The fixed universe of drawable numbers is `1..=NUMBER_POOL_MAX`.
pub const NUMBER_POOL_MAX: u8 = 100;

/// Minimum participants required to start a game.
pub const MIN_PLAYERS: usize = 2;

/// The event log keeps only the most recent entries.
pub const EVENT_RETENTION: usize = 50;

/// Milliseconds since the Unix epoch. Used for event timestamps and the
/// aggregate's `createdAt`/`updatedAt` fields.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A participant's identity within a room.
///
/// Equal to the numeric id of the participant's current connection, so it
/// changes when a player reconnects under the same username (rebind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A short human-typed room code, unique per room (e.g. `"K3QZ7P"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomPhase
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
/// lobby ──(start, host)──→ playing ──(moves)──→ victory | game-over
///   ↑                         │                      │
///   └────────(reset, host)────┴──────────────────────┘
/// ```
///
/// The terminal states persist until an explicit host reset returns the
/// room to `lobby`. No other transitions are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoomPhase {
    Lobby,
    Playing,
    GameOver,
    Victory,
}

impl RoomPhase {
    /// Returns `true` while the room is accepting new participants.
    pub fn is_lobby(&self) -> bool {
        matches!(self, Self::Lobby)
    }

    /// Returns `true` while moves are being accepted.
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    /// Returns `true` once the session has ended either way.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GameOver | Self::Victory)
    }
}

impl fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lobby => "lobby",
            Self::Playing => "playing",
            Self::GameOver => "game-over",
            Self::Victory => "victory",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One participant in a room.
///
/// `numbers` is the concealed hand, kept sorted ascending for display.
/// Once the room is `playing` the hand only ever shrinks — a played
/// number is consumed whether or not the move was correct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    /// Unique within the room while it is in `lobby`; the key used for
    /// reconnection rebinding.
    pub username: String,
    pub numbers: Vec<u8>,
    pub joined_at: u64,
}

// ---------------------------------------------------------------------------
// GameEvent
// ---------------------------------------------------------------------------

/// How a finished session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameOutcome {
    Victory,
    Defeat,
}

/// One payload shape per event tag, matched exhaustively wherever events
/// are interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GameEventPayload {
    #[serde(rename_all = "camelCase")]
    MoveMade {
        player_id: PlayerId,
        player_name: String,
        number: u8,
        timeline: Vec<u8>,
    },
    #[serde(rename_all = "camelCase")]
    MoveFailed {
        player_id: PlayerId,
        player_name: String,
        number: u8,
        lives_lost: u32,
        lives: u32,
    },
    GameStarted {
        message: String,
    },
    GameEnded {
        result: GameOutcome,
        message: String,
    },
    GameReset {
        message: String,
    },
}

/// An entry in the room's append-only event log.
///
/// Events are both an audit trail and the way clients learn *why* the
/// state changed, not just what it became.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    #[serde(flatten)]
    pub payload: GameEventPayload,
    pub timestamp: u64,
}

impl GameEvent {
    /// Wraps a payload with the current wall-clock timestamp.
    pub fn now(payload: GameEventPayload) -> Self {
        Self {
            payload,
            timestamp: now_millis(),
        }
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// The canonical in-memory representation of one game session.
///
/// Invariants maintained by the engine:
/// - `timeline` is strictly increasing with no duplicates
/// - `0 <= lives <= max_lives`, and `lives == 0` implies `game-over`
/// - while `playing`, the hands and the timeline together hold every
///   drawn number exactly once (until a participant departs with their
///   hand)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomCode,
    pub max_lives: u32,
    pub numbers_per_player: u32,
    pub lives: u32,
    pub state: RoomPhase,
    /// `None` until the first participant joins (or the host departs a
    /// collapsing room). At most one participant is host at a time.
    pub host_id: Option<PlayerId>,
    /// In join order; the front participant is the earliest joiner and
    /// the host-failover candidate.
    pub players: Vec<Player>,
    pub timeline: Vec<u8>,
    pub game_events: Vec<GameEvent>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Room {
    /// Creates an empty room in `lobby` with a full lives budget.
    pub fn new(
        id: RoomCode,
        max_lives: u32,
        numbers_per_player: u32,
        now: u64,
    ) -> Self {
        Self {
            id,
            max_lives,
            numbers_per_player,
            lives: max_lives,
            state: RoomPhase::Lobby,
            host_id: None,
            players: Vec::new(),
            timeline: Vec::new(),
            game_events: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Looks up a participant by id.
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Looks up a participant by id, mutably.
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Looks up a participant by username (the reconnection key).
    pub fn player_by_name(&self, username: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.username == username)
    }

    /// Total numbers in play: everything already on the timeline plus
    /// everything still concealed in hands.
    pub fn total_numbers(&self) -> usize {
        self.timeline.len()
            + self.players.iter().map(|p| p.numbers.len()).sum::<usize>()
    }

    /// Bumps `updatedAt`.
    pub fn touch(&mut self, now: u64) {
        self.updated_at = now;
    }
}

// =========================================================================
// Tests
// =========================================================================

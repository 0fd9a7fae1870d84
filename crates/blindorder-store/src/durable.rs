//! The durable-store contract consumed by the room session store.
//!
//! The in-memory aggregate is the sole authority while a room is live;
//! the durable store is a recovery and cold-load source. Rooms and their
//! participants persist in separate tables, with `timeline`, `gameEvents`
//! and hand contents stored as serialized arrays.

use std::future::Future;
use std::sync::Arc;

use blindorder_engine::{Player, PlayerId, Room, RoomCode};

/// Errors from a durable-store backend.
#[derive(Debug, thiserror::Error)]
pub enum DurableError {
    /// A room with this code already exists.
    #[error("duplicate room code {0}")]
    DuplicateRoom(RoomCode),

    /// The backend itself failed (I/O, corrupt row, pool exhausted).
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Relational persistence for rooms and participants.
///
/// `get_room` returns the room's own fields with `players` left empty;
/// hands live in their own table and are fetched with
/// [`get_room_players`](Self::get_room_players). Callers that need the
/// assembled aggregate (the registry's cold load) combine the two.
pub trait DurableStore: Send + Sync + 'static {
    /// Inserts a new room. Fails with [`DurableError::DuplicateRoom`] if
    /// the code is taken.
    fn create_room(
        &self,
        room: &Room,
    ) -> impl Future<Output = Result<(), DurableError>> + Send;

    /// Fetches a room's own fields by code, or `None`.
    fn get_room(
        &self,
        code: &RoomCode,
    ) -> impl Future<Output = Result<Option<Room>, DurableError>> + Send;

    /// Writes a room's own fields (not its participant rows).
    fn update_room(
        &self,
        room: &Room,
    ) -> impl Future<Output = Result<(), DurableError>> + Send;

    /// Deletes a room and, transitively, its participants. Returns
    /// whether a row was deleted.
    fn delete_room(
        &self,
        code: &RoomCode,
    ) -> impl Future<Output = Result<bool, DurableError>> + Send;

    /// Fetches a room's participants in join order.
    fn get_room_players(
        &self,
        code: &RoomCode,
    ) -> impl Future<Output = Result<Vec<Player>, DurableError>> + Send;

    /// Replaces a room's participant rows with the given set. This is
    /// how new joins, rebinds, and hand changes reach disk.
    fn save_players(
        &self,
        code: &RoomCode,
        players: &[Player],
    ) -> impl Future<Output = Result<(), DurableError>> + Send;

    /// Deletes one participant row. Returns whether a row was deleted.
    fn delete_player(
        &self,
        player_id: PlayerId,
    ) -> impl Future<Output = Result<bool, DurableError>> + Send;
}

// A shared store is still a store; the server and an admin/CRUD layer
// can hold the same `Arc<S>`.
impl<S: DurableStore> DurableStore for Arc<S> {
    async fn create_room(&self, room: &Room) -> Result<(), DurableError> {
        (**self).create_room(room).await
    }

    async fn get_room(
        &self,
        code: &RoomCode,
    ) -> Result<Option<Room>, DurableError> {
        (**self).get_room(code).await
    }

    async fn update_room(&self, room: &Room) -> Result<(), DurableError> {
        (**self).update_room(room).await
    }

    async fn delete_room(&self, code: &RoomCode) -> Result<bool, DurableError> {
        (**self).delete_room(code).await
    }

    async fn get_room_players(
        &self,
        code: &RoomCode,
    ) -> Result<Vec<Player>, DurableError> {
        (**self).get_room_players(code).await
    }

    async fn save_players(
        &self,
        code: &RoomCode,
        players: &[Player],
    ) -> Result<(), DurableError> {
        (**self).save_players(code, players).await
    }

    async fn delete_player(
        &self,
        player_id: PlayerId,
    ) -> Result<bool, DurableError> {
        (**self).delete_player(player_id).await
    }
}

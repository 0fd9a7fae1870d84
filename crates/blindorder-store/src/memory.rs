//! In-memory durable store for development and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use blindorder_engine::{Player, PlayerId, Room, RoomCode};

use crate::{DurableError, DurableStore};

#[derive(Default)]
struct Inner {
    rooms: HashMap<RoomCode, Room>,
    players: HashMap<RoomCode, Vec<Player>>,
}

/// A [`DurableStore`] backed by process memory.
///
/// Mirrors the relational layout (rooms and players held separately) so
/// the session store exercises the same read/write paths it uses against
/// SQLite. The failure switch makes every operation error until cleared,
/// which is how tests drive the write-through retry path.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every store operation fails with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), DurableError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(DurableError::Backend("injected failure".into()))
        } else {
            Ok(())
        }
    }

    /// Test inspection: the stored room with its participant rows
    /// reassembled, or `None`.
    pub fn room_snapshot(&self, code: &RoomCode) -> Option<Room> {
        let inner = self.inner.lock().expect("store poisoned");
        let mut room = inner.rooms.get(code)?.clone();
        room.players = inner.players.get(code).cloned().unwrap_or_default();
        Some(room)
    }
}

impl DurableStore for MemoryStore {
    async fn create_room(&self, room: &Room) -> Result<(), DurableError> {
        self.check()?;
        let mut inner = self.inner.lock().expect("store poisoned");
        if inner.rooms.contains_key(&room.id) {
            return Err(DurableError::DuplicateRoom(room.id.clone()));
        }
        let mut stored = room.clone();
        stored.players = Vec::new();
        inner.rooms.insert(room.id.clone(), stored);
        inner.players.insert(room.id.clone(), room.players.clone());
        Ok(())
    }

    async fn get_room(
        &self,
        code: &RoomCode,
    ) -> Result<Option<Room>, DurableError> {
        self.check()?;
        let inner = self.inner.lock().expect("store poisoned");
        Ok(inner.rooms.get(code).cloned())
    }

    async fn update_room(&self, room: &Room) -> Result<(), DurableError> {
        self.check()?;
        let mut inner = self.inner.lock().expect("store poisoned");
        let mut stored = room.clone();
        stored.players = Vec::new();
        inner.rooms.insert(room.id.clone(), stored);
        Ok(())
    }

    async fn delete_room(&self, code: &RoomCode) -> Result<bool, DurableError> {
        self.check()?;
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.players.remove(code);
        Ok(inner.rooms.remove(code).is_some())
    }

    async fn get_room_players(
        &self,
        code: &RoomCode,
    ) -> Result<Vec<Player>, DurableError> {
        self.check()?;
        let inner = self.inner.lock().expect("store poisoned");
        Ok(inner.players.get(code).cloned().unwrap_or_default())
    }

    async fn save_players(
        &self,
        code: &RoomCode,
        players: &[Player],
    ) -> Result<(), DurableError> {
        self.check()?;
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.players.insert(code.clone(), players.to_vec());
        Ok(())
    }

    async fn delete_player(
        &self,
        player_id: PlayerId,
    ) -> Result<bool, DurableError> {
        self.check()?;
        let mut inner = self.inner.lock().expect("store poisoned");
        for players in inner.players.values_mut() {
            if let Some(idx) = players.iter().position(|p| p.id == player_id) {
                players.remove(idx);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

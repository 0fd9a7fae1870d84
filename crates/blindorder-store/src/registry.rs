//! Room registry: creates, cold-loads, tracks, and sweeps room actors.
//!
//! On first access to a code that is not resident, the registry attempts
//! a load from the durable store before reporting "not found", so a
//! previously evicted room comes back with its participants and state
//! intact (participants rebind by username on their next join).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use blindorder_engine::{now_millis, PlayerId, Room, RoomCode};
use rand::Rng;

use crate::actor::spawn_room;
use crate::{DurableStore, LeaveOutcome, RoomHandle, RoomStatus, StoreError};

/// Default command channel size for room actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Room codes are drawn from an unambiguous uppercase alphanumeric set.
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 6;

/// Creation-time (and lobby-update) settings for a room.
#[derive(Debug, Clone, Copy)]
pub struct RoomSettings {
    pub max_lives: u32,
    pub numbers_per_player: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_lives: 3,
            numbers_per_player: 6,
        }
    }
}

impl RoomSettings {
    /// Boundary validation; rejected input never reaches the core.
    pub fn validate(&self) -> Result<(), StoreError> {
        Self::validate_max_lives(self.max_lives)?;
        Self::validate_numbers_per_player(self.numbers_per_player)
    }

    pub fn validate_max_lives(value: u32) -> Result<(), StoreError> {
        if (1..=10).contains(&value) {
            Ok(())
        } else {
            Err(StoreError::Validation(
                "Max lives must be between 1 and 10".into(),
            ))
        }
    }

    pub fn validate_numbers_per_player(value: u32) -> Result<(), StoreError> {
        if (1..=20).contains(&value) {
            Ok(())
        } else {
            Err(StoreError::Validation(
                "Numbers per player must be between 1 and 20".into(),
            ))
        }
    }
}

/// Tracks every resident room and routes operations to its actor.
///
/// Not thread-safe by itself — the server wraps it in a `Mutex` and is
/// the single owner, keeping lock discipline in one place.
pub struct RoomRegistry<S: DurableStore> {
    rooms: HashMap<RoomCode, RoomHandle>,
    store: Arc<S>,
}

impl<S: DurableStore> RoomRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            rooms: HashMap::new(),
            store,
        }
    }

    /// Creates a new empty lobby and returns its code.
    ///
    /// The durable row is written before the room goes live so a crash
    /// directly after creation cannot lose an announced code.
    pub async fn create_room(
        &mut self,
        settings: RoomSettings,
    ) -> Result<RoomCode, StoreError> {
        settings.validate()?;

        let code = self.unique_code();
        let room = Room::new(
            code.clone(),
            settings.max_lives,
            settings.numbers_per_player,
            now_millis(),
        );
        self.store.create_room(&room).await?;

        let handle =
            spawn_room(room, Arc::clone(&self.store), DEFAULT_CHANNEL_SIZE);
        self.rooms.insert(code.clone(), handle);
        tracing::info!(%code, "room created");
        Ok(code)
    }

    fn unique_code(&self) -> RoomCode {
        let mut rng = rand::rng();
        loop {
            let code: String = (0..CODE_LEN)
                .map(|_| {
                    CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())]
                        as char
                })
                .collect();
            let code = RoomCode::new(code);
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    /// Returns a handle to a resident room without touching the durable
    /// store.
    pub fn get(&self, code: &RoomCode) -> Option<RoomHandle> {
        self.rooms.get(code).cloned()
    }

    /// Returns a handle to the room, cold-loading it from the durable
    /// store if it is not resident.
    pub async fn get_or_load(
        &mut self,
        code: &RoomCode,
    ) -> Result<RoomHandle, StoreError> {
        if let Some(handle) = self.rooms.get(code) {
            return Ok(handle.clone());
        }

        let Some(mut room) = self.store.get_room(code).await? else {
            return Err(StoreError::RoomNotFound(code.clone()));
        };
        room.players = self.store.get_room_players(code).await?;

        tracing::info!(
            %code,
            players = room.players.len(),
            state = %room.state,
            "room loaded from durable store"
        );

        let handle =
            spawn_room(room, Arc::clone(&self.store), DEFAULT_CHANNEL_SIZE);
        self.rooms.insert(code.clone(), handle.clone());
        Ok(handle)
    }

    /// Removes a participant from a resident room, dropping the room
    /// entirely when the leave collapses it.
    pub async fn leave(
        &mut self,
        code: &RoomCode,
        player_id: PlayerId,
    ) -> Result<LeaveOutcome, StoreError> {
        let handle = self
            .rooms
            .get(code)
            .cloned()
            .ok_or_else(|| StoreError::RoomNotFound(code.clone()))?;

        let outcome = handle.leave(player_id).await?;
        if outcome.deleted {
            self.rooms.remove(code);
            tracing::info!(%code, "room torn down");
        }
        Ok(outcome)
    }

    /// Administrative delete: notifies attached connections and removes
    /// the room from memory and the durable store.
    pub async fn delete_room(
        &mut self,
        code: &RoomCode,
        reason: &str,
    ) -> Result<(), StoreError> {
        match self.rooms.remove(code) {
            Some(handle) => {
                handle.shutdown(Some(reason.to_string())).await?;
                Ok(())
            }
            // Not resident: the durable record may still exist.
            None => {
                if self.store.delete_room(code).await? {
                    Ok(())
                } else {
                    Err(StoreError::RoomNotFound(code.clone()))
                }
            }
        }
    }

    /// Evicts rooms that have had no attached connections for at least
    /// `max_idle`. Their durable records remain for a future cold load.
    /// Returns the evicted codes.
    pub async fn sweep_idle(&mut self, max_idle: Duration) -> Vec<RoomCode> {
        let handles: Vec<RoomHandle> = self.rooms.values().cloned().collect();
        let mut evicted = Vec::new();

        for handle in handles {
            let Ok(status) = handle.status().await else {
                continue;
            };
            if status.attached == 0 && status.idle_for >= max_idle {
                let _ = handle.shutdown(None).await;
                self.rooms.remove(&status.code);
                tracing::info!(
                    code = %status.code,
                    idle_secs = status.idle_for.as_secs(),
                    "idle room evicted; durable record remains"
                );
                evicted.push(status.code);
            }
        }

        evicted
    }

    /// Status of every resident room, for listings.
    pub async fn statuses(&self) -> Vec<RoomStatus> {
        let mut out = Vec::with_capacity(self.rooms.len());
        for handle in self.rooms.values() {
            if let Ok(status) = handle.status().await {
                out.push(status);
            }
        }
        out
    }

    /// Number of resident rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

//! Session registry: which connection is which participant in which room.
//!
//! The mapping lives exactly as long as the membership it describes:
//! inserted when a join succeeds, removed on leave or connection loss.
//! Keeping it in one owned structure (rather than ad-hoc maps) makes the
//! binding's lifetime auditable.

use std::collections::HashMap;

use blindorder_engine::{PlayerId, RoomCode};
use blindorder_transport::ConnectionId;

/// The (room, participant) pair a connection is bound to.
#[derive(Debug, Clone)]
pub(crate) struct SessionBinding {
    pub room: RoomCode,
    pub player_id: PlayerId,
    pub username: String,
}

/// Tracks every connection's current binding. A connection is bound to
/// at most one room at a time.
#[derive(Default)]
pub(crate) struct SessionRegistry {
    bindings: HashMap<ConnectionId, SessionBinding>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a binding after a successful join.
    pub fn bind(&mut self, conn_id: ConnectionId, binding: SessionBinding) {
        self.bindings.insert(conn_id, binding);
    }

    /// Removes and returns the binding, if any. Called on leave and on
    /// connection loss.
    pub fn unbind(&mut self, conn_id: ConnectionId) -> Option<SessionBinding> {
        self.bindings.remove(&conn_id)
    }

    /// Looks up the binding for a connection.
    pub fn get(&self, conn_id: ConnectionId) -> Option<SessionBinding> {
        self.bindings.get(&conn_id).cloned()
    }

    /// Number of bound connections.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }
}

//! Server builder, accept loop, and the administrative controller.

use std::sync::Arc;
use std::time::Duration;

use blindorder_engine::{Room, RoomCode};
use blindorder_protocol::JsonCodec;
use blindorder_store::{
    DurableStore, RoomRegistry, RoomSettings, RoomStatus, StoreError,
};
use blindorder_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::gateway::handle_connection;
use crate::sessions::SessionRegistry;
use crate::{BlindorderError, ServerConfig};

/// Shared server state handed to each connection task.
pub(crate) struct ServerState<S: DurableStore> {
    pub(crate) rooms: Mutex<RoomRegistry<S>>,
    pub(crate) sessions: Mutex<SessionRegistry>,
    pub(crate) codec: JsonCodec,
}

/// Builder for configuring and starting a blindorder server.
///
/// # Example
///
/// ```rust,ignore
/// let store = SqliteStore::connect("data/blindorder.db").await?;
/// let server = BlindorderServerBuilder::new()
///     .bind("0.0.0.0:3001")
///     .build(store)
///     .await?;
/// server.run().await
/// ```
pub struct BlindorderServerBuilder {
    bind_addr: String,
    sweep_interval: Duration,
    room_idle_timeout: Duration,
}

impl BlindorderServerBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        let defaults = ServerConfig::default();
        Self {
            bind_addr: defaults.bind_addr,
            sweep_interval: defaults.sweep_interval,
            room_idle_timeout: defaults.room_idle_timeout,
        }
    }

    /// Takes bind address and sweep timings from a [`ServerConfig`].
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            bind_addr: config.bind_addr.clone(),
            sweep_interval: config.sweep_interval,
            room_idle_timeout: config.room_idle_timeout,
        }
    }

    /// Sets the address to bind the listener to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets how often the idle-room sweep runs.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets how long an unattached room stays resident before eviction.
    pub fn room_idle_timeout(mut self, timeout: Duration) -> Self {
        self.room_idle_timeout = timeout;
        self
    }

    /// Binds the listener and assembles the server around the given
    /// durable store.
    pub async fn build<S: DurableStore>(
        self,
        store: S,
    ) -> Result<BlindorderServer<S>, BlindorderError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            rooms: Mutex::new(RoomRegistry::new(Arc::new(store))),
            sessions: Mutex::new(SessionRegistry::new()),
            codec: JsonCodec,
        });

        Ok(BlindorderServer {
            transport,
            state,
            sweep_interval: self.sweep_interval,
            room_idle_timeout: self.room_idle_timeout,
        })
    }
}

impl Default for BlindorderServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running blindorder server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct BlindorderServer<S: DurableStore> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S>>,
    sweep_interval: Duration,
    room_idle_timeout: Duration,
}

impl<S: DurableStore> BlindorderServer<S> {
    /// Creates a new builder.
    pub fn builder() -> BlindorderServerBuilder {
        BlindorderServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns the handle the room administration layer uses to create,
    /// inspect, and delete rooms.
    pub fn controller(&self) -> RoomController<S> {
        RoomController {
            state: Arc::clone(&self.state),
        }
    }

    /// Runs the accept loop until the process is terminated.
    ///
    /// Also spawns the background idle-room sweep; it shares nothing
    /// with the request path beyond the registry lock.
    pub async fn run(mut self) -> Result<(), BlindorderError> {
        tracing::info!("blindorder server running");

        let sweep_state = Arc::clone(&self.state);
        let (interval, idle) = (self.sweep_interval, self.room_idle_timeout);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                let evicted =
                    sweep_state.rooms.lock().await.sweep_idle(idle).await;
                if !evicted.is_empty() {
                    tracing::debug!(
                        count = evicted.len(),
                        "idle sweep evicted rooms"
                    );
                }
            }
        });

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// The seam consumed by the room administration (CRUD) layer: room
/// creation, lookup, settings, and deletion, all routed through the same
/// serialized store the realtime gateway uses.
pub struct RoomController<S: DurableStore> {
    state: Arc<ServerState<S>>,
}

impl<S: DurableStore> Clone for RoomController<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<S: DurableStore> RoomController<S> {
    /// Creates a new empty lobby and returns its code.
    pub async fn create_room(
        &self,
        settings: RoomSettings,
    ) -> Result<RoomCode, StoreError> {
        self.state.rooms.lock().await.create_room(settings).await
    }

    /// A read-only copy of the room aggregate (cold-loading if needed).
    pub async fn room(&self, code: &RoomCode) -> Result<Room, StoreError> {
        let handle = {
            let mut rooms = self.state.rooms.lock().await;
            rooms.get_or_load(code).await?
        };
        handle.snapshot().await
    }

    /// Changes lobby settings; rejected outside the lobby.
    pub async fn update_settings(
        &self,
        code: &RoomCode,
        max_lives: Option<u32>,
        numbers_per_player: Option<u32>,
    ) -> Result<(), StoreError> {
        if let Some(value) = max_lives {
            RoomSettings::validate_max_lives(value)?;
        }
        if let Some(value) = numbers_per_player {
            RoomSettings::validate_numbers_per_player(value)?;
        }
        let handle = {
            let mut rooms = self.state.rooms.lock().await;
            rooms.get_or_load(code).await?
        };
        handle.update_settings(max_lives, numbers_per_player).await
    }

    /// Hands the host role to an existing participant.
    pub async fn set_host(
        &self,
        code: &RoomCode,
        player_id: blindorder_engine::PlayerId,
    ) -> Result<(), StoreError> {
        let handle = {
            let mut rooms = self.state.rooms.lock().await;
            rooms.get_or_load(code).await?
        };
        handle.set_host(player_id).await
    }

    /// Deletes a room, notifying attached connections.
    pub async fn delete_room(
        &self,
        code: &RoomCode,
        reason: &str,
    ) -> Result<(), StoreError> {
        self.state
            .rooms
            .lock()
            .await
            .delete_room(code, reason)
            .await
    }

    /// Status of every resident room.
    pub async fn room_statuses(&self) -> Vec<RoomStatus> {
        self.state.rooms.lock().await.statuses().await
    }
}

//! Process configuration: defaults overridden by environment variables.

use std::env;
use std::time::Duration;

/// Server process configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// Path of the SQLite database file.
    pub database_path: String,
    /// How often the idle-room sweep runs.
    pub sweep_interval: Duration,
    /// How long a room may sit with zero attached connections before it
    /// is evicted from memory.
    pub room_idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".into(),
            database_path: "data/blindorder.db".into(),
            sweep_interval: Duration::from_secs(60),
            room_idle_timeout: Duration::from_secs(900),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `BLINDORDER_ADDR`, `BLINDORDER_DB`,
    /// `BLINDORDER_SWEEP_SECS`, and `BLINDORDER_ROOM_IDLE_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = env::var("BLINDORDER_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(path) = env::var("BLINDORDER_DB") {
            config.database_path = path;
        }
        if let Some(interval) = env_secs("BLINDORDER_SWEEP_SECS") {
            config.sweep_interval = interval;
        }
        if let Some(idle) = env_secs("BLINDORDER_ROOM_IDLE_SECS") {
            config.room_idle_timeout = idle;
        }
        config
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    env::var(key).ok()?.parse().ok().map(Duration::from_secs)
}

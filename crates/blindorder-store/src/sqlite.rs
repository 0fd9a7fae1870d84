//! SQLite durable store via `sqlx`.
//!
//! Schema mirrors the aggregate: a `rooms` table for the room's own
//! fields (`timeline` and `game_events` as serialized JSON columns) and
//! a `players` table keyed by participant id, cascading on room delete.

use std::str::FromStr;

use blindorder_engine::{
    GameEvent, Player, PlayerId, Room, RoomCode, RoomPhase,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;

use crate::{DurableError, DurableStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS rooms (
    id                 TEXT PRIMARY KEY,
    max_lives          INTEGER NOT NULL,
    numbers_per_player INTEGER NOT NULL,
    lives              INTEGER NOT NULL,
    state              TEXT NOT NULL,
    host_id            INTEGER,
    timeline           TEXT NOT NULL DEFAULT '[]',
    game_events        TEXT NOT NULL DEFAULT '[]',
    created_at         INTEGER NOT NULL,
    updated_at         INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS players (
    id        INTEGER PRIMARY KEY,
    room_id   TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
    username  TEXT NOT NULL,
    numbers   TEXT NOT NULL DEFAULT '[]',
    joined_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_players_room ON players(room_id);
";

fn backend(e: impl std::fmt::Display) -> DurableError {
    DurableError::Backend(e.to_string())
}

/// A [`DurableStore`] backed by a SQLite database file.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `path` and ensures
    /// the schema exists.
    pub async fn connect(path: &str) -> Result<Self, DurableError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(backend)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(backend)?;
        Self::with_pool(pool).await
    }

    /// An in-memory database, for tests. Pinned to a single connection —
    /// every pooled connection would otherwise see its own empty database.
    pub async fn connect_in_memory() -> Result<Self, DurableError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(backend)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(backend)?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, DurableError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(backend)?;
        Ok(Self { pool })
    }
}

fn row_to_room(row: &SqliteRow) -> Result<Room, DurableError> {
    let timeline: String = row.try_get("timeline").map_err(backend)?;
    let game_events: String = row.try_get("game_events").map_err(backend)?;
    let state: String = row.try_get("state").map_err(backend)?;

    let state: RoomPhase =
        serde_json::from_value(serde_json::Value::String(state))
            .map_err(backend)?;
    let timeline: Vec<u8> = serde_json::from_str(&timeline).map_err(backend)?;
    let game_events: Vec<GameEvent> =
        serde_json::from_str(&game_events).map_err(backend)?;

    Ok(Room {
        id: RoomCode::new(row.try_get::<String, _>("id").map_err(backend)?),
        max_lives: row.try_get::<i64, _>("max_lives").map_err(backend)? as u32,
        numbers_per_player: row
            .try_get::<i64, _>("numbers_per_player")
            .map_err(backend)? as u32,
        lives: row.try_get::<i64, _>("lives").map_err(backend)? as u32,
        state,
        host_id: row
            .try_get::<Option<i64>, _>("host_id")
            .map_err(backend)?
            .map(|id| PlayerId(id as u64)),
        players: Vec::new(),
        timeline,
        game_events,
        created_at: row.try_get::<i64, _>("created_at").map_err(backend)? as u64,
        updated_at: row.try_get::<i64, _>("updated_at").map_err(backend)? as u64,
    })
}

fn row_to_player(row: &SqliteRow) -> Result<Player, DurableError> {
    let numbers: String = row.try_get("numbers").map_err(backend)?;
    Ok(Player {
        id: PlayerId(row.try_get::<i64, _>("id").map_err(backend)? as u64),
        username: row.try_get("username").map_err(backend)?,
        numbers: serde_json::from_str(&numbers).map_err(backend)?,
        joined_at: row.try_get::<i64, _>("joined_at").map_err(backend)? as u64,
    })
}

impl DurableStore for SqliteStore {
    async fn create_room(&self, room: &Room) -> Result<(), DurableError> {
        let result = sqlx::query(
            "INSERT INTO rooms \
             (id, max_lives, numbers_per_player, lives, state, host_id, \
              timeline, game_events, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(room.id.as_str())
        .bind(room.max_lives as i64)
        .bind(room.numbers_per_player as i64)
        .bind(room.lives as i64)
        .bind(room.state.to_string())
        .bind(room.host_id.map(|id| id.0 as i64))
        .bind(serde_json::to_string(&room.timeline).map_err(backend)?)
        .bind(serde_json::to_string(&room.game_events).map_err(backend)?)
        .bind(room.created_at as i64)
        .bind(room.updated_at as i64)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_database_error()
                    .is_some_and(|d| d.is_unique_violation()) =>
            {
                Err(DurableError::DuplicateRoom(room.id.clone()))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn get_room(
        &self,
        code: &RoomCode,
    ) -> Result<Option<Room>, DurableError> {
        let row = sqlx::query("SELECT * FROM rooms WHERE id = ?")
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(row_to_room).transpose()
    }

    async fn update_room(&self, room: &Room) -> Result<(), DurableError> {
        sqlx::query(
            "UPDATE rooms \
             SET max_lives = ?, numbers_per_player = ?, lives = ?, \
                 state = ?, host_id = ?, timeline = ?, game_events = ?, \
                 updated_at = ? \
             WHERE id = ?",
        )
        .bind(room.max_lives as i64)
        .bind(room.numbers_per_player as i64)
        .bind(room.lives as i64)
        .bind(room.state.to_string())
        .bind(room.host_id.map(|id| id.0 as i64))
        .bind(serde_json::to_string(&room.timeline).map_err(backend)?)
        .bind(serde_json::to_string(&room.game_events).map_err(backend)?)
        .bind(room.updated_at as i64)
        .bind(room.id.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn delete_room(&self, code: &RoomCode) -> Result<bool, DurableError> {
        let result = sqlx::query("DELETE FROM rooms WHERE id = ?")
            .bind(code.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_room_players(
        &self,
        code: &RoomCode,
    ) -> Result<Vec<Player>, DurableError> {
        let rows = sqlx::query(
            "SELECT * FROM players WHERE room_id = ? ORDER BY joined_at ASC",
        )
        .bind(code.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_player).collect()
    }

    async fn save_players(
        &self,
        code: &RoomCode,
        players: &[Player],
    ) -> Result<(), DurableError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query("DELETE FROM players WHERE room_id = ?")
            .bind(code.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        for player in players {
            sqlx::query(
                "INSERT INTO players (id, room_id, username, numbers, joined_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(player.id.0 as i64)
            .bind(code.as_str())
            .bind(&player.username)
            .bind(serde_json::to_string(&player.numbers).map_err(backend)?)
            .bind(player.joined_at as i64)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)
    }

    async fn delete_player(
        &self,
        player_id: PlayerId,
    ) -> Result<bool, DurableError> {
        let result = sqlx::query("DELETE FROM players WHERE id = ?")
            .bind(player_id.0 as i64)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }
}

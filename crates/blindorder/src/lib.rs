//! # blindorder
//!
//! Realtime backend for a cooperative sequencing game: each participant
//! privately holds a set of numbers, and the room must collectively play
//! every number in strictly ascending order without revealing hands.
//!
//! This crate is the connection gateway and server loop. It terminates
//! WebSocket connections, maps each one to at most one (room,
//! participant) pair, translates inbound messages into room-store
//! operations, and fans room broadcasts back out — all per-room state
//! lives in `blindorder-store`, all game rules in `blindorder-engine`.

mod config;
mod error;
mod gateway;
mod server;
mod sessions;

pub use config::ServerConfig;
pub use error::BlindorderError;
pub use server::{BlindorderServer, BlindorderServerBuilder, RoomController};

//! Room session store for blindorder.
//!
//! This crate owns the single authoritative copy of every live room.
//! Each resident room runs as an isolated Tokio task (actor model): all
//! mutations of one room flow through its command channel and are applied
//! strictly in arrival order, while different rooms proceed in parallel.
//! After every mutation the actor broadcasts the updated aggregate to the
//! attached connections and schedules a write-through to the durable
//! store — the broadcast is never gated on persistence.
//!
//! # Key types
//!
//! - [`RoomRegistry`] — creates, cold-loads, sweeps, and routes to rooms
//! - [`RoomHandle`] — sends commands to a running room actor
//! - [`DurableStore`] — the persistence contract ([`SqliteStore`] in
//!   production, [`MemoryStore`] for development and tests)

#![allow(async_fn_in_trait)]

mod actor;
mod durable;
mod error;
mod memory;
mod registry;
mod sqlite;

pub use actor::{ConnectionSender, LeaveOutcome, RoomHandle, RoomStatus};
pub use durable::{DurableError, DurableStore};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use registry::{RoomRegistry, RoomSettings};
pub use sqlite::SqliteStore;

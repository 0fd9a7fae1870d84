//! Wire protocol for blindorder's realtime connections.
//!
//! This crate defines the messages clients and server exchange over a
//! duplex connection, and how they are converted to and from text:
//!
//! - **Types** ([`ClientMessage`], [`ServerMessage`]) — the message
//!   structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages are
//!   serialized.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while doing so.
//!
//! The protocol layer sits between transport (raw text frames) and the
//! gateway (player context). It knows nothing about connections, rooms,
//! or game rules.

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{ClientMessage, ServerMessage};

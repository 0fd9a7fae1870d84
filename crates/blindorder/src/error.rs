//! Unified error type for the server crate.

use blindorder_protocol::ProtocolError;
use blindorder_store::{DurableError, StoreError};
use blindorder_transport::TransportError;

/// Top-level error wrapping every layer's error type, so `?` works
/// across the gateway and server loop.
#[derive(Debug, thiserror::Error)]
pub enum BlindorderError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-store error (room not found, state conflict, ...).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A durable-store error outside the session store (e.g. opening
    /// the database at startup).
    #[error(transparent)]
    Durable(#[from] DurableError),
}

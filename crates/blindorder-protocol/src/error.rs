//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into wire text).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed — malformed text, missing fields, or an
    /// unknown message tag. Rejected at the boundary before reaching the
    /// core.
    #[error("Invalid message: {0}")]
    Decode(#[source] serde_json::Error),
}

//! Error types for the protocol layer.
//!
//! Each crate in Mixtape defines its own error enum, so a
//! `ProtocolError` always means the problem is in encoding/decoding,
//! not in networking or session logic.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed. Common causes: malformed JSON, missing
    /// required fields, an unknown event tag.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame parsed but violates a protocol rule (e.g. an empty
    /// event name from a hand-rolled client).
    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

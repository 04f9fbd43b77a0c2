//! Error types for the protocol layer.
//!
//! Each crate in Archlink defines its own error enum. When you see a
//! `ProtocolError`, the problem is in turning messages into frames or
//! frames into messages, not in networking or request bookkeeping.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning messages into a frame).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The frame is not valid JSON at all.
    ///
    /// Individual malformed messages inside a valid frame are not errors;
    /// they are dropped by the codec.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame parsed but violates framing rules, e.g. it is a JSON
    /// object instead of an array of messages.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

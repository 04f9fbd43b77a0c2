//! Error types for the dispatch layer.

use std::time::Duration;

use archlink_protocol::ProtocolError;

/// Why an outbound batch could not be handed to the connection.
///
/// Both variants are detected before anything reaches the wire, so a
/// failed send never leaves a half-sent batch behind.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The connection is below `AwaitingAuthentication`.
    #[error("not connected")]
    NotConnected,

    /// The batch could not be encoded.
    #[error("failed to encode batch: {0}")]
    Encode(#[from] ProtocolError),
}

/// Why a correlated request did not resolve with a reply.
#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    /// No matching message arrived before the deadline.
    #[error("no matching reply within {0:?}")]
    Timeout(Duration),

    /// The connection went away while the request was pending.
    #[error("disconnected while awaiting a reply")]
    Disconnected,

    /// The request itself could not be sent.
    #[error("send failed: {0}")]
    Send(#[from] SendError),
}

impl CorrelationError {
    /// Returns `true` if the server simply never answered.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

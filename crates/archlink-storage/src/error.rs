//! Error types for the data storage engine.

use archlink_dispatch::CorrelationError;
use archlink_protocol::MessageKind;

/// Errors surfaced by [`DataStorage`](crate::DataStorage) operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The key is computed by the server and can't be written.
    /// Raised before anything is sent.
    #[error("key {0:?} is read-only")]
    ReadOnlyKey(String),

    /// Sending failed, or the reply never came.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// The correlator matched a message of the wrong kind.
    #[error("unexpected {0} reply")]
    UnexpectedReply(MessageKind),
}

impl StorageError {
    /// Returns `true` if the server never answered.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Correlation(e) if e.is_timeout())
    }
}

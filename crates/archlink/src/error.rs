//! Unified error type for the Archlink client.

use archlink_dispatch::{CorrelationError, SendError};
use archlink_protocol::{ConnectionRefusedReason, MessageKind, ProtocolError};
use archlink_storage::StorageError;
use archlink_transport::{AddressError, TransportError};

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `archlink` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A transport-level error (open, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server address could not be parsed.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// A protocol-level error (encode, decode, invalid frame).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A correlated request failed (timeout, disconnect, send).
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// A data storage operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A message could not be sent.
    #[error(transparent)]
    Send(#[from] SendError),

    /// The server refused the `Connect`.
    #[error("connection refused: {}", format_reasons(.0))]
    Refused(Vec<ConnectionRefusedReason>),

    /// A correlated request matched a message of an unexpected kind.
    #[error("unexpected {0} reply")]
    UnexpectedReply(MessageKind),

    /// Another `connect` on the same client started first.
    #[error("a connection attempt is already in progress")]
    ConnectInProgress,
}

impl ClientError {
    /// Returns `true` if the server never answered in time: no matching
    /// reply, or a connection attempt that didn't open before the
    /// connect timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Correlation(e) => e.is_timeout(),
            Self::Storage(e) => e.is_timeout(),
            Self::Transport(TransportError::OpenFailed { source, .. }) => {
                source.kind() == std::io::ErrorKind::TimedOut
            }
            _ => false,
        }
    }

    /// Returns the refusal reasons if the server said no.
    pub fn refusal(&self) -> Option<&[ConnectionRefusedReason]> {
        match self {
            Self::Refused(reasons) => Some(reasons),
            _ => None,
        }
    }
}

fn format_reasons(reasons: &[ConnectionRefusedReason]) -> String {
    if reasons.is_empty() {
        return "no reason given".to_string();
    }
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Transport(_)));
        assert!(client_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_address_error() {
        let err: ClientError = AddressError::InvalidPort("x".into()).into();
        assert!(matches!(err, ClientError::Address(_)));
    }

    #[test]
    fn test_is_timeout_distinguishes_silence_from_refusal() {
        let timeout: ClientError =
            CorrelationError::Timeout(Duration::from_secs(1)).into();
        let refused =
            ClientError::Refused(vec![ConnectionRefusedReason::InvalidSlot]);

        assert!(timeout.is_timeout());
        assert!(!refused.is_timeout());
        assert_eq!(
            refused.refusal(),
            Some(&[ConnectionRefusedReason::InvalidSlot][..])
        );
    }

    #[test]
    fn test_is_timeout_open_timed_out() {
        let err: ClientError = TransportError::OpenFailed {
            url: "wss://localhost:38281".into(),
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"),
        }
        .into();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_refused_display_lists_reasons() {
        let err = ClientError::Refused(vec![
            ConnectionRefusedReason::InvalidPassword,
            ConnectionRefusedReason::Other("SlotTaken".into()),
        ]);
        assert_eq!(
            err.to_string(),
            "connection refused: InvalidPassword, SlotTaken"
        );
    }
}

//! Transport abstraction layer for Archlink.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract over
//! the one duplex channel a client holds to the server, plus
//! [`ServerAddress`] parsing and the secure/insecure [`ProtocolPreference`].
//!
//! Framing is the transport's job: one call to [`Connection::send`] is one
//! frame, one successful [`Connection::recv`] is one frame.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket connector via `tokio-tungstenite`

mod address;
mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use address::{DEFAULT_PORT, ProtocolPreference, Scheme, ServerAddress};
pub use error::{AddressError, TransportError};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique id.
    pub fn next() -> Self {
        static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opens outgoing connections.
///
/// Opening either yields a live [`Connection`] or fails; a failure here is
/// what the connection manager treats as "failed to open" when deciding
/// whether to fall back to the insecure scheme.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Opens a channel to `url` (`ws://…` or `wss://…`).
    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single open channel that can send and receive frames.
///
/// All methods take `&self`: the reader and writer sides are driven by
/// different tasks, so a pending [`recv`](Self::recv) must never block a
/// [`send`](Self::send).
pub trait Connection: Send + Sync + 'static {
    /// Sends one text frame to the server.
    fn send(
        &self,
        frame: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next frame from the server.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.into_inner() > a.into_inner());
    }
}

//! Message dispatch and request correlation for Archlink.
//!
//! - [`DispatchBus`]: publishes decoded inbound messages to typed and
//!   catch-all subscriber lists, and carries the "messages sent" event.
//! - [`Correlator`]: lets a caller send a batch and await the first
//!   inbound message that matches a predicate, with timeout and
//!   disconnect cancellation.
//! - [`Outbound`]: the send seam the correlator uses; implemented by the
//!   connection manager, mocked in tests.
//! - [`TokenGenerator`]: injectable correlation token source.
//!
//! # How it fits in the stack
//!
//! ```text
//! Session cache / Data storage (above)  ← subscribe, send_and_wait
//!     ↕
//! Dispatch Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← ServerMessage, ClientMessage, MessageKind
//! ```

mod bus;
mod correlator;
mod error;
mod listeners;
mod token;

pub use bus::DispatchBus;
pub use correlator::{Correlator, PendingReply, RequestId};
pub use error::{CorrelationError, SendError};
pub use listeners::{Listeners, SubscriptionId};
pub use token::{RandomTokens, SequentialTokens, TokenGenerator};

use archlink_protocol::ClientMessage;

/// Hands an ordered batch to the live connection.
///
/// Sending is synchronous: the batch is validated and queued, and the
/// caller learns immediately whether that worked. Delivery is up to the
/// transport.
pub trait Outbound: Send + Sync {
    /// Queues `batch` as one frame.
    ///
    /// # Errors
    /// - [`SendError::NotConnected`]: no connection at or beyond
    ///   `AwaitingAuthentication`
    /// - [`SendError::Encode`]: the batch can't be serialized
    fn send(&self, batch: Vec<ClientMessage>) -> Result<(), SendError>;
}

//! # Archlink
//!
//! Client engine for multiworld randomizer servers.
//!
//! Archlink keeps one persistent connection to a room, authenticates as a
//! slot, mirrors the room and session state, and lets you await replies to
//! your own requests, including ordered transactions on the server's data
//! storage.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use archlink::prelude::*;
//!
//! # async fn run() -> Result<(), ClientError> {
//! let client = Client::new(ClientOptions::default());
//! client.connect("localhost:38281", "Alice", "ExampleGame").await?;
//!
//! let missing = client.session_cache().missing_locations();
//! for item in client.scout_locations(missing, 0).await? {
//!     println!("location {} holds item {}", item.location, item.item);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! | Layer | Crate |
//! |-------|-------|
//! | channel, address parsing | `archlink-transport` |
//! | wire types, JSON codec | `archlink-protocol` |
//! | bus, correlator | `archlink-dispatch` |
//! | phase, session cache | `archlink-session` |
//! | data storage | `archlink-storage` |

mod client;
mod error;
mod link;
mod options;

pub use client::{BounceTarget, Client, DisconnectReason};
pub use error::ClientError;
pub use options::{ClientOptions, DEFAULT_VERSION};

pub use archlink_dispatch as dispatch;
pub use archlink_protocol as protocol;
pub use archlink_session as session;
pub use archlink_storage as storage;
pub use archlink_transport as transport;

pub mod prelude {
    pub use crate::{BounceTarget, Client, ClientError, ClientOptions, DisconnectReason};
    pub use archlink_dispatch::{CorrelationError, SendError, SubscriptionId};
    pub use archlink_protocol::{
        ClientMessage, ClientStatus, Connected, ItemsHandling, LocationId,
        MessageKind, NetworkItem, ServerMessage, SlotId, TeamId,
    };
    pub use archlink_session::{ConnectionPhase, Session};
    pub use archlink_storage::{ValueChange, Watch};
    pub use archlink_transport::ProtocolPreference;
}

//! Session state for Archlink.
//!
//! This crate handles what the client knows about its connection:
//!
//! 1. **Lifecycle**: where the connection is ([`ConnectionPhase`]) and
//!    who it authenticated as ([`Session`])
//! 2. **Mirrors**: room snapshot, roster, locations and received items
//!    kept in sync from inbound messages ([`SessionCache`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Connection manager (above)  ← owns the Session, resets the cache
//!     ↕
//! Session Layer (this crate)  ← passive subscriber of the bus
//!     ↕
//! Dispatch Layer (below)  ← DispatchBus, Listeners
//! ```

mod cache;
mod locations;
mod session;

pub use cache::{AliasChange, ItemsDesync, SessionCache};
pub use locations::LocationSets;
pub use session::{ConnectionPhase, Session};

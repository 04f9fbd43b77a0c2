//! Wire protocol for Archlink.
//!
//! This crate defines the "language" a multiworld client and server
//! speak:
//!
//! - **Types** ([`NetworkItem`], [`NetworkVersion`], [`ItemsHandling`],
//!   etc.): the value shapes carried inside messages.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`], [`MessageKind`]):
//!   the closed set of commands in each direction.
//! - **Storage** ([`StorageOperation`], [`StorageOperator`]): the ordered
//!   operation steps of a data storage `Set`.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how batches of messages
//!   become frames and back.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and dispatch
//! (routing messages to listeners). It doesn't know about connections or
//! pending requests.
//!
//! ```text
//! Transport (frames) → Protocol (ServerMessage) → Dispatch (listeners)
//! ```

mod codec;
mod error;
mod messages;
mod storage;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use messages::{
    ClientMessage, Connect, Connected, ConnectionRefusedReason,
    DataPackagePayload, GameData, JsonTextPart, MessageKind, PrintJson,
    RoomInfo, RoomUpdate, ServerMessage, Set, SetReply,
};
pub use storage::{
    READ_ONLY_PREFIX, StorageOperation, StorageOperator, is_read_only_key,
};
pub use types::{
    ClientStatus, ItemFlags, ItemId, ItemsHandling, LocationId, NetworkItem,
    NetworkPlayer, NetworkSlot, NetworkVersion, Permission, SlotId, SlotType,
    TeamId, VersionClass,
};

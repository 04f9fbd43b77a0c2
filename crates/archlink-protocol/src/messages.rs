//! The message model: every outbound and inbound message shape.
//!
//! Both directions are closed tagged unions keyed by the `cmd` field.
//! `#[serde(tag = "cmd")]` gives the "internally tagged" JSON the server
//! speaks:
//!
//! ```text
//! {"cmd": "Say", "text": "hello"}
//! ```
//!
//! The two sets are disjoint: a client never receives a [`ClientMessage`]
//! and never sends a [`ServerMessage`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::StorageOperation;
use crate::types::{
    ClientStatus, ItemsHandling, LocationId, NetworkItem, NetworkPlayer,
    NetworkSlot, NetworkVersion, Permission, SlotId, TeamId,
};

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Messages the client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum ClientMessage {
    /// Authenticate against a slot. Answered by `Connected` or
    /// `ConnectionRefused`.
    Connect(Connect),

    /// Change tags or item handling of the live session.
    ConnectUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        items_handling: Option<ItemsHandling>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tags: Option<Vec<String>>,
    },

    /// Ask the server to resend every received item.
    Sync,

    /// Report locations as checked.
    LocationChecks { locations: Vec<LocationId> },

    /// Ask what lies at locations. `create_as_hint`: 0 no hint, 1 hint and
    /// announce, 2 hint but only announce new hints.
    LocationScouts {
        locations: Vec<LocationId>,
        create_as_hint: u8,
    },

    /// Report the client's progress.
    StatusUpdate { status: ClientStatus },

    /// Chat text (or a `!command`).
    Say { text: String },

    /// Request the data package; `None` means every game.
    GetDataPackage {
        #[serde(skip_serializing_if = "Option::is_none")]
        games: Option<Vec<String>>,
    },

    /// Relay arbitrary data to matching clients.
    Bounce {
        #[serde(skip_serializing_if = "Option::is_none")]
        games: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        slots: Option<Vec<SlotId>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tags: Option<Vec<String>>,
        data: Value,
    },

    /// Read data storage keys. The token is echoed in `Retrieved`.
    Get {
        keys: Vec<String>,
        correlation_token: String,
    },

    /// Apply ordered operations to a data storage key. The token is echoed
    /// in `SetReply`.
    Set(Set),

    /// Subscribe to `SetReply` pushes for keys.
    SetNotify { keys: Vec<String> },
}

/// Payload of [`ClientMessage::Connect`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connect {
    pub password: Option<String>,
    /// Name of the game the slot plays.
    pub game: String,
    /// Slot name.
    pub name: String,
    /// Stable client identifier.
    pub uuid: String,
    /// Minimum protocol version the client requires.
    pub version: NetworkVersion,
    pub items_handling: ItemsHandling,
    pub tags: Vec<String>,
    pub slot_data: bool,
}

/// Payload of [`ClientMessage::Set`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Set {
    pub key: String,
    pub default: Value,
    pub want_reply: bool,
    pub operations: Vec<StorageOperation>,
    pub correlation_token: String,
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Messages the server sends to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum ServerMessage {
    /// First message on every connection; proves the channel is live.
    RoomInfo(RoomInfo),

    /// Authentication failed.
    ConnectionRefused {
        #[serde(default)]
        errors: Vec<ConnectionRefusedReason>,
    },

    /// Authentication succeeded.
    Connected(Connected),

    /// Items sent to this slot. `index` is the position of the first item
    /// in the full received list; 0 means "this is the whole list".
    ReceivedItems {
        index: usize,
        items: Vec<NetworkItem>,
    },

    /// Reply to `LocationScouts`.
    LocationInfo { locations: Vec<NetworkItem> },

    /// Partial room/session change; only present fields changed.
    RoomUpdate(RoomUpdate),

    /// A printable event (chat, item sent, join, …).
    #[serde(rename = "PrintJSON")]
    PrintJson(PrintJson),

    /// Reply to `GetDataPackage`.
    DataPackage { data: DataPackagePayload },

    /// A relayed `Bounce`.
    Bounced {
        #[serde(default)]
        games: Option<Vec<String>>,
        #[serde(default)]
        slots: Option<Vec<SlotId>>,
        #[serde(default)]
        tags: Option<Vec<String>>,
        #[serde(default)]
        data: Value,
    },

    /// The server could not process one of our messages.
    InvalidPacket {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        original_cmd: Option<String>,
        text: String,
    },

    /// Reply to `Get`.
    Retrieved {
        keys: BTreeMap<String, Value>,
        #[serde(default)]
        correlation_token: Option<String>,
    },

    /// A data storage key changed (reply to `Set` or a `SetNotify` push).
    SetReply(SetReply),
}

/// Server-authoritative room facts, replaced wholesale on `RoomInfo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Protocol version of the server.
    pub version: NetworkVersion,
    /// Version of the generator that produced the seed.
    pub generator_version: NetworkVersion,
    /// Server capability tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Is a password required to connect?
    pub password: bool,
    /// Command name (`release`, `collect`, `remaining`) → permission.
    #[serde(default)]
    pub permissions: BTreeMap<String, Permission>,
    /// Percentage of a slot's locations one hint costs.
    pub hint_cost: u32,
    /// Hint points earned per checked location.
    pub location_check_points: u32,
    /// Games present in the room.
    #[serde(default)]
    pub games: Vec<String>,
    /// Game → data package checksum.
    #[serde(default)]
    pub datapackage_checksums: BTreeMap<String, String>,
    pub seed_name: String,
    /// Server clock, seconds since the Unix epoch.
    pub time: f64,
}

/// Payload of `RoomUpdate`: any `RoomInfo` field plus session deltas.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoomUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<NetworkVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_version: Option<NetworkVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeMap<String, Permission>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint_cost: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_check_points: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub games: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datapackage_checksums: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint_points: Option<i64>,
    /// Changed roster entries (aliases).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<NetworkPlayer>>,
    /// Newly checked locations of this slot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_locations: Option<Vec<LocationId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_locations: Option<Vec<LocationId>>,
}

/// Payload of `Connected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connected {
    pub team: TeamId,
    pub slot: SlotId,
    pub players: Vec<NetworkPlayer>,
    pub missing_locations: Vec<LocationId>,
    pub checked_locations: Vec<LocationId>,
    /// Game-specific data; `null` unless `slot_data` was requested.
    #[serde(default)]
    pub slot_data: Value,
    /// Slot number (as a decimal string, the JSON object key) → slot.
    #[serde(default)]
    pub slot_info: BTreeMap<String, NetworkSlot>,
    #[serde(default)]
    pub hint_points: i64,
}

impl Connected {
    /// Looks up `slot_info` by slot number.
    pub fn slot_info_for(&self, slot: SlotId) -> Option<&NetworkSlot> {
        self.slot_info.get(&slot.0.to_string())
    }
}

/// Why the server refused a `Connect`.
///
/// Unknown reasons are kept verbatim so newer servers don't break
/// decoding of the whole message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectionRefusedReason {
    InvalidSlot,
    InvalidGame,
    IncompatibleVersion,
    InvalidPassword,
    InvalidItemsHandling,
    Other(String),
}

impl From<String> for ConnectionRefusedReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "InvalidSlot" => Self::InvalidSlot,
            "InvalidGame" => Self::InvalidGame,
            "IncompatibleVersion" => Self::IncompatibleVersion,
            "InvalidPassword" => Self::InvalidPassword,
            "InvalidItemsHandling" => Self::InvalidItemsHandling,
            _ => Self::Other(value),
        }
    }
}

impl From<ConnectionRefusedReason> for String {
    fn from(value: ConnectionRefusedReason) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ConnectionRefusedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSlot => f.write_str("InvalidSlot"),
            Self::InvalidGame => f.write_str("InvalidGame"),
            Self::IncompatibleVersion => f.write_str("IncompatibleVersion"),
            Self::InvalidPassword => f.write_str("InvalidPassword"),
            Self::InvalidItemsHandling => f.write_str("InvalidItemsHandling"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

/// Payload of `PrintJSON`. Only the fields the engine reads are typed;
/// rendering the text parts is left to presentation code.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PrintJson {
    /// Event type (`Chat`, `ItemSend`, `Join`, …); absent for plain text.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Vec<JsonTextPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<SlotId>,
    /// Raw chat text for `Chat`/`ServerChat` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiving: Option<SlotId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<NetworkItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countdown: Option<i64>,
}

/// One segment of a `PrintJSON` message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JsonTextPart {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: String,
}

/// Payload of `DataPackage`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataPackagePayload {
    pub games: BTreeMap<String, GameData>,
}

/// Name ↔ id tables of one game.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameData {
    #[serde(default)]
    pub item_name_to_id: BTreeMap<String, i64>,
    #[serde(default)]
    pub location_name_to_id: BTreeMap<String, i64>,
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Payload of `SetReply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetReply {
    pub key: String,
    pub value: Value,
    /// Value before the operations ran; `None` for new keys.
    #[serde(default)]
    pub original_value: Option<Value>,
    /// Slot that issued the `Set`.
    #[serde(default)]
    pub slot: Option<SlotId>,
    /// Echo of the `Set` token; absent on pushes caused by other clients
    /// that didn't send one.
    #[serde(default)]
    pub correlation_token: Option<String>,
}

// ---------------------------------------------------------------------------
// MessageKind: the discriminant as a value
// ---------------------------------------------------------------------------

/// The discriminant of a [`ServerMessage`], used to key subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    RoomInfo,
    ConnectionRefused,
    Connected,
    ReceivedItems,
    LocationInfo,
    RoomUpdate,
    PrintJson,
    DataPackage,
    Bounced,
    InvalidPacket,
    Retrieved,
    SetReply,
}

impl MessageKind {
    /// Every inbound kind, in declaration order.
    pub const ALL: [MessageKind; 12] = [
        Self::RoomInfo,
        Self::ConnectionRefused,
        Self::Connected,
        Self::ReceivedItems,
        Self::LocationInfo,
        Self::RoomUpdate,
        Self::PrintJson,
        Self::DataPackage,
        Self::Bounced,
        Self::InvalidPacket,
        Self::Retrieved,
        Self::SetReply,
    ];

    /// The `cmd` value on the wire.
    pub fn as_cmd(self) -> &'static str {
        match self {
            Self::RoomInfo => "RoomInfo",
            Self::ConnectionRefused => "ConnectionRefused",
            Self::Connected => "Connected",
            Self::ReceivedItems => "ReceivedItems",
            Self::LocationInfo => "LocationInfo",
            Self::RoomUpdate => "RoomUpdate",
            Self::PrintJson => "PrintJSON",
            Self::DataPackage => "DataPackage",
            Self::Bounced => "Bounced",
            Self::InvalidPacket => "InvalidPacket",
            Self::Retrieved => "Retrieved",
            Self::SetReply => "SetReply",
        }
    }

    /// Maps a `cmd` value back to its kind; `None` for unknown commands.
    pub fn from_cmd(cmd: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_cmd() == cmd)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_cmd())
    }
}

impl ServerMessage {
    /// Returns this message's discriminant.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::RoomInfo(_) => MessageKind::RoomInfo,
            Self::ConnectionRefused { .. } => MessageKind::ConnectionRefused,
            Self::Connected(_) => MessageKind::Connected,
            Self::ReceivedItems { .. } => MessageKind::ReceivedItems,
            Self::LocationInfo { .. } => MessageKind::LocationInfo,
            Self::RoomUpdate(_) => MessageKind::RoomUpdate,
            Self::PrintJson(_) => MessageKind::PrintJson,
            Self::DataPackage { .. } => MessageKind::DataPackage,
            Self::Bounced { .. } => MessageKind::Bounced,
            Self::InvalidPacket { .. } => MessageKind::InvalidPacket,
            Self::Retrieved { .. } => MessageKind::Retrieved,
            Self::SetReply(_) => MessageKind::SetReply,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

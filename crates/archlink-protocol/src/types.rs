//! Shared value types that appear inside messages.
//!
//! Everything here travels "on the wire" as part of a larger message:
//! identities (team, slot), versions, items, players and the small
//! integer-coded enums and bit sets the server uses.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Numeric identifier of a location inside a game's data package.
pub type LocationId = i64;

/// Numeric identifier of an item inside a game's data package.
pub type ItemId = i64;

/// A team number. Slots on different teams never share items.
///
/// Newtype wrapper so a team can't be passed where a slot is expected,
/// even though both are plain integers on the wire. `#[serde(transparent)]`
/// keeps the JSON form a bare number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TeamId(pub u32);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T-{}", self.0)
    }
}

/// A slot number: one participant within a team. Slot 0 is the server.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SlotId(pub u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

/// The `class` marker the server expects on version objects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize,
    Deserialize,
)]
pub enum VersionClass {
    #[default]
    Version,
}

/// A `major.minor.build` protocol or generator version.
///
/// Serializes as `{"major":0,"minor":5,"build":1,"class":"Version"}`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize,
    Deserialize,
)]
pub struct NetworkVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    #[serde(default)]
    pub class: VersionClass,
}

impl NetworkVersion {
    /// Creates a version from its three components.
    pub const fn new(major: u32, minor: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            build,
            class: VersionClass::Version,
        }
    }
}

impl fmt::Display for NetworkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

// ---------------------------------------------------------------------------
// Players, slots and items
// ---------------------------------------------------------------------------

/// A player as listed in the roster of `Connected` and `RoomUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPlayer {
    pub team: TeamId,
    pub slot: SlotId,
    /// Display name; changes when the player renames themselves.
    pub alias: String,
    /// The slot name fixed at generation time.
    pub name: String,
}

/// What kind of participant a slot is.
///
/// The server sends this as an integer, so the enum goes through `u8`
/// on (de)serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SlotType {
    Spectator,
    Player,
    Group,
}

impl From<SlotType> for u8 {
    fn from(value: SlotType) -> Self {
        match value {
            SlotType::Spectator => 0,
            SlotType::Player => 1,
            SlotType::Group => 2,
        }
    }
}

impl TryFrom<u8> for SlotType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Spectator),
            1 => Ok(Self::Player),
            2 => Ok(Self::Group),
            other => Err(format!("unknown slot type {other}")),
        }
    }
}

/// Static information about a slot, from `Connected.slot_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSlot {
    pub name: String,
    pub game: String,
    #[serde(rename = "type")]
    pub slot_type: SlotType,
    /// Members of an item-link group; empty for ordinary slots.
    #[serde(default)]
    pub group_members: Vec<SlotId>,
}

/// Classification bits on an item (progression, useful, trap).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ItemFlags(pub u8);

impl ItemFlags {
    pub const FILLER: Self = Self(0b000);
    pub const PROGRESSION: Self = Self(0b001);
    pub const USEFUL: Self = Self(0b010);
    pub const TRAP: Self = Self(0b100);

    /// Returns `true` if every bit of `other` is set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// An item placed at a location, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkItem {
    pub item: ItemId,
    pub location: LocationId,
    /// The slot that found (for received items) or will receive (for
    /// scouted locations) the item.
    pub player: SlotId,
    #[serde(default)]
    pub flags: ItemFlags,
}

// ---------------------------------------------------------------------------
// ItemsHandling: which item events the server should send
// ---------------------------------------------------------------------------

/// Bitmask telling the server which `ReceivedItems` events to send.
///
/// Flags compose with `|`:
///
/// ```rust
/// use archlink_protocol::ItemsHandling;
///
/// let flags = ItemsHandling::OTHER_WORLDS | ItemsHandling::OWN_WORLD;
/// assert!(flags.contains(ItemsHandling::OWN_WORLD));
/// assert!(!flags.contains(ItemsHandling::STARTING_INVENTORY));
/// ```
///
/// [`ItemsHandling::MINIMAL`] (zero) is the reserved value: the client
/// only receives items explicitly cheated in by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemsHandling(pub u8);

impl ItemsHandling {
    pub const MINIMAL: Self = Self(0b000);
    pub const OTHER_WORLDS: Self = Self(0b001);
    pub const OWN_WORLD: Self = Self(0b010);
    pub const STARTING_INVENTORY: Self = Self(0b100);
    pub const ALL: Self = Self(0b111);

    /// Returns `true` if every bit of `other` is set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the raw bitmask.
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl Default for ItemsHandling {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for ItemsHandling {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ItemsHandling {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// ClientStatus / Permission
// ---------------------------------------------------------------------------

/// A client's self-reported progress, sent with `StatusUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ClientStatus {
    Unknown,
    Connected,
    Ready,
    Playing,
    Goal,
}

impl From<ClientStatus> for u8 {
    fn from(value: ClientStatus) -> Self {
        match value {
            ClientStatus::Unknown => 0,
            ClientStatus::Connected => 5,
            ClientStatus::Ready => 10,
            ClientStatus::Playing => 20,
            ClientStatus::Goal => 30,
        }
    }
}

impl TryFrom<u8> for ClientStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unknown),
            5 => Ok(Self::Connected),
            10 => Ok(Self::Ready),
            20 => Ok(Self::Playing),
            30 => Ok(Self::Goal),
            other => Err(format!("unknown client status {other}")),
        }
    }
}

/// Permission level of a room command such as `release` or `collect`.
///
/// Bit 0: enabled manually. Bit 1: allowed after goal. Bit 2: runs
/// automatically on goal. The server uses the values 0, 1, 2, 6 and 7.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Permission(pub u8);

impl Permission {
    pub const DISABLED: Self = Self(0b000);
    pub const ENABLED: Self = Self(0b001);
    pub const GOAL: Self = Self(0b010);
    pub const AUTO: Self = Self(0b110);
    pub const AUTO_ENABLED: Self = Self(0b111);

    /// Can the command be used at any time?
    pub fn is_enabled(self) -> bool {
        self.0 & Self::ENABLED.0 != 0
    }

    /// Can the command be used once the slot reached its goal?
    pub fn on_goal(self) -> bool {
        self.0 & Self::GOAL.0 != 0
    }

    /// Does the server run the command automatically on goal?
    pub fn is_auto(self) -> bool {
        self.0 & 0b100 != 0
    }
}

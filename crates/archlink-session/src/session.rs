//! Session types: the client's record of its one connection attempt.
//!
//! A "session" tracks:
//! - WHERE the connection is in its lifecycle ([`ConnectionPhase`])
//! - WHO we authenticated as (slot name, game)
//! - WHAT the server assigned us (team, slot)
//!
//! The record is never patched field by field on disconnect; it is
//! replaced wholesale with [`Session::default`].

use std::fmt;

use archlink_protocol::{SlotId, TeamId};

// ---------------------------------------------------------------------------
// ConnectionPhase
// ---------------------------------------------------------------------------

/// The connection lifecycle.
///
/// ```text
///  Disconnected ──connect──→ Connecting ──open──→ AwaitingAuthentication
///       ↑                        │                        │
///       │                        │                   Connected reply
///       │                        │                        ▼
///       └──────(disconnect, close, error, refusal)──── Established
/// ```
///
/// Any phase may drop to `Disconnected`. Phases are ordered so "at least
/// `AwaitingAuthentication`" is a plain comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ConnectionPhase {
    /// No channel. Initial and terminal phase.
    #[default]
    Disconnected,
    /// Opening the channel (possibly trying more than one URL).
    Connecting,
    /// Channel open; waiting for room info and the authentication reply.
    AwaitingAuthentication,
    /// Authenticated.
    Established,
}

impl ConnectionPhase {
    /// Is `next` a legal transition from `self`?
    pub fn can_transition_to(self, next: ConnectionPhase) -> bool {
        use ConnectionPhase::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, AwaitingAuthentication)
                | (AwaitingAuthentication, Established)
                | (Connecting | AwaitingAuthentication | Established, Disconnected)
        )
    }

    /// May messages be sent in this phase?
    pub fn can_send(self) -> bool {
        self >= ConnectionPhase::AwaitingAuthentication
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingAuthentication => "awaiting authentication",
            Self::Established => "established",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The client's record of the current connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    /// Current lifecycle phase.
    pub phase: ConnectionPhase,

    /// Slot name we authenticated as. Set once `Established`.
    pub slot_name: Option<String>,

    /// Game of that slot.
    pub game: Option<String>,

    /// Team assigned by the server.
    pub team: Option<TeamId>,

    /// Slot number assigned by the server.
    pub slot: Option<SlotId>,
}

impl Session {
    /// A record for a freshly authenticated session.
    pub fn established(
        slot_name: impl Into<String>,
        game: impl Into<String>,
        team: TeamId,
        slot: SlotId,
    ) -> Self {
        Self {
            phase: ConnectionPhase::Established,
            slot_name: Some(slot_name.into()),
            game: Some(game.into()),
            team: Some(team),
            slot: Some(slot),
        }
    }

    pub fn is_established(&self) -> bool {
        self.phase == ConnectionPhase::Established
    }
}

// =========================================================================
// Tests
// =========================================================================

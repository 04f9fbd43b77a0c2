//! The session state cache: local mirrors of server-authoritative state.
//!
//! The cache is passive. It subscribes to the dispatch bus and updates
//! itself from messages the server already validated; it never sends
//! anything and has no failure paths of its own.
//!
//! | Source | Updates |
//! |---|---|
//! | `RoomInfo` | room snapshot (replaced) |
//! | `RoomUpdate` | room snapshot (present fields only), roster aliases, locations, hint points |
//! | `Connected` | own team/slot, roster, slot info, locations, hint points, slot data |
//! | `ReceivedItems` | received item list |
//! | `DataPackage` | per-game name tables |
//! | messages sent | own tags (`Connect`, `ConnectUpdate`) |
//!
//! Everything is session-scoped: [`SessionCache::reset`] discards it all.

use std::collections::BTreeMap;
use std::sync::Arc;

use archlink_dispatch::{DispatchBus, Listeners, SubscriptionId};
use archlink_protocol::{
    ClientMessage, Connected, GameData, LocationId, MessageKind, NetworkItem,
    NetworkPlayer, NetworkSlot, RoomInfo, RoomUpdate, ServerMessage, SlotId,
    TeamId,
};
use parking_lot::Mutex;
use serde_json::Value;

use crate::LocationSets;

/// A roster entry's alias changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasChange {
    pub team: TeamId,
    pub slot: SlotId,
    pub previous: String,
    pub alias: String,
}

/// A `ReceivedItems` index that doesn't continue the local list.
///
/// The list is left as it was; the owner should ask the server for a
/// full resend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemsDesync {
    /// Items held locally.
    pub expected: usize,
    /// Index the server sent.
    pub received: usize,
}

#[derive(Debug, Default)]
struct CacheState {
    room: Option<RoomInfo>,
    team: Option<TeamId>,
    slot: Option<SlotId>,
    players: BTreeMap<(TeamId, SlotId), NetworkPlayer>,
    slot_info: BTreeMap<SlotId, NetworkSlot>,
    slot_data: Value,
    locations: LocationSets,
    hint_points: i64,
    received_items: Vec<NetworkItem>,
    tags: Vec<String>,
    data_package: BTreeMap<String, GameData>,
}

/// Mirrors room, roster and location state for the current session.
#[derive(Debug, Default)]
pub struct SessionCache {
    state: Mutex<CacheState>,
    alias_listeners: Listeners<AliasChange>,
    desync_listeners: Listeners<ItemsDesync>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes the cache to every message it mirrors.
    pub fn attach(self: &Arc<Self>, bus: &DispatchBus) -> Vec<SubscriptionId> {
        let mut ids: Vec<_> = [
            MessageKind::RoomInfo,
            MessageKind::Connected,
            MessageKind::RoomUpdate,
            MessageKind::ReceivedItems,
            MessageKind::DataPackage,
        ]
        .into_iter()
        .map(|kind| {
            let cache = Arc::clone(self);
            bus.subscribe(kind, move |message| cache.apply(message))
        })
        .collect();

        let cache = Arc::clone(self);
        ids.push(bus.subscribe_sent(move |batch| cache.apply_sent(batch)));
        ids
    }

    /// Registers a callback for alias changes reported by `RoomUpdate`.
    pub fn on_alias_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&AliasChange) + Send + Sync + 'static,
    {
        self.alias_listeners.add(callback)
    }

    /// Registers a callback for out-of-order `ReceivedItems`.
    pub fn on_items_desync<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ItemsDesync) + Send + Sync + 'static,
    {
        self.desync_listeners.add(callback)
    }

    // -- Updates ----------------------------------------------------------

    /// Applies one inbound message. Kinds the cache doesn't mirror are
    /// ignored.
    pub fn apply(&self, message: &ServerMessage) {
        match message {
            ServerMessage::RoomInfo(info) => {
                self.state.lock().room = Some(info.clone());
            }
            ServerMessage::Connected(connected) => self.apply_connected(connected),
            ServerMessage::RoomUpdate(update) => {
                let changes = self.apply_room_update(update);
                // Listeners run after the lock is released.
                for change in &changes {
                    tracing::debug!(
                        team = %change.team,
                        slot = %change.slot,
                        alias = %change.alias,
                        "alias updated"
                    );
                    self.alias_listeners.emit(change);
                }
            }
            ServerMessage::ReceivedItems { index, items } => {
                if let Some(desync) = self.apply_received_items(*index, items) {
                    tracing::warn!(
                        expected = desync.expected,
                        received = desync.received,
                        "received items out of sequence"
                    );
                    self.desync_listeners.emit(&desync);
                }
            }
            ServerMessage::DataPackage { data } => {
                let mut state = self.state.lock();
                for (game, tables) in &data.games {
                    state.data_package.insert(game.clone(), tables.clone());
                }
            }
            _ => {}
        }
    }

    /// Follows self-issued tag changes.
    pub fn apply_sent(&self, batch: &[ClientMessage]) {
        for message in batch {
            let tags = match message {
                ClientMessage::Connect(connect) => Some(&connect.tags),
                ClientMessage::ConnectUpdate { tags, .. } => tags.as_ref(),
                _ => None,
            };
            if let Some(tags) = tags {
                self.state.lock().tags = tags.clone();
            }
        }
    }

    fn apply_connected(&self, connected: &Connected) {
        let mut state = self.state.lock();
        state.team = Some(connected.team);
        state.slot = Some(connected.slot);
        state.players = connected
            .players
            .iter()
            .map(|p| ((p.team, p.slot), p.clone()))
            .collect();
        state.slot_info = connected
            .slot_info
            .iter()
            .filter_map(|(key, slot)| match key.parse::<u32>() {
                Ok(id) => Some((SlotId(id), slot.clone())),
                Err(_) => {
                    tracing::debug!(%key, "ignoring non-numeric slot_info key");
                    None
                }
            })
            .collect();
        state.slot_data = connected.slot_data.clone();
        state.locations = LocationSets::new(
            connected.checked_locations.iter().copied(),
            connected.missing_locations.iter().copied(),
        );
        state.hint_points = connected.hint_points;

        tracing::info!(
            team = %connected.team,
            slot = %connected.slot,
            players = state.players.len(),
            checked = state.locations.checked().len(),
            missing = state.locations.missing().len(),
            "session state populated"
        );
    }

    fn apply_room_update(&self, update: &RoomUpdate) -> Vec<AliasChange> {
        let mut state = self.state.lock();

        if let Some(room) = state.room.as_mut() {
            merge_room(room, update);
        }
        if let Some(points) = update.hint_points {
            state.hint_points = points;
        }
        if let Some(checked) = &update.checked_locations {
            state.locations.mark_checked(checked.iter().copied());
        }
        if let Some(missing) = &update.missing_locations {
            state.locations.mark_missing(missing.iter().copied());
        }

        let mut changes = Vec::new();
        for player in update.players.iter().flatten() {
            let key = (player.team, player.slot);
            match state.players.get_mut(&key) {
                Some(known) if known.alias != player.alias => {
                    changes.push(AliasChange {
                        team: player.team,
                        slot: player.slot,
                        previous: std::mem::replace(&mut known.alias, player.alias.clone()),
                        alias: player.alias.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    state.players.insert(key, player.clone());
                }
            }
        }
        changes
    }

    fn apply_received_items(
        &self,
        index: usize,
        items: &[NetworkItem],
    ) -> Option<ItemsDesync> {
        let mut state = self.state.lock();
        let held = state.received_items.len();
        if index == 0 {
            state.received_items = items.to_vec();
            None
        } else if index == held {
            state.received_items.extend_from_slice(items);
            None
        } else {
            Some(ItemsDesync {
                expected: held,
                received: index,
            })
        }
    }

    /// Discards all session-scoped state. Listeners stay registered.
    pub fn reset(&self) {
        *self.state.lock() = CacheState::default();
    }

    // -- Reads ------------------------------------------------------------

    /// The current room snapshot, if `RoomInfo` has arrived.
    pub fn room(&self) -> Option<RoomInfo> {
        self.state.lock().room.clone()
    }

    pub fn team(&self) -> Option<TeamId> {
        self.state.lock().team
    }

    pub fn slot(&self) -> Option<SlotId> {
        self.state.lock().slot
    }

    /// The whole roster, ordered by team then slot.
    pub fn players(&self) -> Vec<NetworkPlayer> {
        self.state.lock().players.values().cloned().collect()
    }

    pub fn player(&self, team: TeamId, slot: SlotId) -> Option<NetworkPlayer> {
        self.state.lock().players.get(&(team, slot)).cloned()
    }

    /// Alias of a slot on our own team.
    pub fn alias(&self, slot: SlotId) -> Option<String> {
        let state = self.state.lock();
        let team = state.team?;
        state.players.get(&(team, slot)).map(|p| p.alias.clone())
    }

    pub fn slot_info(&self, slot: SlotId) -> Option<NetworkSlot> {
        self.state.lock().slot_info.get(&slot).cloned()
    }

    /// Game played by a slot, from `slot_info`.
    pub fn game_of(&self, slot: SlotId) -> Option<String> {
        self.state.lock().slot_info.get(&slot).map(|s| s.game.clone())
    }

    pub fn slot_data(&self) -> Value {
        self.state.lock().slot_data.clone()
    }

    pub fn locations(&self) -> LocationSets {
        self.state.lock().locations.clone()
    }

    pub fn checked_locations(&self) -> Vec<LocationId> {
        self.state.lock().locations.checked().iter().copied().collect()
    }

    pub fn missing_locations(&self) -> Vec<LocationId> {
        self.state.lock().locations.missing().iter().copied().collect()
    }

    pub fn hint_points(&self) -> i64 {
        self.state.lock().hint_points
    }

    pub fn received_items(&self) -> Vec<NetworkItem> {
        self.state.lock().received_items.clone()
    }

    /// Tags the client last announced.
    pub fn tags(&self) -> Vec<String> {
        self.state.lock().tags.clone()
    }

    /// Name tables of every game fetched so far.
    pub fn data_package(&self) -> BTreeMap<String, GameData> {
        self.state.lock().data_package.clone()
    }

    pub fn game_data(&self, game: &str) -> Option<GameData> {
        self.state.lock().data_package.get(game).cloned()
    }
}

/// Overwrites the fields of `room` that `update` carries.
fn merge_room(room: &mut RoomInfo, update: &RoomUpdate) {
    if let Some(v) = update.version {
        room.version = v;
    }
    if let Some(v) = update.generator_version {
        room.generator_version = v;
    }
    if let Some(v) = &update.tags {
        room.tags = v.clone();
    }
    if let Some(v) = update.password {
        room.password = v;
    }
    if let Some(v) = &update.permissions {
        room.permissions = v.clone();
    }
    if let Some(v) = update.hint_cost {
        room.hint_cost = v;
    }
    if let Some(v) = update.location_check_points {
        room.location_check_points = v;
    }
    if let Some(v) = &update.games {
        room.games = v.clone();
    }
    if let Some(v) = &update.datapackage_checksums {
        room.datapackage_checksums = v.clone();
    }
    if let Some(v) = &update.seed_name {
        room.seed_name = v.clone();
    }
    if let Some(v) = update.time {
        room.time = v;
    }
}

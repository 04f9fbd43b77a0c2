//! Integration tests for `SessionCache` fed through a real `DispatchBus`.
//!
//! Messages are decoded from the JSON the server actually sends, then
//! published exactly as the connection's reader task does.

use std::sync::{Arc, Mutex};

use archlink_dispatch::DispatchBus;
use archlink_protocol::{
    ClientMessage, Codec, JsonCodec, NetworkItem, SlotId, TeamId,
};
use archlink_session::{AliasChange, ItemsDesync, SessionCache};
use serde_json::json;

// -- Helpers --------------------------------------------------------------

fn setup() -> (DispatchBus, Arc<SessionCache>) {
    let bus = DispatchBus::new();
    let cache = Arc::new(SessionCache::new());
    cache.attach(&bus);
    (bus, cache)
}

/// Decodes a frame and publishes it, like the reader task.
fn deliver(bus: &DispatchBus, frame: serde_json::Value) {
    let messages = JsonCodec
        .decode_frame(frame.to_string().as_bytes())
        .expect("valid frame");
    bus.publish_all(&messages);
}

fn room_info() -> serde_json::Value {
    json!({
        "cmd": "RoomInfo",
        "version": {"major": 0, "minor": 5, "build": 1, "class": "Version"},
        "generator_version": {"major": 0, "minor": 5, "build": 0, "class": "Version"},
        "tags": ["AP"],
        "password": false,
        "permissions": {"release": 2, "collect": 2, "remaining": 0},
        "hint_cost": 10,
        "location_check_points": 1,
        "games": ["ExampleGame"],
        "datapackage_checksums": {"ExampleGame": "abc"},
        "seed_name": "seed-1",
        "time": 1700000000.5
    })
}

fn connected_alice() -> serde_json::Value {
    json!({
        "cmd": "Connected",
        "team": 0,
        "slot": 1,
        "players": [
            {"team": 0, "slot": 1, "alias": "Alice", "name": "Alice"},
            {"team": 0, "slot": 2, "alias": "Bob", "name": "Bob"}
        ],
        "missing_locations": [1, 2, 3],
        "checked_locations": [],
        "slot_data": {"goal": 1},
        "slot_info": {
            "1": {"name": "Alice", "game": "ExampleGame", "type": 1, "group_members": []},
            "2": {"name": "Bob", "game": "OtherGame", "type": 1, "group_members": []}
        },
        "hint_points": 3
    })
}

fn item(id: i64) -> NetworkItem {
    NetworkItem {
        item: id,
        location: id * 10,
        player: SlotId(2),
        flags: Default::default(),
    }
}

fn received(index: usize, items: &[NetworkItem]) -> serde_json::Value {
    json!({"cmd": "ReceivedItems", "index": index, "items": items})
}

// =========================================================================
// Connected / RoomUpdate
// =========================================================================

#[test]
fn test_connected_then_room_update_moves_checked_location() {
    let (bus, cache) = setup();

    deliver(&bus, json!([room_info(), connected_alice()]));
    assert_eq!(cache.missing_locations(), vec![1, 2, 3]);
    assert!(cache.checked_locations().is_empty());

    deliver(&bus, json!([{"cmd": "RoomUpdate", "checked_locations": [2]}]));

    assert_eq!(cache.checked_locations(), vec![2]);
    assert_eq!(cache.missing_locations(), vec![1, 3]);
}

#[test]
fn test_connected_populates_identity_roster_and_slot_info() {
    let (bus, cache) = setup();
    deliver(&bus, json!([connected_alice()]));

    assert_eq!(cache.team(), Some(TeamId(0)));
    assert_eq!(cache.slot(), Some(SlotId(1)));
    assert_eq!(cache.players().len(), 2);
    assert_eq!(cache.alias(SlotId(2)).as_deref(), Some("Bob"));
    assert_eq!(cache.game_of(SlotId(2)).as_deref(), Some("OtherGame"));
    assert_eq!(cache.slot_data(), json!({"goal": 1}));
    assert_eq!(cache.hint_points(), 3);
}

#[test]
fn test_room_update_merges_only_present_fields() {
    let (bus, cache) = setup();
    deliver(&bus, json!([room_info()]));

    deliver(
        &bus,
        json!([{"cmd": "RoomUpdate", "hint_cost": 25, "hint_points": 9}]),
    );

    let room = cache.room().expect("room info received");
    assert_eq!(room.hint_cost, 25);
    assert_eq!(room.seed_name, "seed-1", "absent fields keep their value");
    assert_eq!(room.games, vec!["ExampleGame".to_string()]);
    assert_eq!(cache.hint_points(), 9);
}

#[test]
fn test_room_info_replaces_snapshot_wholesale() {
    let (bus, cache) = setup();
    deliver(&bus, json!([room_info()]));

    let mut second = room_info();
    second["seed_name"] = json!("seed-2");
    second["games"] = json!([]);
    deliver(&bus, json!([second]));

    let room = cache.room().unwrap();
    assert_eq!(room.seed_name, "seed-2");
    assert!(room.games.is_empty());
}

#[test]
fn test_room_update_alias_change_emits_one_event_per_player() {
    let (bus, cache) = setup();
    let events = Arc::new(Mutex::new(Vec::new()));
    {
        let events = Arc::clone(&events);
        cache.on_alias_changed(move |change| events.lock().unwrap().push(change.clone()));
    }
    deliver(&bus, json!([connected_alice()]));

    deliver(
        &bus,
        json!([{"cmd": "RoomUpdate", "players": [
            {"team": 0, "slot": 1, "alias": "Alice", "name": "Alice"},
            {"team": 0, "slot": 2, "alias": "Robert", "name": "Bob"}
        ]}]),
    );

    assert_eq!(
        *events.lock().unwrap(),
        vec![AliasChange {
            team: TeamId(0),
            slot: SlotId(2),
            previous: "Bob".into(),
            alias: "Robert".into(),
        }]
    );
    assert_eq!(cache.alias(SlotId(2)).as_deref(), Some("Robert"));
}

#[test]
fn test_alias_listener_can_read_cache_without_deadlock() {
    let (bus, cache) = setup();
    let seen = Arc::new(Mutex::new(None));
    {
        let seen = Arc::clone(&seen);
        let reader = Arc::clone(&cache);
        cache.on_alias_changed(move |change| {
            *seen.lock().unwrap() = reader.alias(change.slot);
        });
    }
    deliver(&bus, json!([connected_alice()]));
    deliver(
        &bus,
        json!([{"cmd": "RoomUpdate", "players": [
            {"team": 0, "slot": 1, "alias": "Ally", "name": "Alice"}
        ]}]),
    );

    assert_eq!(seen.lock().unwrap().as_deref(), Some("Ally"));
}

// =========================================================================
// ReceivedItems
// =========================================================================

#[test]
fn test_received_items_index_zero_replaces_then_appends() {
    let (bus, cache) = setup();

    deliver(&bus, json!([received(0, &[item(1), item(2)])]));
    deliver(&bus, json!([received(2, &[item(3)])]));
    assert_eq!(cache.received_items(), vec![item(1), item(2), item(3)]);

    deliver(&bus, json!([received(0, &[item(9)])]));
    assert_eq!(cache.received_items(), vec![item(9)]);
}

#[test]
fn test_received_items_gap_reports_desync_and_keeps_list() {
    let (bus, cache) = setup();
    let desyncs = Arc::new(Mutex::new(Vec::new()));
    {
        let desyncs = Arc::clone(&desyncs);
        cache.on_items_desync(move |d| desyncs.lock().unwrap().push(*d));
    }

    deliver(&bus, json!([received(0, &[item(1)])]));
    deliver(&bus, json!([received(5, &[item(6)])]));

    assert_eq!(cache.received_items(), vec![item(1)]);
    assert_eq!(
        *desyncs.lock().unwrap(),
        vec![ItemsDesync {
            expected: 1,
            received: 5
        }]
    );
}

// =========================================================================
// Self-issued state, data package, reset
// =========================================================================

#[test]
fn test_sent_connect_update_tracks_tags() {
    let (bus, cache) = setup();

    bus.emit_sent(&[ClientMessage::ConnectUpdate {
        items_handling: None,
        tags: Some(vec!["AP".into(), "DeathLink".into()]),
    }]);
    assert_eq!(cache.tags(), vec!["AP", "DeathLink"]);

    // An update without tags leaves them alone.
    bus.emit_sent(&[ClientMessage::ConnectUpdate {
        items_handling: None,
        tags: None,
    }]);
    assert_eq!(cache.tags().len(), 2);
}

#[test]
fn test_data_package_is_merged_per_game() {
    let (bus, cache) = setup();
    deliver(
        &bus,
        json!([{"cmd": "DataPackage", "data": {"games": {
            "ExampleGame": {
                "item_name_to_id": {"Sword": 1},
                "location_name_to_id": {"Chest": 10},
                "checksum": "abc"
            }
        }}}]),
    );

    let game = cache.game_data("ExampleGame").expect("fetched");
    assert_eq!(game.item_name_to_id.get("Sword"), Some(&1));
    assert_eq!(game.checksum.as_deref(), Some("abc"));
}

#[test]
fn test_reset_discards_everything_but_keeps_listeners() {
    let (bus, cache) = setup();
    let events = Arc::new(Mutex::new(0));
    {
        let events = Arc::clone(&events);
        cache.on_alias_changed(move |_| *events.lock().unwrap() += 1);
    }
    deliver(&bus, json!([room_info(), connected_alice(), received(0, &[item(1)])]));

    cache.reset();

    assert!(cache.room().is_none());
    assert!(cache.slot().is_none());
    assert!(cache.players().is_empty());
    assert!(cache.checked_locations().is_empty());
    assert!(cache.missing_locations().is_empty());
    assert!(cache.received_items().is_empty());
    assert!(cache.slot_data().is_null());

    // Still attached after reset.
    deliver(&bus, json!([connected_alice()]));
    deliver(
        &bus,
        json!([{"cmd": "RoomUpdate", "players": [
            {"team": 0, "slot": 2, "alias": "Bobby", "name": "Bob"}
        ]}]),
    );
    assert_eq!(*events.lock().unwrap(), 1);
}

use coedit_types::{ItemId, PeerId};
use proptest::prelude::*;
use std::collections::HashSet;
use std::str::FromStr;

fn peer(n: u8) -> PeerId {
    PeerId::from_uuid(uuid::Uuid::from_bytes([
        n, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ]))
}

// ── PeerId ───────────────────────────────────────────────────────

#[test]
fn peer_id_new_is_unique() {
    let a = PeerId::new();
    let b = PeerId::new();
    assert_ne!(a, b);
}

#[test]
fn peer_id_from_uuid_roundtrip() {
    let uuid = uuid::Uuid::now_v7();
    let id = PeerId::from_uuid(uuid);
    assert_eq!(id.as_uuid(), uuid);
}

#[test]
fn peer_id_display_and_parse() {
    let id = PeerId::new();
    let parsed = PeerId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
    assert_eq!(PeerId::from_str(&id.to_string()).unwrap(), id);
}

#[test]
fn peer_id_parse_invalid() {
    assert!(PeerId::parse("not-a-uuid").is_err());
}

#[test]
fn peer_id_serializes_as_plain_string() {
    let id = PeerId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
}

// ── ItemId ───────────────────────────────────────────────────────

#[test]
fn root_is_root() {
    assert!(ItemId::root().is_root());
    assert!(!ItemId::new(1, PeerId::new()).is_root());
}

#[test]
fn zero_timestamp_from_a_peer_is_not_root() {
    assert!(!ItemId::new(0, peer(3)).is_root());
}

#[test]
fn root_sorts_below_everything() {
    assert!(ItemId::root() < ItemId::new(1, peer(0)));
}

#[test]
fn ordered_by_timestamp_first() {
    let low = ItemId::new(1, peer(9));
    let high = ItemId::new(2, peer(1));
    assert!(low < high);
}

#[test]
fn peer_breaks_ties() {
    let a = ItemId::new(5, peer(1));
    let b = ItemId::new(5, peer(2));
    assert!(a < b);
    assert_eq!(a.cmp(&a), std::cmp::Ordering::Equal);
}

#[test]
fn accessors() {
    let p = PeerId::new();
    let id = ItemId::new(42, p);
    assert_eq!(id.logical_ts(), 42);
    assert_eq!(id.peer_id(), p);
}

#[test]
fn display_and_parse() {
    let id = ItemId::new(7, PeerId::new());
    let parsed: ItemId = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn parse_invalid() {
    assert!("bad".parse::<ItemId>().is_err());
    assert!("x@00000000-0000-0000-0000-000000000000".parse::<ItemId>().is_err());
    assert!("3@not-a-uuid".parse::<ItemId>().is_err());
}

#[test]
fn hash_eq() {
    let id = ItemId::new(1, PeerId::new());
    let mut set = HashSet::new();
    set.insert(id);
    set.insert(id);
    assert_eq!(set.len(), 1);
}

proptest! {
    #[test]
    fn order_is_total_and_antisymmetric(ts1 in 0u64..100, ts2 in 0u64..100, p1 in 0u8..4, p2 in 0u8..4) {
        let a = ItemId::new(ts1, peer(p1));
        let b = ItemId::new(ts2, peer(p2));
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        prop_assert_eq!(a == b, ts1 == ts2 && p1 == p2);
    }
}

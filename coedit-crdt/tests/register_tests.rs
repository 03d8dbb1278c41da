use coedit_crdt::{CrdtError, CursorMap, LwwRegister, RegisterMap};
use coedit_types::{ItemId, OpPayload, Operation, PeerId};

fn peer(n: u8) -> PeerId {
    PeerId::from_uuid(uuid::Uuid::from_bytes([
        n, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ]))
}

fn field() -> ItemId {
    ItemId::new(1, peer(0))
}

// ── LwwRegister ──────────────────────────────────────────────────

#[test]
fn register_new() {
    let id = ItemId::new(3, peer(1));
    let reg = LwwRegister::new(42, id);
    assert_eq!(*reg.value(), 42);
    assert_eq!(reg.written_by(), id);
}

#[test]
fn register_set_accepts_greater_id() {
    let mut reg = LwwRegister::new("old", ItemId::new(1, peer(1)));
    assert!(reg.set("new", ItemId::new(2, peer(1))));
    assert_eq!(*reg.value(), "new");
}

#[test]
fn register_set_rejects_lower_or_equal_id() {
    let mut reg = LwwRegister::new("kept", ItemId::new(5, peer(2)));
    assert!(!reg.set("lower", ItemId::new(4, peer(9))));
    assert!(!reg.set("same", ItemId::new(5, peer(2))));
    assert_eq!(*reg.value(), "kept");
}

#[test]
fn register_peer_breaks_timestamp_tie() {
    let mut reg = LwwRegister::new("p1", ItemId::new(5, peer(1)));
    assert!(reg.set("p2", ItemId::new(5, peer(2))));
    assert_eq!(*reg.value(), "p2");
}

#[test]
fn register_merge_is_commutative() {
    let a = LwwRegister::new('a', ItemId::new(3, peer(1)));
    let b = LwwRegister::new('b', ItemId::new(3, peer(2)));
    assert_eq!(a.merged(&b), b.merged(&a));
    assert_eq!(*a.merged(&b).value(), 'b');
}

#[test]
fn register_merge_is_idempotent() {
    let a = LwwRegister::new(7, ItemId::new(3, peer(1)));
    assert_eq!(a.merged(&a), a);
}

// ── RegisterMap ──────────────────────────────────────────────────

#[test]
fn map_starts_empty() {
    let map: RegisterMap<String, u32> = RegisterMap::new(field());
    assert!(map.is_empty());
    assert_eq!(map.len(), 0);
    assert_eq!(map.id(), field());
}

#[test]
fn map_write_and_get() {
    let mut map = RegisterMap::new(field());
    assert!(map.write(ItemId::new(2, peer(1)), "k", 1));
    assert_eq!(map.get(&"k"), Some(&1));
    assert_eq!(map.written_by(&"k"), Some(ItemId::new(2, peer(1))));
}

#[test]
fn map_keeps_greatest_write_per_key() {
    let mut map = RegisterMap::new(field());
    map.write(ItemId::new(4, peer(1)), "k", "four");
    assert!(!map.write(ItemId::new(3, peer(2)), "k", "three"));
    assert!(map.write(ItemId::new(4, peer(2)), "k", "four-b"));
    assert_eq!(map.get(&"k"), Some(&"four-b"));
}

#[test]
fn map_keys_are_independent() {
    let mut map = RegisterMap::new(field());
    map.write(ItemId::new(9, peer(1)), "a", 1);
    assert!(map.write(ItemId::new(2, peer(1)), "b", 2));
    let entries: Vec<_> = map.iter().collect();
    assert_eq!(entries, vec![(&"a", &1), (&"b", &2)]);
}

#[test]
fn map_merge_converges() {
    let mut a = RegisterMap::new(field());
    let mut b = RegisterMap::new(field());
    a.write(ItemId::new(2, peer(1)), 1u8, 'a');
    b.write(ItemId::new(3, peer(2)), 1u8, 'b');
    b.write(ItemId::new(3, peer(2)), 2u8, 'c');

    let ab = {
        let mut m = a.clone();
        m.merge(&b);
        m
    };
    let ba = {
        let mut m = b.clone();
        m.merge(&a);
        m
    };
    assert_eq!(ab, ba);
    assert_eq!(ab.get(&1), Some(&'b'));
}

// ── CursorMap operations ─────────────────────────────────────────

#[test]
fn cursor_put_builds_operation() {
    let mut cursors = CursorMap::new(field());
    let at = ItemId::new(7, peer(1));
    let op = cursors.put(peer(1), Some(at), || ItemId::new(8, peer(1))).unwrap();
    assert_eq!(op.target, field());
    assert_eq!(
        op.payload,
        OpPayload::MapPut {
            key: peer(1),
            value: Some(at)
        }
    );
    assert_eq!(cursors.get(&peer(1)), Some(&Some(at)));
}

#[test]
fn cursor_apply_is_order_independent() {
    let w1 = Operation::new(
        ItemId::new(5, peer(1)),
        field(),
        OpPayload::MapPut {
            key: peer(3),
            value: None,
        },
    );
    let w2 = Operation::new(
        ItemId::new(5, peer(2)),
        field(),
        OpPayload::MapPut {
            key: peer(3),
            value: Some(ItemId::new(4, peer(3))),
        },
    );

    let mut a = CursorMap::new(field());
    a.apply_operation(&w1).unwrap();
    a.apply_operation(&w2).unwrap();
    let mut b = CursorMap::new(field());
    b.apply_operation(&w2).unwrap();
    assert!(!b.apply_operation(&w1).unwrap());

    assert_eq!(a, b);
    assert_eq!(a.get(&peer(3)), Some(&Some(ItemId::new(4, peer(3)))));
}

#[test]
fn cursor_apply_rejects_foreign_payloads() {
    let mut cursors = CursorMap::new(field());
    let insert = Operation::new(
        ItemId::new(2, peer(1)),
        field(),
        OpPayload::InsertChar {
            after: field(),
            value: 'a',
        },
    );
    assert!(matches!(
        cursors.apply_operation(&insert),
        Err(CrdtError::WrongPayload { .. })
    ));

    let misdirected = Operation::new(
        ItemId::new(2, peer(1)),
        ItemId::new(9, peer(9)),
        OpPayload::MapPut {
            key: peer(1),
            value: None,
        },
    );
    assert!(matches!(
        cursors.apply_operation(&misdirected),
        Err(CrdtError::WrongTarget { .. })
    ));
}

#[test]
fn cursor_map_json_roundtrip() {
    let mut cursors = CursorMap::new(field());
    cursors
        .put(peer(1), Some(ItemId::new(1, peer(5))), || ItemId::new(2, peer(1)))
        .unwrap();
    let json = serde_json::to_string(&cursors).unwrap();
    let back: CursorMap = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cursors);
}

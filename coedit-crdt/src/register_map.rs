//! Register map: one last-writer-wins register per key.
//!
//! The document uses a `RegisterMap<PeerId, Cursor>` to publish each peer's
//! cursor position. Entries are never deleted, only overwritten.

use crate::{CrdtError, CrdtResult, LwwRegister};
use coedit_types::{Cursor, ItemId, OpPayload, Operation, PeerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The cursor map of a document.
pub type CursorMap = RegisterMap<PeerId, Cursor>;

/// A map of last-writer-wins registers.
///
/// `id` is the identifier of the field this map was initialized as; every
/// operation applied to the map must target it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize + Ord, V: Serialize",
    deserialize = "K: Deserialize<'de> + Ord, V: Deserialize<'de>"
))]
pub struct RegisterMap<K, V> {
    id: ItemId,
    entries: BTreeMap<K, LwwRegister<V>>,
}

impl<K: Ord + Clone, V: Clone> RegisterMap<K, V> {
    /// Creates an empty map for the field `id`.
    #[must_use]
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            entries: BTreeMap::new(),
        }
    }

    /// The field identifier.
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Writes `value` under `key` with write identifier `id`.
    ///
    /// A write whose identifier is not greater than the current one for the
    /// key is discarded. Returns true if the entry changed.
    pub fn write(&mut self, id: ItemId, key: K, value: V) -> bool {
        match self.entries.get_mut(&key) {
            Some(register) => register.set(value, id),
            None => {
                self.entries.insert(key, LwwRegister::new(value, id));
                true
            }
        }
    }

    /// Returns the value for `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(LwwRegister::value)
    }

    /// Returns the identifier of the write currently held for `key`.
    #[must_use]
    pub fn written_by(&self, key: &K) -> Option<ItemId> {
        self.entries.get(key).map(LwwRegister::written_by)
    }

    /// Iterates over keys and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, r)| (k, r.value()))
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no key has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges another map into this one, key by key.
    pub fn merge(&mut self, other: &Self) {
        for (key, register) in &other.entries {
            match self.entries.get_mut(key) {
                Some(existing) => existing.merge(register),
                None => {
                    self.entries.insert(key.clone(), register.clone());
                }
            }
        }
    }
}

impl CursorMap {
    /// Builds and applies a local cursor write, returning the operation.
    ///
    /// `next_id` supplies the write identifier.
    pub fn put(
        &mut self,
        key: PeerId,
        value: Cursor,
        next_id: impl FnOnce() -> ItemId,
    ) -> CrdtResult<Operation> {
        let op = Operation::new(next_id(), self.id, OpPayload::MapPut { key, value });
        self.apply_operation(&op)?;
        Ok(op)
    }

    /// Applies a stamped map-put operation from any peer.
    ///
    /// Returns true if the entry changed.
    pub fn apply_operation(&mut self, op: &Operation) -> CrdtResult<bool> {
        if op.target != self.id {
            return Err(CrdtError::WrongTarget {
                expected: self.id,
                got: op.target,
            });
        }
        let id = op.id.ok_or(CrdtError::Unstamped)?;
        match &op.payload {
            OpPayload::MapPut { key, value } => Ok(self.write(id, *key, *value)),
            OpPayload::InsertChar { .. } => Err(wrong_payload("insert-char")),
            OpPayload::DeleteRange { .. } => Err(wrong_payload("delete-range")),
            OpPayload::FieldInit { .. } => Err(wrong_payload("field-init")),
        }
    }
}

fn wrong_payload(payload: &'static str) -> CrdtError {
    CrdtError::WrongPayload {
        datatype: "register map",
        payload,
    }
}

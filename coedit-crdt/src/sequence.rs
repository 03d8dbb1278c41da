//! Replicated Growable Array (RGA) of characters.
//!
//! Every element records the element it was inserted after. Concurrent
//! inserts after the same predecessor are ordered by identifier, highest
//! first. Identifiers are Lamport values, so an element's identifier is
//! greater than those of every element its creator had applied; integration
//! therefore only has to skip following elements with a greater identifier.
//!
//! Deleted elements stay in place as tombstones. They remain valid anchors
//! for inserts, deletes and cursors.
//!
//! Storage is an arena: elements live in a `Vec` in arrival order, an index
//! maps identifiers to arena slots, and `order` lists slots in document
//! order.

use crate::{CrdtError, CrdtResult};
use coedit_types::{ItemId, OpPayload, Operation};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// An element of the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    value: char,
    /// The element this one was inserted after, or the field ID at the head.
    after: ItemId,
    /// Identifier of the delete that tombstoned this element.
    deleted_by: Option<ItemId>,
}

impl Item {
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    #[must_use]
    pub fn value(&self) -> char {
        self.value
    }

    /// The element this one was inserted after.
    #[must_use]
    pub fn predecessor(&self) -> ItemId {
        self.after
    }

    #[must_use]
    pub fn deleted_by(&self) -> Option<ItemId> {
        self.deleted_by
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_by.is_some()
    }
}

#[derive(Serialize, Deserialize)]
struct SequenceRepr {
    id: ItemId,
    items: Vec<Item>,
    order: Vec<usize>,
}

/// The replicated character sequence of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SequenceRepr", into = "SequenceRepr")]
pub struct CharSequence {
    /// Field identifier; doubles as the head anchor.
    id: ItemId,
    /// Arena of all elements, in arrival order.
    items: Vec<Item>,
    /// Identifier to arena slot.
    index: HashMap<ItemId, usize>,
    /// Arena slots in document order.
    order: Vec<usize>,
}

impl TryFrom<SequenceRepr> for CharSequence {
    type Error = CrdtError;

    fn try_from(repr: SequenceRepr) -> CrdtResult<Self> {
        let mut index = HashMap::with_capacity(repr.items.len());
        for (slot, item) in repr.items.iter().enumerate() {
            if index.insert(item.id, slot).is_some() {
                return Err(CrdtError::CorruptState(format!(
                    "duplicate item {}",
                    item.id
                )));
            }
        }
        if repr.order.len() != repr.items.len() {
            return Err(CrdtError::CorruptState(format!(
                "order lists {} slots for {} items",
                repr.order.len(),
                repr.items.len()
            )));
        }
        let mut seen = HashSet::with_capacity(repr.order.len());
        for &slot in &repr.order {
            if slot >= repr.items.len() || !seen.insert(slot) {
                return Err(CrdtError::CorruptState(format!(
                    "invalid slot {slot} in order"
                )));
            }
        }
        Ok(Self {
            id: repr.id,
            items: repr.items,
            index,
            order: repr.order,
        })
    }
}

impl From<CharSequence> for SequenceRepr {
    fn from(seq: CharSequence) -> Self {
        Self {
            id: seq.id,
            items: seq.items,
            order: seq.order,
        }
    }
}

impl PartialEq for CharSequence {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.each_item().eq(other.each_item())
    }
}

impl Eq for CharSequence {}

impl CharSequence {
    /// Creates an empty sequence for the field `id`.
    #[must_use]
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            items: Vec::new(),
            index: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// The field identifier.
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// All elements, tombstones included, in document order.
    ///
    /// Each call starts a fresh pass over the current state.
    pub fn each_item(&self) -> impl Iterator<Item = &Item> + Clone + '_ {
        self.order.iter().map(move |&slot| &self.items[slot])
    }

    /// Identifiers of the live elements, in document order.
    pub fn visible_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.each_item().filter(|i| !i.is_deleted()).map(Item::id)
    }

    /// The live characters as a string.
    #[must_use]
    pub fn text(&self) -> String {
        self.each_item()
            .filter(|i| !i.is_deleted())
            .map(Item::value)
            .collect()
    }

    /// Number of live elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.iter().filter(|i| !i.is_deleted()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of elements including tombstones.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.index.get(id).map(|&slot| &self.items[slot])
    }

    /// Whether the element exists, tombstoned or not.
    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn is_tombstoned(&self, id: &ItemId) -> bool {
        self.get(id).is_some_and(Item::is_deleted)
    }

    /// Visible index of a live element.
    #[must_use]
    pub fn index_of(&self, id: &ItemId) -> Option<usize> {
        self.visible_ids().position(|v| v == *id)
    }

    /// Position of an element in document order, tombstones counted.
    fn position(&self, id: &ItemId) -> Option<usize> {
        let slot = *self.index.get(id)?;
        self.order.iter().position(|&s| s == slot)
    }

    /// Builds and applies an insert of `value` immediately before `anchor`,
    /// or at the end when `anchor` is `None`.
    ///
    /// `next_id` is called once the insert is known to be valid and must
    /// return an identifier greater than every one this replica has applied.
    pub fn insert_before_id(
        &mut self,
        anchor: Option<ItemId>,
        value: char,
        next_id: impl FnOnce() -> ItemId,
    ) -> CrdtResult<Operation> {
        let end = match anchor {
            Some(anchor) => self.position(&anchor).ok_or(CrdtError::UnknownItem(anchor))?,
            None => self.order.len(),
        };
        let after = match end.checked_sub(1) {
            Some(prev) => self.items[self.order[prev]].id,
            None => self.id,
        };
        let op = Operation::new(next_id(), self.id, OpPayload::InsertChar { after, value });
        self.apply_operation(&op)?;
        Ok(op)
    }

    /// Builds and applies a delete of up to `count` live elements preceding
    /// `anchor` (the end of the document when `None`), walking backward.
    ///
    /// Returns `None`, without calling `next_id`, if there is nothing to
    /// delete.
    pub fn delete_before_id(
        &mut self,
        anchor: Option<ItemId>,
        count: usize,
        next_id: impl FnOnce() -> ItemId,
    ) -> CrdtResult<Option<Operation>> {
        let end = match anchor {
            Some(anchor) => self.position(&anchor).ok_or(CrdtError::UnknownItem(anchor))?,
            None => self.order.len(),
        };
        let items: Vec<ItemId> = self.order[..end]
            .iter()
            .rev()
            .map(|&slot| &self.items[slot])
            .filter(|i| !i.is_deleted())
            .take(count)
            .map(Item::id)
            .collect();
        self.delete_items(items, next_id)
    }

    /// Builds and applies a delete of up to `count` live elements starting
    /// at `anchor` inclusive, walking forward.
    ///
    /// Returns `None`, without calling `next_id`, if there is nothing to
    /// delete.
    pub fn delete_after_id(
        &mut self,
        anchor: Option<ItemId>,
        count: usize,
        next_id: impl FnOnce() -> ItemId,
    ) -> CrdtResult<Option<Operation>> {
        let Some(anchor) = anchor else {
            return Ok(None);
        };
        let start = self
            .position(&anchor)
            .ok_or(CrdtError::UnknownItem(anchor))?;
        let items: Vec<ItemId> = self.order[start..]
            .iter()
            .map(|&slot| &self.items[slot])
            .filter(|i| !i.is_deleted())
            .take(count)
            .map(Item::id)
            .collect();
        self.delete_items(items, next_id)
    }

    fn delete_items(
        &mut self,
        items: Vec<ItemId>,
        next_id: impl FnOnce() -> ItemId,
    ) -> CrdtResult<Option<Operation>> {
        if items.is_empty() {
            return Ok(None);
        }
        let op = Operation::new(next_id(), self.id, OpPayload::DeleteRange { items });
        self.apply_operation(&op)?;
        Ok(Some(op))
    }

    /// Applies a stamped insert or delete operation from any peer.
    ///
    /// Re-applying an insert whose identifier is already present is a
    /// no-op. An element deleted more than once keeps the greatest delete
    /// identifier, so replicas agree whatever the delivery order. Returns
    /// true if an element was inserted or newly tombstoned.
    pub fn apply_operation(&mut self, op: &Operation) -> CrdtResult<bool> {
        if op.target != self.id {
            return Err(CrdtError::WrongTarget {
                expected: self.id,
                got: op.target,
            });
        }
        let id = op.id.ok_or(CrdtError::Unstamped)?;
        match &op.payload {
            OpPayload::InsertChar { after, value } => self.integrate(id, *after, *value),
            OpPayload::DeleteRange { items } => self.tombstone(id, items),
            OpPayload::MapPut { .. } => Err(wrong_payload("map-put")),
            OpPayload::FieldInit { .. } => Err(wrong_payload("field-init")),
        }
    }

    fn integrate(&mut self, id: ItemId, after: ItemId, value: char) -> CrdtResult<bool> {
        if self.index.contains_key(&id) {
            return Ok(false);
        }
        let mut pos = if after == self.id {
            0
        } else {
            self.position(&after).ok_or(CrdtError::UnknownItem(after))? + 1
        };
        // Skip concurrent siblings (and their descendants) that sort first.
        while pos < self.order.len() && self.items[self.order[pos]].id > id {
            pos += 1;
        }

        let slot = self.items.len();
        self.items.push(Item {
            id,
            value,
            after,
            deleted_by: None,
        });
        self.index.insert(id, slot);
        self.order.insert(pos, slot);
        Ok(true)
    }

    fn tombstone(&mut self, id: ItemId, targets: &[ItemId]) -> CrdtResult<bool> {
        let slots = targets
            .iter()
            .map(|t| self.index.get(t).copied().ok_or(CrdtError::UnknownItem(*t)))
            .collect::<CrdtResult<Vec<_>>>()?;

        let mut changed = false;
        for slot in slots {
            let item = &mut self.items[slot];
            match item.deleted_by {
                None => {
                    item.deleted_by = Some(id);
                    changed = true;
                }
                Some(prev) if id > prev => item.deleted_by = Some(id),
                Some(_) => {}
            }
        }
        Ok(changed)
    }
}

fn wrong_payload(payload: &'static str) -> CrdtError {
    CrdtError::WrongPayload {
        datatype: "character sequence",
        payload,
    }
}

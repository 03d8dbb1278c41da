//! Last-Writer-Wins Register (LWW-Register).
//!
//! A CRDT that stores a single value. Concurrent writes are resolved by
//! comparing the identifiers of the writes: the greatest identifier wins.
//! Identifiers embed the writer's peer ID, so ties cannot occur.

use coedit_types::ItemId;
use serde::{Deserialize, Serialize};

/// A Last-Writer-Wins Register.
///
/// Stores a value of type `T` together with the identifier of the write that
/// set it. Wall-clock time plays no part in conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwRegister<T> {
    /// The current value.
    value: T,
    /// Identifier of the last winning write.
    written_by: ItemId,
}

impl<T> LwwRegister<T> {
    /// Creates a register holding the value of write `written_by`.
    #[must_use]
    pub fn new(value: T, written_by: ItemId) -> Self {
        Self { value, written_by }
    }

    /// Returns a reference to the current value.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns the identifier of the write that set the current value.
    #[must_use]
    pub fn written_by(&self) -> ItemId {
        self.written_by
    }

    /// Applies a write.
    ///
    /// Only takes effect if `id` is greater than the current write's
    /// identifier. Returns true if the value was updated.
    pub fn set(&mut self, value: T, id: ItemId) -> bool {
        if id > self.written_by {
            self.value = value;
            self.written_by = id;
            true
        } else {
            false
        }
    }
}

impl<T: Clone> LwwRegister<T> {
    /// Merges another register into this one.
    ///
    /// Commutative, associative and idempotent.
    pub fn merge(&mut self, other: &Self) {
        if other.written_by > self.written_by {
            self.value = other.value.clone();
            self.written_by = other.written_by;
        }
    }

    /// Creates a new register that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}

//! Operations: the unit of replication.
//!
//! An operation is immutable once created. Local operations carry their
//! identifier from creation; operations arriving from a remote peer travel
//! without one and are stamped from the sender's next logical timestamp when
//! they are first applied.

use crate::{ItemId, PeerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The schema every channel is declared with unless configured otherwise.
pub const DEFAULT_SCHEMA: &str = "coedit/plain-text/v1";

/// Name of the application schema a channel was created with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(String);

impl SchemaId {
    /// Creates a schema ID.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the schema name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SchemaId {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEMA)
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The well-known fields of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentField {
    /// Register map from peer to cursor position.
    Cursors,
    /// Ordered sequence of characters.
    Characters,
}

impl fmt::Display for DocumentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cursors => f.write_str("cursors"),
            Self::Characters => f.write_str("characters"),
        }
    }
}

/// A cursor position: the element the cursor sits before, or `None` at the
/// end of the document.
pub type Cursor = Option<ItemId>;

/// The datatype-specific part of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data")]
pub enum OpPayload {
    /// Insert one character immediately after `after` (the field ID when
    /// inserting at the head of the sequence).
    InsertChar { after: ItemId, value: char },

    /// Tombstone the listed elements.
    DeleteRange { items: Vec<ItemId> },

    /// Set the cursor of `key`.
    MapPut { key: PeerId, value: Cursor },

    /// Establish the well-known identifier of a document field. The
    /// operation's own identifier becomes the field identifier.
    FieldInit { field: DocumentField },
}

/// A single replicated operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Identifier of this operation; absent on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,

    /// The CRDT this operation modifies (a field identifier, or the root
    /// for field initialization).
    pub target: ItemId,

    /// What to do.
    pub payload: OpPayload,
}

impl Operation {
    /// Creates a stamped operation.
    #[must_use]
    pub fn new(id: ItemId, target: ItemId, payload: OpPayload) -> Self {
        Self {
            id: Some(id),
            target,
            payload,
        }
    }

    /// Creates a field initialization operation.
    #[must_use]
    pub fn field_init(id: ItemId, field: DocumentField) -> Self {
        Self::new(id, ItemId::root(), OpPayload::FieldInit { field })
    }

    /// Returns a copy without the identifier, as it is sent on the wire.
    #[must_use]
    pub fn without_id(&self) -> Self {
        Self {
            id: None,
            target: self.target,
            payload: self.payload.clone(),
        }
    }

    /// The field whose CRDT this operation's payload belongs to.
    ///
    /// `None` for field initialization, which targets the root.
    #[must_use]
    pub fn field(&self) -> Option<DocumentField> {
        match self.payload {
            OpPayload::InsertChar { .. } | OpPayload::DeleteRange { .. } => {
                Some(DocumentField::Characters)
            }
            OpPayload::MapPut { .. } => Some(DocumentField::Cursors),
            OpPayload::FieldInit { .. } => None,
        }
    }
}

/// Advertisement of a peer's causal progress.
///
/// Maps each remote peer to the highest logical timestamp of that peer's
/// operations the advertiser has applied. Only entries that changed since
/// the advertiser's previous update are carried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockUpdate {
    pub entries: BTreeMap<PeerId, u64>,
}

impl ClockUpdate {
    /// Creates an empty clock update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry.
    #[must_use]
    pub fn with_entry(mut self, peer_id: PeerId, logical_ts: u64) -> Self {
        self.entries.insert(peer_id, logical_ts);
        self
    }

    /// Returns true if the update carries no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

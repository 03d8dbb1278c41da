//! Messages exchanged between peers on a channel.

use crate::{ClockUpdate, Operation, PeerId, SchemaId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body")]
pub enum MessageEntry {
    /// The sender's causal progress since its previous clock update.
    ClockUpdate(ClockUpdate),
    /// The schema the channel was created with.
    SchemaDeclaration(SchemaId),
    /// A replicated operation.
    Operation(Operation),
}

/// A batch of entries from one sender.
///
/// `sender_seq_no` starts at 1 and is consecutive per sender. `offset` is
/// assigned by the channel when the message is delivered and increases
/// strictly per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: PeerId,
    pub sender_seq_no: u64,
    #[serde(default)]
    pub offset: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub entries: Vec<MessageEntry>,
    /// Codec output for this message, once encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded: Option<Vec<u8>>,
}

impl Message {
    /// Creates an unsent message stamped with the current time.
    #[must_use]
    pub fn new(sender: PeerId, sender_seq_no: u64, entries: Vec<MessageEntry>) -> Self {
        Self {
            sender,
            sender_seq_no,
            offset: None,
            timestamp: Utc::now(),
            entries,
            encoded: None,
        }
    }

    /// Returns the message as delivered by the channel at `offset`.
    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the channel has confirmed delivery of this message.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.offset.is_some()
    }

    /// Iterates over the operations carried by this message.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.entries.iter().filter_map(|entry| match entry {
            MessageEntry::Operation(op) => Some(op),
            _ => None,
        })
    }
}

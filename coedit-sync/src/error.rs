//! Error types for the replication layer.
//!
//! Every variant is fatal for the channel it was raised on. Conditions the
//! protocol expects (buffered dependencies, duplicate deliveries, reordering
//! across senders) are handled without raising an error.

use coedit_crdt::CrdtError;
use coedit_types::{DocumentField, ItemId, PeerId, SchemaId};
use thiserror::Error;

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Errors that can occur while replicating a document.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// The channel delivered a message at an offset not after the last one.
    #[error("non-monotonic channel offset: got {got} after {last}")]
    NonMonotonicOffset { last: u64, got: u64 },

    /// A channel-delivered message skipped sequence numbers, or a message
    /// was marked processed out of order.
    #[error("sequence gap from {peer}: expected {expected}, got {got}")]
    SequenceGap { peer: PeerId, expected: u64, got: u64 },

    /// A message was appended to the log out of sequence.
    #[error("unexpected message sequence number from {peer}: expected {expected}, got {got}")]
    UnexpectedMessageSeq { peer: PeerId, expected: u64, got: u64 },

    /// An operation identifier was applied twice.
    #[error("logical timestamp already applied: {0}")]
    DuplicateTimestamp(ItemId),

    /// An operation could not be routed to a document field.
    #[error("unroutable operation: {0}")]
    UnroutableOperation(String),

    /// A second, distinct schema was declared on the channel.
    #[error("schema conflict: channel uses {existing}, peer declared {offered}")]
    SchemaConflict { existing: SchemaId, offered: SchemaId },

    /// A field was initialized twice with different identifiers.
    #[error("field {field} already initialized as {existing}, got {offered}")]
    FieldConflict {
        field: DocumentField,
        existing: ItemId,
        offered: ItemId,
    },

    /// A remote party knows of more local messages than this replica has.
    #[error("state loss: remote knows local message {remote}, local log ends at {local}")]
    StateLoss { remote: u64, local: u64 },

    /// The document field has not been initialized yet.
    #[error("field not initialized: {0}")]
    NotInitialized(DocumentField),

    /// CRDT error.
    #[error("CRDT error: {0}")]
    Crdt(#[from] CrdtError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

//! Error types for CRDT operation application.

use coedit_types::ItemId;
use thiserror::Error;

/// Result type for CRDT operations.
pub type CrdtResult<T> = Result<T, CrdtError>;

/// Errors raised when an operation cannot be applied to a CRDT.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CrdtError {
    /// The operation references an element this replica has never seen.
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),

    /// The operation targets a different field.
    #[error("operation targets {got}, expected {expected}")]
    WrongTarget { expected: ItemId, got: ItemId },

    /// The payload does not belong to this datatype.
    #[error("payload {payload} cannot be applied to {datatype}")]
    WrongPayload {
        datatype: &'static str,
        payload: &'static str,
    },

    /// The operation was applied before being assigned an identifier.
    #[error("operation has no identifier")]
    Unstamped,

    /// Deserialized state violates a structural invariant.
    #[error("corrupt state: {0}")]
    CorruptState(String),
}

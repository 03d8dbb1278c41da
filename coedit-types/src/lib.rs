//! Core type definitions for coedit.
//!
//! This crate defines the value types shared by the CRDTs and the
//! replication engine:
//! - Peer identifiers (UUID v7) and operation identifiers
//! - Operations and their payloads
//! - Messages exchanged between peers

mod ids;
mod message;
mod operation;

pub use ids::{ItemId, PeerId};
pub use message::{Message, MessageEntry};
pub use operation::{
    ClockUpdate, Cursor, DocumentField, OpPayload, Operation, SchemaId, DEFAULT_SCHEMA,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid item id: {0}")]
    InvalidItemId(String),
}

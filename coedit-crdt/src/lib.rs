//! CRDT implementations for coedit.
//!
//! This crate provides the replicated datatypes a document is made of:
//!
//! - [`CharSequence`]: Replicated Growable Array of characters (the text)
//! - [`RegisterMap<K, V>`]: one [`LwwRegister<V>`] per key (the cursors)
//!
//! Both are operation-based: local edits build an [`Operation`] and apply it
//! through the same `apply_operation` entry point used for remote
//! operations. Given the same set of operations, delivered in any order that
//! respects causality, every replica reaches the same state.
//!
//! [`Operation`]: coedit_types::Operation

mod error;
mod lww_register;
mod register_map;
mod sequence;

pub use error::{CrdtError, CrdtResult};
pub use lww_register::LwwRegister;
pub use register_map::{CursorMap, RegisterMap};
pub use sequence::{CharSequence, Item};

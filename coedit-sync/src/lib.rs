//! Causal replication engine for coedit.
//!
//! Peers exchange [`Message`]s over a channel that may drop, duplicate or
//! reorder them. Each peer applies remote operations to its replica only
//! once their causal dependencies have been applied, so every replica that
//! has received the same operations holds the same document.
//!
//! # Architecture
//!
//! - **Tracker**: Lamport clock, per-peer watermarks and advertised
//!   dependencies
//! - **Log**: every message sent or received, for confirmation and replay
//! - **Codec**: turns messages into bytes for the channel
//! - **Peer**: the orchestrator tying these to the document CRDTs
//!
//! ## Message flow
//!
//! 1. **Edit**: a local edit is applied and its operation buffered
//! 2. **Send**: buffered operations become the next sequenced message
//! 3. **Deliver**: the channel assigns an offset and delivers to everyone
//! 4. **Buffer**: received entries wait in a per-sender buffer
//! 5. **Drain**: entries are applied while their sender is causally ready
//!
//! # Example
//!
//! ```
//! use coedit_sync::{Peer, PeerConfig};
//! use coedit_types::PeerId;
//!
//! let mut alice = Peer::create_channel(PeerId::new(), PeerConfig::default()).unwrap();
//! let mut bob = Peer::join_channel(PeerId::new(), PeerConfig::default());
//!
//! alice.insert_before_id(None, 'h').unwrap();
//! alice.insert_before_id(None, 'i').unwrap();
//! for message in alice.messages_to_send().unwrap() {
//!     bob.process_message(message).unwrap();
//! }
//! assert_eq!(bob.text(), "hi");
//! ```
//!
//! [`Message`]: coedit_types::Message

pub mod codec;
mod error;
mod log;
mod peer;
mod tracker;

pub use codec::{JsonCodec, MessageCodec, MAX_MESSAGE_SIZE};
pub use error::{ReplicationError, ReplicationResult};
pub use log::MessageLog;
pub use peer::{Peer, PeerConfig, PeerSnapshot};
pub use tracker::{DependencyTracker, PeerProgress};

//! Identifier types used throughout the coedit core.
//!
//! - [`PeerId`] names a device (UUID v7, fixed length, globally unique).
//! - [`ItemId`] names an operation and the element it created. It pairs a
//!   Lamport-style logical timestamp with the originating peer and is
//!   totally ordered.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a peer (device) in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(Uuid);

impl PeerId {
    /// Creates a new peer ID using UUIDv7 (time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a peer ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parses a peer ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PeerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Causally-consistent identifier of an operation.
///
/// Ordered by logical timestamp first, then by peer ID. A peer never issues
/// two identifiers with the same logical timestamp, so identifiers are
/// globally unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId {
    logical_ts: u64,
    peer_id: PeerId,
}

impl ItemId {
    /// Creates an identifier from its parts.
    #[must_use]
    pub const fn new(logical_ts: u64, peer_id: PeerId) -> Self {
        Self {
            logical_ts,
            peer_id,
        }
    }

    /// The root identifier. Sorts below every identifier a peer can issue.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            logical_ts: 0,
            peer_id: PeerId::from_uuid(Uuid::nil()),
        }
    }

    /// Returns true if this is the root identifier.
    #[must_use]
    pub fn is_root(&self) -> bool {
        *self == Self::root()
    }

    /// The logical timestamp component.
    #[must_use]
    pub const fn logical_ts(&self) -> u64 {
        self.logical_ts
    }

    /// The peer that issued this identifier.
    #[must_use]
    pub const fn peer_id(&self) -> PeerId {
        self.peer_id
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.logical_ts.cmp(&other.logical_ts) {
            Ordering::Equal => self.peer_id.cmp(&other.peer_id),
            ord => ord,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.logical_ts, self.peer_id)
    }
}

impl FromStr for ItemId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ts, peer) = s
            .split_once('@')
            .ok_or_else(|| Error::InvalidItemId(s.to_string()))?;
        let logical_ts: u64 = ts
            .parse()
            .map_err(|_| Error::InvalidItemId(s.to_string()))?;
        let peer_id = PeerId::parse(peer)?;
        Ok(Self::new(logical_ts, peer_id))
    }
}

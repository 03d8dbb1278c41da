//! Dependency tracking.
//!
//! The tracker holds the local Lamport clock and, for every remote peer,
//! how far this replica has applied that peer's operations. Peers do not
//! attach a vector clock to every operation. Instead each peer occasionally
//! advertises a [`ClockUpdate`] listing, for every other peer whose
//! operations it has applied since its last advertisement, the highest
//! logical timestamp applied. A receiver applies a sender's operations only
//! once everything the sender advertised has been applied locally.
//!
//! Advertised dependencies also let a receiver predict the logical
//! timestamp of the sender's next operation, which is how operations are
//! stamped on arrival without carrying their identifier on the wire.

use crate::{ReplicationError, ReplicationResult};
use coedit_types::{ClockUpdate, ItemId, PeerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// What this replica knows about one remote peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerProgress {
    /// Highest logical timestamp of the peer's operations applied locally.
    pub applied_ts: u64,
    /// Logical timestamp predicted for the peer's next operation.
    pub next_ts: u64,
    /// Union of everything the peer has advertised in clock updates.
    pub dependencies: BTreeMap<PeerId, u64>,
    /// Highest contiguous message sequence number processed from the peer.
    pub processed_seq: u64,
}

/// Per-peer logical clock and message sequence bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyTracker {
    local_peer_id: PeerId,
    /// Local Lamport clock: the highest logical timestamp issued or applied.
    clock: u64,
    peers: BTreeMap<PeerId, PeerProgress>,
    /// Watermarks included in the last clock update sent by this replica.
    advertised: BTreeMap<PeerId, u64>,
    /// Number of messages sent by this replica.
    sent_messages: u64,
}

impl DependencyTracker {
    /// Creates a tracker for a replica that has applied nothing.
    #[must_use]
    pub fn new(local_peer_id: PeerId) -> Self {
        Self {
            local_peer_id,
            clock: 0,
            peers: BTreeMap::new(),
            advertised: BTreeMap::new(),
            sent_messages: 0,
        }
    }

    #[must_use]
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// The local Lamport clock.
    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Progress recorded for a remote peer.
    #[must_use]
    pub fn progress(&self, peer_id: &PeerId) -> Option<&PeerProgress> {
        self.peers.get(peer_id)
    }

    /// Highest logical timestamp applied from `peer_id`.
    #[must_use]
    pub fn applied_ts(&self, peer_id: &PeerId) -> u64 {
        self.peers.get(peer_id).map_or(0, |p| p.applied_ts)
    }

    /// Highest contiguous message sequence number processed from `peer_id`.
    #[must_use]
    pub fn processed_seq(&self, peer_id: &PeerId) -> u64 {
        self.peers.get(peer_id).map_or(0, |p| p.processed_seq)
    }

    /// Number of messages this replica has sent.
    #[must_use]
    pub fn sent_messages(&self) -> u64 {
        self.sent_messages
    }

    /// Returns the logical timestamp for the next operation created by
    /// `peer_id` and moves past it.
    ///
    /// For the local peer this is the Lamport clock plus one. For a remote
    /// peer it is the timestamp predicted from its applied operations and
    /// advertised dependencies.
    pub fn next_logical_timestamp(&mut self, peer_id: PeerId) -> u64 {
        if peer_id == self.local_peer_id {
            self.clock += 1;
            return self.clock;
        }
        let progress = self.peers.entry(peer_id).or_default();
        let ts = progress.next_ts.max(progress.applied_ts + 1);
        progress.next_ts = ts + 1;
        ts
    }

    /// Records that the operation `id` has been applied.
    ///
    /// Advances the creator's watermark and the local clock. Applying a
    /// timestamp at or below the creator's watermark is an error.
    pub fn seen_logical_timestamp(&mut self, id: ItemId) -> ReplicationResult<()> {
        let ts = id.logical_ts();
        let progress = self.peers.entry(id.peer_id()).or_default();
        if ts <= progress.applied_ts {
            return Err(ReplicationError::DuplicateTimestamp(id));
        }
        progress.applied_ts = ts;
        progress.next_ts = progress.next_ts.max(ts + 1);
        self.clock = self.clock.max(ts);
        Ok(())
    }

    /// Whether remote progress has changed since the last clock update.
    #[must_use]
    pub fn has_clock_update(&self) -> bool {
        self.changed_watermarks().next().is_some()
    }

    /// Builds a clock update with every watermark that changed since the
    /// previous one and marks them advertised.
    ///
    /// Returns `None` if nothing changed.
    pub fn make_clock_update(&mut self) -> Option<ClockUpdate> {
        let entries: BTreeMap<PeerId, u64> = self.changed_watermarks().collect();
        if entries.is_empty() {
            return None;
        }
        self.advertised
            .extend(entries.iter().map(|(peer, ts)| (*peer, *ts)));
        Some(ClockUpdate { entries })
    }

    fn changed_watermarks(&self) -> impl Iterator<Item = (PeerId, u64)> + '_ {
        self.peers
            .iter()
            .filter(|(peer, progress)| {
                **peer != self.local_peer_id
                    && progress.applied_ts > 0
                    && self.advertised.get(peer) != Some(&progress.applied_ts)
            })
            .map(|(peer, progress)| (*peer, progress.applied_ts))
    }

    /// Merges a clock update advertised by `peer_id`.
    ///
    /// The sender's next operation is predicted to follow both its own last
    /// applied operation and everything it advertised.
    pub fn apply_clock_update(&mut self, peer_id: PeerId, update: &ClockUpdate) {
        let progress = self.peers.entry(peer_id).or_default();
        for (dep, ts) in &update.entries {
            let entry = progress.dependencies.entry(*dep).or_insert(0);
            *entry = (*entry).max(*ts);
        }
        let max_dep = progress.dependencies.values().copied().max().unwrap_or(0);
        progress.next_ts = progress.applied_ts.max(max_dep) + 1;
        debug!(
            peer = %peer_id,
            next_ts = progress.next_ts,
            "applied clock update"
        );
    }

    /// Whether every dependency advertised by `peer_id` has been applied.
    ///
    /// Dependencies on the local peer are always satisfied.
    #[must_use]
    pub fn causally_ready(&self, peer_id: &PeerId) -> bool {
        let Some(progress) = self.peers.get(peer_id) else {
            return true;
        };
        progress
            .dependencies
            .iter()
            .filter(|(dep, _)| **dep != self.local_peer_id)
            .all(|(dep, ts)| self.applied_ts(dep) >= *ts)
    }

    /// Records that message `seq_no` from `peer_id` has been fully applied.
    ///
    /// Messages must be processed in consecutive order.
    pub fn processed_incoming_msg(&mut self, peer_id: PeerId, seq_no: u64) -> ReplicationResult<()> {
        let progress = self.peers.entry(peer_id).or_default();
        let expected = progress.processed_seq + 1;
        if seq_no != expected {
            return Err(ReplicationError::SequenceGap {
                peer: peer_id,
                expected,
                got: seq_no,
            });
        }
        progress.processed_seq = seq_no;
        Ok(())
    }

    /// Allocates the sequence number for the next outgoing message.
    pub fn increment_sent_messages(&mut self) -> u64 {
        self.sent_messages += 1;
        self.sent_messages
    }
}

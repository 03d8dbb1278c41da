//! Replication orchestrator.
//!
//! A [`Peer`] is one participant's replica of a document. It owns the
//! dependency tracker, both document CRDTs and the message log. It is a pure
//! state machine: callers feed it local edits and channel-delivered messages
//! and collect the messages it wants sent.

use crate::codec::MessageCodec;
use crate::{DependencyTracker, MessageLog, ReplicationError, ReplicationResult};
use coedit_crdt::{CharSequence, CrdtError, CursorMap, Item};
use coedit_types::{
    Cursor, DocumentField, ItemId, Message, MessageEntry, OpPayload, Operation, PeerId, SchemaId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, warn};

/// Configuration for a peer.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Schema the channel is created with, or expected to have when joining.
    pub schema: SchemaId,
    /// Device name for identification.
    pub device_name: String,
    /// Whether the channel has a secret key. The key itself lives in the
    /// codec.
    pub has_secret_key: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            schema: SchemaId::default(),
            device_name: "coedit peer".to_string(),
            has_secret_key: false,
        }
    }
}

/// An entry waiting in a sender's receive buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Pending {
    Entry(MessageEntry),
    /// Every entry of message `seq` has been drained.
    MessageProcessed(u64),
}

/// Persistable state of a [`Peer`].
///
/// Restoring a snapshot yields a peer that behaves as if the session had
/// never stopped, except that unconfirmed local messages are queued for
/// sending again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSnapshot {
    peer_id: PeerId,
    tracker: DependencyTracker,
    schema: Option<SchemaId>,
    fields: BTreeMap<DocumentField, ItemId>,
    sequence: Option<CharSequence>,
    cursors: Option<CursorMap>,
    outgoing: Vec<MessageEntry>,
    incoming: BTreeMap<PeerId, VecDeque<Pending>>,
    held: BTreeMap<PeerId, BTreeMap<u64, Message>>,
    log: MessageLog,
    last_offset: Option<u64>,
}

impl PeerSnapshot {
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Serializes the snapshot to JSON.
    pub fn to_json(&self) -> ReplicationResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserializes a snapshot from JSON.
    pub fn from_json(json: &str) -> ReplicationResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A replica of a collaboratively edited document.
#[derive(Debug)]
pub struct Peer {
    peer_id: PeerId,
    config: PeerConfig,
    tracker: DependencyTracker,
    /// Schema declared on the channel, once known.
    schema: Option<SchemaId>,
    /// Well-known field identifiers.
    fields: BTreeMap<DocumentField, ItemId>,
    sequence: Option<CharSequence>,
    cursors: Option<CursorMap>,
    /// Entries for the next outgoing message.
    outgoing: Vec<MessageEntry>,
    /// Per-sender receive buffers.
    incoming: BTreeMap<PeerId, VecDeque<Pending>>,
    /// Messages that arrived ahead of their predecessors, by sequence number.
    held: BTreeMap<PeerId, BTreeMap<u64, Message>>,
    log: MessageLog,
    /// Local messages logged but not yet handed out for sending.
    pending_send: Vec<u64>,
    last_offset: Option<u64>,
}

impl Peer {
    fn empty(peer_id: PeerId, config: PeerConfig) -> Self {
        Self {
            peer_id,
            config,
            tracker: DependencyTracker::new(peer_id),
            schema: None,
            fields: BTreeMap::new(),
            sequence: None,
            cursors: None,
            outgoing: Vec::new(),
            incoming: BTreeMap::new(),
            held: BTreeMap::new(),
            log: MessageLog::new(),
            pending_send: Vec::new(),
            last_offset: None,
        }
    }

    /// Creates a new channel.
    ///
    /// Queues the schema declaration and the initialization of both document
    /// fields, so they go out in the first message.
    pub fn create_channel(peer_id: PeerId, config: PeerConfig) -> ReplicationResult<Self> {
        let mut peer = Self::empty(peer_id, config);
        let schema = peer.config.schema.clone();
        peer.schema = Some(schema.clone());
        peer.outgoing.push(MessageEntry::SchemaDeclaration(schema));

        for field in [DocumentField::Cursors, DocumentField::Characters] {
            let op = Operation::field_init(peer.next_id(), field);
            peer.route(&op)?;
            peer.send_operation(&op);
        }
        info!(peer = %peer_id, schema = %peer.config.schema, "created channel");
        Ok(peer)
    }

    /// Creates an empty replica of an existing channel.
    ///
    /// The document fields become available once the creator's bootstrap
    /// message has been processed.
    #[must_use]
    pub fn join_channel(peer_id: PeerId, config: PeerConfig) -> Self {
        info!(peer = %peer_id, "joining channel");
        Self::empty(peer_id, config)
    }

    /// Restores a peer from a snapshot.
    ///
    /// Local messages the channel never confirmed are queued for sending.
    #[must_use]
    pub fn restore(snapshot: PeerSnapshot, config: PeerConfig) -> Self {
        let PeerSnapshot {
            peer_id,
            tracker,
            schema,
            fields,
            sequence,
            cursors,
            outgoing,
            incoming,
            held,
            log,
            last_offset,
        } = snapshot;
        let pending_send: Vec<u64> = log.unconfirmed(&peer_id).map(|m| m.sender_seq_no).collect();
        info!(
            peer = %peer_id,
            requeued = pending_send.len(),
            "restored peer"
        );
        Self {
            peer_id,
            config,
            tracker,
            schema,
            fields,
            sequence,
            cursors,
            outgoing,
            incoming,
            held,
            log,
            pending_send,
            last_offset,
        }
    }

    /// Captures the complete state of this peer.
    #[must_use]
    pub fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            peer_id: self.peer_id,
            tracker: self.tracker.clone(),
            schema: self.schema.clone(),
            fields: self.fields.clone(),
            sequence: self.sequence.clone(),
            cursors: self.cursors.clone(),
            outgoing: self.outgoing.clone(),
            incoming: self.incoming.clone(),
            held: self.held.clone(),
            log: self.log.clone(),
            last_offset: self.last_offset,
        }
    }

    /// Ends the session: flushes buffered operations into a message and
    /// returns everything pending together with the final snapshot.
    pub fn shutdown(mut self) -> ReplicationResult<(Vec<Message>, PeerSnapshot)> {
        let messages = self.messages_to_send()?;
        info!(peer = %self.peer_id, pending = messages.len(), "shutting down");
        Ok((messages, self.snapshot()))
    }

    // ── Accessors ────────────────────────────────────────────────

    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    #[must_use]
    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.config.device_name
    }

    #[must_use]
    pub fn has_secret_key(&self) -> bool {
        self.config.has_secret_key
    }

    /// The schema declared on the channel, once known.
    #[must_use]
    pub fn schema(&self) -> Option<&SchemaId> {
        self.schema.as_ref()
    }

    /// Identifier of a well-known field, once initialized.
    #[must_use]
    pub fn field_id(&self, field: DocumentField) -> Option<ItemId> {
        self.fields.get(&field).copied()
    }

    #[must_use]
    pub fn tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    #[must_use]
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Offset of the last message delivered by the channel.
    #[must_use]
    pub fn last_offset(&self) -> Option<u64> {
        self.last_offset
    }

    #[must_use]
    pub fn sequence(&self) -> Option<&CharSequence> {
        self.sequence.as_ref()
    }

    #[must_use]
    pub fn cursors(&self) -> Option<&CursorMap> {
        self.cursors.as_ref()
    }

    /// The document text.
    #[must_use]
    pub fn text(&self) -> String {
        self.sequence
            .as_ref()
            .map(CharSequence::text)
            .unwrap_or_default()
    }

    /// All elements, tombstones included, in document order.
    pub fn each_item(&self) -> impl Iterator<Item = &Item> + Clone + '_ {
        self.sequence.iter().flat_map(CharSequence::each_item)
    }

    /// Whether received entries or messages are still waiting on
    /// dependencies.
    #[must_use]
    pub fn has_buffered_input(&self) -> bool {
        self.incoming.values().any(|buffer| !buffer.is_empty())
            || self.held.values().any(|held| !held.is_empty())
    }

    // ── Document editing ─────────────────────────────────────────

    /// Inserts `value` before `anchor`, or at the end of the document.
    pub fn insert_before_id(
        &mut self,
        anchor: Option<ItemId>,
        value: char,
    ) -> ReplicationResult<ItemId> {
        let tracker = &mut self.tracker;
        let sequence = self
            .sequence
            .as_mut()
            .ok_or(ReplicationError::NotInitialized(DocumentField::Characters))?;
        let op = sequence.insert_before_id(anchor, value, || stamp(tracker))?;
        let id = op.id.ok_or(CrdtError::Unstamped)?;
        self.send_operation(&op);
        Ok(id)
    }

    /// Deletes up to `count` characters before `anchor` (the end of the
    /// document when `None`).
    ///
    /// Returns the last character deleted, the furthest from `anchor`.
    pub fn delete_before_id(
        &mut self,
        anchor: Option<ItemId>,
        count: usize,
    ) -> ReplicationResult<Option<ItemId>> {
        let tracker = &mut self.tracker;
        let sequence = self
            .sequence
            .as_mut()
            .ok_or(ReplicationError::NotInitialized(DocumentField::Characters))?;
        let Some(op) = sequence.delete_before_id(anchor, count, || stamp(tracker))? else {
            return Ok(None);
        };
        self.send_operation(&op);
        Ok(last_deleted(&op))
    }

    /// Deletes up to `count` characters starting at `anchor`.
    ///
    /// Returns the last character deleted.
    pub fn delete_after_id(
        &mut self,
        anchor: Option<ItemId>,
        count: usize,
    ) -> ReplicationResult<Option<ItemId>> {
        let tracker = &mut self.tracker;
        let sequence = self
            .sequence
            .as_mut()
            .ok_or(ReplicationError::NotInitialized(DocumentField::Characters))?;
        let Some(op) = sequence.delete_after_id(anchor, count, || stamp(tracker))? else {
            return Ok(None);
        };
        self.send_operation(&op);
        Ok(last_deleted(&op))
    }

    /// Moves the local cursor. Returns the identifier of the write.
    pub fn set_cursor(&mut self, value: Cursor) -> ReplicationResult<ItemId> {
        let peer_id = self.peer_id;
        let tracker = &mut self.tracker;
        let cursors = self
            .cursors
            .as_mut()
            .ok_or(ReplicationError::NotInitialized(DocumentField::Cursors))?;
        let op = cursors.put(peer_id, value, || stamp(tracker))?;
        let id = op.id.ok_or(CrdtError::Unstamped)?;
        self.send_operation(&op);
        Ok(id)
    }

    /// The local cursor.
    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.cursor_of(&self.peer_id)
    }

    /// The cursor published by `peer_id`.
    #[must_use]
    pub fn cursor_of(&self, peer_id: &PeerId) -> Cursor {
        self.cursors
            .as_ref()
            .and_then(|cursors| cursors.get(peer_id).copied())
            .flatten()
    }

    // ── Sending ──────────────────────────────────────────────────

    /// Allocates the identifier for a new local operation.
    pub fn next_id(&mut self) -> ItemId {
        stamp(&mut self.tracker)
    }

    /// Buffers a local operation for the next message, preceded by a clock
    /// update if remote progress changed since the last one.
    pub fn send_operation(&mut self, op: &Operation) {
        if let Some(update) = self.tracker.make_clock_update() {
            self.outgoing.push(MessageEntry::ClockUpdate(update));
        }
        self.outgoing.push(MessageEntry::Operation(op.without_id()));
    }

    /// Turns the buffered entries into a message with the next sequence
    /// number. Returns `None` if nothing is buffered.
    pub fn make_message(&mut self) -> Option<Message> {
        if self.outgoing.is_empty() {
            return None;
        }
        let seq_no = self.tracker.increment_sent_messages();
        let entries = std::mem::take(&mut self.outgoing);
        Some(Message::new(self.peer_id, seq_no, entries))
    }

    /// Returns every message waiting to be sent, logging a new one first if
    /// operations are buffered.
    ///
    /// The returned messages stay unconfirmed in the log until the channel
    /// echoes them back with an offset.
    pub fn messages_to_send(&mut self) -> ReplicationResult<Vec<Message>> {
        if let Some(message) = self.make_message() {
            let seq_no = message.sender_seq_no;
            self.log.append(message)?;
            self.pending_send.push(seq_no);
            debug!(seq = seq_no, "queued message");
        }
        let pending = std::mem::take(&mut self.pending_send);
        Ok(pending
            .into_iter()
            .filter_map(|seq_no| self.log.get(&self.peer_id, seq_no).cloned())
            .collect())
    }

    /// Encodes outgoing messages in place and keeps the bytes in the log.
    pub fn encode_outgoing(
        &mut self,
        codec: &impl MessageCodec,
        messages: &mut [Message],
    ) -> ReplicationResult<()> {
        for message in messages {
            let encoded = codec.encode(message)?;
            self.log
                .set_encoded(&message.sender, message.sender_seq_no, encoded.clone());
            message.encoded = Some(encoded);
        }
        Ok(())
    }

    /// Local messages after `last_known`, for a remote party that has seen
    /// up to `last_known`.
    ///
    /// Fails with `StateLoss` if `last_known` is beyond the local log.
    pub fn replay_after(&self, last_known: u64) -> ReplicationResult<Vec<Message>> {
        let local = self.log.last_seq(&self.peer_id);
        if last_known > local {
            warn!(remote = last_known, local, "remote is ahead of the local log");
            return Err(ReplicationError::StateLoss {
                remote: last_known,
                local,
            });
        }
        let messages: Vec<Message> = self
            .log
            .from_sender(&self.peer_id)
            .filter(|m| m.sender_seq_no > last_known)
            .cloned()
            .collect();
        info!(after = last_known, count = messages.len(), "replaying messages");
        Ok(messages)
    }

    // ── Receiving ────────────────────────────────────────────────

    /// Processes a message delivered by the channel.
    ///
    /// Offset and sequence checks happen before any state changes. Messages
    /// without an offset that arrive ahead of their predecessors are held
    /// until the gap is filled.
    pub fn process_message(&mut self, message: Message) -> ReplicationResult<()> {
        if let (Some(last), Some(got)) = (self.last_offset, message.offset) {
            if got <= last {
                warn!(last, got, "non-monotonic channel offset");
                return Err(ReplicationError::NonMonotonicOffset { last, got });
            }
        }
        if message.sender == self.peer_id {
            return self.confirm_own(&message);
        }

        let sender = message.sender;
        let seq_no = message.sender_seq_no;
        let expected = self.log.last_seq(&sender) + 1;
        let already_held = self
            .held
            .get(&sender)
            .is_some_and(|held| held.contains_key(&seq_no));
        if seq_no < expected || already_held {
            debug!(peer = %sender, seq = seq_no, "ignoring duplicate message");
            self.record_offset(message.offset);
            return Ok(());
        }
        if seq_no > expected {
            if message.offset.is_some() {
                warn!(peer = %sender, expected, got = seq_no, "sequence gap");
                return Err(ReplicationError::SequenceGap {
                    peer: sender,
                    expected,
                    got: seq_no,
                });
            }
            debug!(peer = %sender, seq = seq_no, expected, "holding early message");
            self.held.entry(sender).or_default().insert(seq_no, message);
            return Ok(());
        }

        self.record_offset(message.offset);
        self.accept(message)?;
        while let Some(next) = self.take_held(&sender) {
            self.accept(next)?;
        }
        self.drain()
    }

    fn record_offset(&mut self, offset: Option<u64>) {
        if offset.is_some() {
            self.last_offset = offset;
        }
    }

    fn confirm_own(&mut self, message: &Message) -> ReplicationResult<()> {
        let seq_no = message.sender_seq_no;
        let local = self.log.last_seq(&self.peer_id);
        if seq_no > local {
            warn!(seq = seq_no, local, "channel echoed a message this peer never logged");
            return Err(ReplicationError::StateLoss {
                remote: seq_no,
                local,
            });
        }
        if let Some(offset) = message.offset {
            self.log.confirm(&self.peer_id, seq_no, offset);
            self.last_offset = Some(offset);
        }
        self.pending_send.retain(|&pending| pending != seq_no);
        debug!(seq = seq_no, offset = ?message.offset, "confirmed own message");
        Ok(())
    }

    /// Logs a message and queues its entries for draining.
    fn accept(&mut self, message: Message) -> ReplicationResult<()> {
        let sender = message.sender;
        let seq_no = message.sender_seq_no;
        let entries = message.entries.clone();
        self.log.append(message)?;

        let buffer = self.incoming.entry(sender).or_default();
        buffer.extend(entries.into_iter().map(Pending::Entry));
        buffer.push_back(Pending::MessageProcessed(seq_no));
        Ok(())
    }

    fn take_held(&mut self, sender: &PeerId) -> Option<Message> {
        let next = self.log.last_seq(sender) + 1;
        self.held.get_mut(sender)?.remove(&next)
    }

    /// Applies buffered entries until no sender with buffered entries is
    /// causally ready.
    fn drain(&mut self) -> ReplicationResult<()> {
        while let Some(sender) = self.next_ready_sender() {
            self.drain_sender(sender)?;
        }
        Ok(())
    }

    fn next_ready_sender(&self) -> Option<PeerId> {
        self.incoming
            .iter()
            .find(|(peer, buffer)| !buffer.is_empty() && self.tracker.causally_ready(peer))
            .map(|(peer, _)| *peer)
    }

    /// Pops entries from one sender's buffer until it is empty or a clock
    /// update has been applied.
    fn drain_sender(&mut self, sender: PeerId) -> ReplicationResult<()> {
        while let Some(pending) = self.incoming.get_mut(&sender).and_then(VecDeque::pop_front) {
            match pending {
                Pending::Entry(MessageEntry::ClockUpdate(update)) => {
                    self.tracker.apply_clock_update(sender, &update);
                    return Ok(());
                }
                Pending::Entry(MessageEntry::SchemaDeclaration(schema)) => {
                    self.declare_schema(schema)?;
                }
                Pending::Entry(MessageEntry::Operation(op)) => {
                    self.apply_remote(sender, op)?;
                }
                Pending::MessageProcessed(seq_no) => {
                    self.tracker.processed_incoming_msg(sender, seq_no)?;
                }
            }
        }
        Ok(())
    }

    fn declare_schema(&mut self, offered: SchemaId) -> ReplicationResult<()> {
        let existing = self.schema.as_ref().unwrap_or(&self.config.schema);
        if *existing != offered {
            warn!(existing = %existing, offered = %offered, "schema conflict");
            return Err(ReplicationError::SchemaConflict {
                existing: existing.clone(),
                offered,
            });
        }
        self.schema = Some(offered);
        Ok(())
    }

    /// Stamps a remote operation if needed, records it and routes it.
    fn apply_remote(&mut self, sender: PeerId, mut op: Operation) -> ReplicationResult<()> {
        let id = match op.id {
            Some(id) => id,
            None => {
                let id = ItemId::new(self.tracker.next_logical_timestamp(sender), sender);
                op.id = Some(id);
                id
            }
        };
        if id.peer_id() != sender {
            warn!(peer = %sender, id = %id, "operation relayed by another peer");
            return Err(ReplicationError::UnroutableOperation(format!(
                "operation {id} sent by {sender}"
            )));
        }
        self.tracker.seen_logical_timestamp(id)?;
        debug!(peer = %sender, id = %id, "applying remote operation");
        self.route(&op)
    }

    /// Applies a stamped operation to the structure its payload belongs to.
    fn route(&mut self, op: &Operation) -> ReplicationResult<()> {
        let id = op.id.ok_or(CrdtError::Unstamped)?;
        match &op.payload {
            OpPayload::FieldInit { field } => {
                if !op.target.is_root() {
                    return Err(unroutable(op));
                }
                self.init_field(*field, id)
            }
            OpPayload::InsertChar { .. } | OpPayload::DeleteRange { .. } => {
                let sequence = self
                    .sequence
                    .as_mut()
                    .filter(|sequence| sequence.id() == op.target)
                    .ok_or_else(|| unroutable(op))?;
                sequence.apply_operation(op)?;
                Ok(())
            }
            OpPayload::MapPut { .. } => {
                let cursors = self
                    .cursors
                    .as_mut()
                    .filter(|cursors| cursors.id() == op.target)
                    .ok_or_else(|| unroutable(op))?;
                cursors.apply_operation(op)?;
                Ok(())
            }
        }
    }

    fn init_field(&mut self, field: DocumentField, id: ItemId) -> ReplicationResult<()> {
        match self.fields.get(&field) {
            Some(existing) if *existing == id => return Ok(()),
            Some(existing) => {
                warn!(%field, existing = %existing, offered = %id, "field initialized twice");
                return Err(ReplicationError::FieldConflict {
                    field,
                    existing: *existing,
                    offered: id,
                });
            }
            None => {}
        }
        self.fields.insert(field, id);
        match field {
            DocumentField::Cursors => self.cursors = Some(CursorMap::new(id)),
            DocumentField::Characters => self.sequence = Some(CharSequence::new(id)),
        }
        debug!(%field, id = %id, "initialized field");
        Ok(())
    }
}

/// Allocates the next local identifier from `tracker`.
fn stamp(tracker: &mut DependencyTracker) -> ItemId {
    let peer_id = tracker.local_peer_id();
    ItemId::new(tracker.next_logical_timestamp(peer_id), peer_id)
}

fn last_deleted(op: &Operation) -> Option<ItemId> {
    match &op.payload {
        OpPayload::DeleteRange { items } => items.last().copied(),
        _ => None,
    }
}

fn unroutable(op: &Operation) -> ReplicationError {
    ReplicationError::UnroutableOperation(format!("{:?} targeting {}", op.payload, op.target))
}

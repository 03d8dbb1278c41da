//! Message log.
//!
//! Retains every message sent or received on the channel, in the order this
//! replica logged them, with a per-sender index for replay.

use crate::{ReplicationError, ReplicationResult};
use coedit_types::{Message, PeerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Chronological log of messages with a per-sender index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageLog {
    messages: Vec<Message>,
    /// Positions in `messages`, per sender, in sequence order.
    by_sender: BTreeMap<PeerId, Vec<usize>>,
}

impl MessageLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message. Its sequence number must directly follow the last
    /// one logged for its sender.
    pub fn append(&mut self, message: Message) -> ReplicationResult<()> {
        let expected = self.last_seq(&message.sender) + 1;
        if message.sender_seq_no != expected {
            return Err(ReplicationError::UnexpectedMessageSeq {
                peer: message.sender,
                expected,
                got: message.sender_seq_no,
            });
        }
        self.by_sender
            .entry(message.sender)
            .or_default()
            .push(self.messages.len());
        self.messages.push(message);
        Ok(())
    }

    /// Sequence number of the last message logged from `sender`, or 0.
    #[must_use]
    pub fn last_seq(&self, sender: &PeerId) -> u64 {
        self.by_sender
            .get(sender)
            .and_then(|positions| positions.last())
            .map_or(0, |&pos| self.messages[pos].sender_seq_no)
    }

    /// Returns message `seq_no` from `sender`.
    #[must_use]
    pub fn get(&self, sender: &PeerId, seq_no: u64) -> Option<&Message> {
        let index = usize::try_from(seq_no.checked_sub(1)?).ok()?;
        let pos = *self.by_sender.get(sender)?.get(index)?;
        Some(&self.messages[pos])
    }

    fn get_mut(&mut self, sender: &PeerId, seq_no: u64) -> Option<&mut Message> {
        let index = usize::try_from(seq_no.checked_sub(1)?).ok()?;
        let pos = *self.by_sender.get(sender)?.get(index)?;
        Some(&mut self.messages[pos])
    }

    /// Messages from `sender`, in sequence order.
    pub fn from_sender(&self, sender: &PeerId) -> impl Iterator<Item = &Message> + '_ {
        self.by_sender
            .get(sender)
            .into_iter()
            .flatten()
            .map(|&pos| &self.messages[pos])
    }

    /// All messages, in the order they were logged.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages from `sender` the channel has not confirmed.
    pub fn unconfirmed(&self, sender: &PeerId) -> impl Iterator<Item = &Message> + '_ {
        self.from_sender(sender).filter(|m| !m.is_confirmed())
    }

    /// Records the channel offset of message `seq_no` from `sender`.
    ///
    /// Returns false if no such message is logged.
    pub fn confirm(&mut self, sender: &PeerId, seq_no: u64, offset: u64) -> bool {
        match self.get_mut(sender, seq_no) {
            Some(message) => {
                message.offset = Some(offset);
                true
            }
            None => false,
        }
    }

    /// Stores codec output for message `seq_no` from `sender`.
    pub fn set_encoded(&mut self, sender: &PeerId, seq_no: u64, encoded: Vec<u8>) -> bool {
        match self.get_mut(sender, seq_no) {
            Some(message) => {
                message.encoded = Some(encoded);
                true
            }
            None => false,
        }
    }
}

//! Message codecs.
//!
//! A codec turns a [`Message`] into the bytes handed to the channel and
//! back. Codecs that encrypt hold their own channel key; the replication
//! layer never inspects the bytes.

use crate::{ReplicationError, ReplicationResult};
use coedit_types::Message;

/// Maximum encoded message size (16 MB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Converts messages to and from bytes.
pub trait MessageCodec {
    /// Encodes a message. Any `encoded` bytes already on it are ignored.
    fn encode(&self, message: &Message) -> ReplicationResult<Vec<u8>>;

    /// Decodes a message. The result carries `bytes` as its `encoded` field.
    fn decode(&self, bytes: &[u8]) -> ReplicationResult<Message>;
}

/// Plain JSON codec without encryption.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode(&self, message: &Message) -> ReplicationResult<Vec<u8>> {
        let plain = Message {
            encoded: None,
            ..message.clone()
        };
        let data = serde_json::to_vec(&plain)?;
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(ReplicationError::Codec(format!(
                "message too large: {} bytes",
                data.len()
            )));
        }
        Ok(data)
    }

    fn decode(&self, bytes: &[u8]) -> ReplicationResult<Message> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(ReplicationError::Codec(format!(
                "message too large: {} bytes",
                bytes.len()
            )));
        }
        let mut message: Message = serde_json::from_slice(bytes)?;
        message.encoded = Some(bytes.to_vec());
        Ok(message)
    }
}

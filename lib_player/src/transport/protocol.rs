//! # Wire Protocol
//!
//! Control messages travel as JSON text frames tagged by `op`. Message data
//! travels as binary frames:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 1 | opcode (`0x01`) |
//! | 1 | 4 | subscription id, little endian |
//! | 5 | 8 | receive timestamp in ns, little endian |
//! | 13 | .. | payload |

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::transport::TransportEvent;
use crate::types::{Channel, ChannelId, SubscriptionId};

pub const OPCODE_MESSAGE_DATA: u8 = 0x01;
const MESSAGE_DATA_HEADER_LEN: usize = 1 + 4 + 8;

/// Server -> client control messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    ServerInfo {
        name: String,
        #[serde(default)]
        capabilities: Vec<String>,
    },
    Status {
        level: u8,
        message: String,
    },
    Advertise {
        channels: Vec<Channel>,
    },
    Unadvertise {
        channel_ids: Vec<ChannelId>,
    },
    /// Any op this client does not act on.
    #[serde(other)]
    Unsupported,
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// `None` for ops the player has no use for.
    pub fn into_event(self) -> Option<TransportEvent> {
        match self {
            ServerMessage::ServerInfo { name, capabilities } => {
                Some(TransportEvent::ServerInfo { name, capabilities })
            }
            ServerMessage::Status { level, message } => Some(TransportEvent::Status { level, message }),
            ServerMessage::Advertise { channels } => Some(TransportEvent::Advertise(channels)),
            ServerMessage::Unadvertise { channel_ids } => Some(TransportEvent::Unadvertise(channel_ids)),
            ServerMessage::Unsupported => None,
        }
    }
}

/// Client -> server control messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Subscribe { subscriptions: Vec<SubscriptionRequest> },
    Unsubscribe { subscription_ids: Vec<SubscriptionId> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub id: SubscriptionId,
    pub channel_id: ChannelId,
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Parses a binary frame into a `Message` event. The payload is a zero-copy
/// slice of `frame`.
pub fn parse_binary(frame: Bytes) -> Result<TransportEvent, ProtocolError> {
    let opcode = *frame.first().ok_or(ProtocolError::EmptyFrame)?;
    if opcode != OPCODE_MESSAGE_DATA {
        return Err(ProtocolError::UnknownOpcode(opcode));
    }
    if frame.len() < MESSAGE_DATA_HEADER_LEN {
        return Err(ProtocolError::ShortFrame {
            expected: MESSAGE_DATA_HEADER_LEN,
            actual: frame.len(),
        });
    }

    let mut subscription_id = [0u8; 4];
    subscription_id.copy_from_slice(&frame[1..5]);
    let mut timestamp = [0u8; 8];
    timestamp.copy_from_slice(&frame[5..13]);

    Ok(TransportEvent::Message {
        subscription_id: u32::from_le_bytes(subscription_id),
        timestamp: u64::from_le_bytes(timestamp),
        data: frame.slice(MESSAGE_DATA_HEADER_LEN..),
    })
}

/// Builds a binary message-data frame. The inverse of [`parse_binary`].
pub fn encode_message_data(subscription_id: SubscriptionId, timestamp: u64, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(MESSAGE_DATA_HEADER_LEN + payload.len());
    frame.push(OPCODE_MESSAGE_DATA);
    frame.extend_from_slice(&subscription_id.to_le_bytes());
    frame.extend_from_slice(&timestamp.to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

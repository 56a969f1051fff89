//! # Player Data Model
//!
//! Plain data shared by the registry, the subscription manager, the emitter
//! and the transport. Everything the consumer receives is `Serialize` with
//! camelCase field names so a snapshot can be forwarded as JSON unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::problems::PlayerProblem;
use crate::schema::Datatypes;

/// Server-assigned channel identifier.
pub type ChannelId = u32;
/// Client-assigned subscription identifier, unique per connection.
pub type SubscriptionId = u32;

/// A data stream advertised by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: ChannelId,
    pub topic: String,
    pub encoding: String,
    pub schema_name: String,
    /// Base64 encoded binary schema descriptor.
    pub schema: String,
}

/// A point on the timeline with nanosecond resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Time {
    pub sec: u32,
    pub nsec: u32,
}

impl Time {
    const NANOS_PER_SEC: u64 = 1_000_000_000;

    pub fn new(sec: u32, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    /// Splits a nanosecond timestamp into seconds and nanoseconds.
    ///
    /// Seconds saturate at `u32::MAX`.
    pub fn from_nanos(nanos: u64) -> Self {
        let sec = u32::try_from(nanos / Self::NANOS_PER_SEC).unwrap_or(u32::MAX);
        let nsec = (nanos % Self::NANOS_PER_SEC) as u32;
        Self { sec, nsec }
    }
}

/// A topic as exported to the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub name: String,
    pub schema_name: String,
}

/// A decoded message waiting for the next emission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub topic: String,
    pub schema_name: String,
    pub receive_time: Time,
    pub message: serde_json::Value,
    pub size_in_bytes: usize,
}

/// Connection presence as seen by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerPresence {
    NotPresent,
    Initializing,
    Present,
    Reconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerCapability {
    Advertise,
}

/// The full state handed to the listener on every emission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub presence: PlayerPresence,
    pub name: String,
    pub player_id: String,
    pub capabilities: Vec<PlayerCapability>,
    pub problems: BTreeMap<String, PlayerProblem>,
    /// Absent until the server has advertised channels at least once.
    pub active_data: Option<PlayerStateActiveData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStateActiveData {
    /// Messages received since the previous emission.
    pub messages: Vec<MessageEvent>,
    pub total_bytes_received: u64,
    pub start_time: Time,
    pub current_time: Time,
    pub end_time: Time,
    pub is_playing: bool,
    pub speed: f64,
    /// Seek generation. Bumped whenever the current time moves backwards.
    pub last_seek_time: u64,
    pub topics: Vec<Topic>,
    pub datatypes: Datatypes,
}

/// A topic the consumer would like to publish on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertiseOptions {
    pub topic: String,
    pub schema_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishPayload {
    pub topic: String,
    pub msg: serde_json::Value,
}

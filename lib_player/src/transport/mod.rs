//! # Transport
//!
//! The seam between the player and the socket. The player never touches a
//! WebSocket directly: it asks a [`Connector`] for a connection and receives
//! everything the server says as [`TransportEvent`]s through an [`EventSink`].
//! The [`Transport`] handle it gets back is the only way to talk to the server.
//!
//! ## Contained Modules:
//! - **`protocol`**: JSON control messages and the binary message-data frame.
//! - **`ws`**: [`WsConnector`], the `tokio-tungstenite` implementation.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::types::{Channel, ChannelId, SubscriptionId};

/// Wire format of the control and data messages.
pub mod protocol;
/// The WebSocket connector built on `tokio-tungstenite`.
pub mod ws;

pub use ws::{WsConnector, SUBPROTOCOL};

/// Everything a connection can report to the player.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Error(String),
    Close { code: Option<u16>, reason: String },
    ServerInfo { name: String, capabilities: Vec<String> },
    Status { level: u8, message: String },
    Advertise(Vec<Channel>),
    Unadvertise(Vec<ChannelId>),
    Message {
        subscription_id: SubscriptionId,
        /// Receive timestamp in nanoseconds.
        timestamp: u64,
        data: Bytes,
    },
}

/// A live connection handle, owned exclusively by the player.
pub trait Transport: Send {
    /// Requests messages for a channel and returns the id they will carry.
    fn subscribe(&mut self, channel_id: ChannelId) -> SubscriptionId;

    fn unsubscribe(&mut self, subscription_id: SubscriptionId);

    /// Closes the connection. Must be safe to call more than once.
    fn close(&mut self);
}

/// Opens connections.
///
/// `connect` returns immediately; the outcome is reported later through the
/// sink as `Open` or `Error` followed by `Close`.
pub trait Connector: Send + Sync {
    fn connect(&self, url: &str, sink: EventSink) -> Box<dyn Transport>;
}

/// Delivers transport events to the player, tagged with the epoch of the
/// connection they belong to. Events from a superseded epoch are ignored.
#[derive(Debug, Clone)]
pub struct EventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl EventSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns `false` once the player has gone away.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx.send((self.epoch, event)).is_ok()
    }
}

//! # lib_player
//!
//! A live WebSocket player. It keeps a connection to a remote publisher of
//! typed binary messages, tracks the channels the server advertises, resolves
//! the topics the consumer wants into wire-level subscriptions, decodes
//! protobuf payloads with schemas supplied at runtime and hands a coalesced
//! state snapshot to a single listener.
//!
//! The entry point is [`WebSocketPlayer`].

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Error types shared across the crate.
pub mod error;
/// Hook for recording player metrics.
pub mod metrics;
/// The coordinator task and the public player handle.
pub mod player;
/// Keyed diagnostics surfaced to the consumer.
pub mod problems;
/// Advertised channels indexed by id and topic.
pub mod registry;
/// Protobuf schema resolution and dynamic decoding.
pub mod schema;
/// The coalescing state emitter.
pub mod emitter;
/// Desired topics and their wire-level subscriptions.
pub mod subscriptions;
/// Transport traits, events and the tungstenite implementation.
pub mod transport;
/// Data model shared by all modules.
pub mod types;

// --- Public API Re-exports ---
pub use error::{PlayerError, ProtocolError, SchemaError};
pub use metrics::{NoopMetricsCollector, PlayerMetricsCollector};
pub use player::{PlayerListener, PlayerOptions, WebSocketPlayer, RECONNECT_DELAY};
pub use problems::{PlayerProblem, ProblemSet, Severity};
pub use schema::{resolve, Datatypes, MessageDefinition, MessageDefinitionField, ParsedChannel};
pub use transport::{Connector, EventSink, Transport, TransportEvent, WsConnector};
pub use types::{
    AdvertiseOptions, Channel, ChannelId, MessageEvent, PlayerCapability, PlayerPresence,
    PlayerState, PlayerStateActiveData, PublishPayload, SubscriptionId, Time, Topic,
};

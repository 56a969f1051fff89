//! # Player
//!
//! [`WebSocketPlayer`] is the handle the consumer holds. Every call on it is
//! forwarded as a command to a single coordinator task, which owns the
//! connection, the channel registry, the subscriptions, the problems and the
//! emitter. Calls never block and never wait for the network.
//!
//! ## Contained Modules:
//! - **`coordinator`**: the task that reacts to commands, transport events,
//!   the reconnect timer and delivery completions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::PlayerError;
use crate::metrics::PlayerMetricsCollector;
use crate::transport::{Connector, WsConnector};
use crate::types::{AdvertiseOptions, PublishPayload};

mod coordinator;

pub use crate::emitter::PlayerListener;

/// Delay between a connection closing and the next attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerOptions {
    /// WebSocket address of the server.
    pub url: String,
    /// Fixed delay before every reconnection attempt. There is no backoff.
    pub reconnect_delay: Duration,
}

impl PlayerOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.reconnect_delay = reconnect_delay;
        self
    }
}

/// Requests from the handle to the coordinator.
pub(crate) enum Command {
    SetListener(Arc<dyn PlayerListener>),
    SetSubscriptions(Vec<String>),
    Close,
}

/// A live player connected to one server address.
///
/// Must be created inside a Tokio runtime. Dropping the handle closes the
/// player.
pub struct WebSocketPlayer {
    player_id: String,
    url: String,
    commands: mpsc::UnboundedSender<Command>,
    closed: Arc<AtomicBool>,
}

impl WebSocketPlayer {
    /// Connects to `url` over WebSocket and starts reconnecting whenever the
    /// connection drops.
    pub fn new(url: impl Into<String>, metrics: Arc<dyn PlayerMetricsCollector>) -> Self {
        Self::with_connector(PlayerOptions::new(url), metrics, Arc::new(WsConnector::new()))
    }

    /// Builds a player on top of any [`Connector`].
    pub fn with_connector(
        options: PlayerOptions,
        metrics: Arc<dyn PlayerMetricsCollector>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let player_id = uuid::Uuid::new_v4().to_string();
        let closed = Arc::new(AtomicBool::new(false));
        let (commands, command_rx) = mpsc::unbounded_channel();

        log::info!("Starting player {} for {}", player_id, options.url);
        metrics.player_constructed();

        let url = options.url.clone();
        let coordinator = coordinator::Coordinator::new(
            options,
            player_id.clone(),
            connector,
            metrics,
            Arc::clone(&closed),
        );
        tokio::spawn(coordinator.run(command_rx));

        Self {
            player_id,
            url,
            commands,
            closed,
        }
    }

    /// Stable identifier of this player instance.
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Registers the listener that receives every snapshot. Replaces any
    /// previous listener and triggers an emission.
    pub fn set_listener<L>(&self, listener: L)
    where
        L: PlayerListener,
    {
        self.send(Command::SetListener(Arc::new(listener)));
    }

    /// Replaces the set of topics the consumer wants.
    pub fn set_subscriptions<I, S>(&self, topics: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let topics = topics.into_iter().map(Into::into).collect();
        self.send(Command::SetSubscriptions(topics));
    }

    /// A live connection has no history to backfill from.
    pub fn request_backfill(&self) {}

    /// Global variables do not affect a live connection.
    pub fn set_global_variables(&self, _variables: &HashMap<String, serde_json::Value>) {}

    /// Only an empty publisher list is accepted.
    pub fn set_publishers(&self, publishers: &[AdvertiseOptions]) -> Result<(), PlayerError> {
        if publishers.is_empty() {
            Ok(())
        } else {
            Err(PlayerError::Unsupported("Publishing"))
        }
    }

    pub fn set_parameter(&self, _key: &str, _value: serde_json::Value) -> Result<(), PlayerError> {
        Err(PlayerError::Unsupported("Parameter editing"))
    }

    pub fn publish(&self, _payload: PublishPayload) -> Result<(), PlayerError> {
        Err(PlayerError::Unsupported("Publishing"))
    }

    /// Closes the player for good. Safe to call more than once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("Closing player {}", self.player_id);
        self.send(Command::Close);
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::debug!("Player {} has already stopped", self.player_id);
        }
    }
}

impl Drop for WebSocketPlayer {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for WebSocketPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketPlayer")
            .field("player_id", &self.player_id)
            .field("url", &self.url)
            .field("closed", &self.is_closed())
            .finish()
    }
}

//! The single task that owns all player state.
//!
//! Each command, transport event, timer expiry and delivery completion is
//! handled to completion before the next one is looked at, so nothing here
//! needs a lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::emitter::{SnapshotContext, StateEmitter};
use crate::error::PlayerError;
use crate::metrics::PlayerMetricsCollector;
use crate::player::{Command, PlayerOptions};
use crate::problems::{PlayerProblem, ProblemSet};
use crate::registry::ChannelRegistry;
use crate::subscriptions::SubscriptionManager;
use crate::transport::{Connector, EventSink, Transport, TransportEvent};
use crate::types::{MessageEvent, PlayerCapability, PlayerPresence, SubscriptionId, Time};

const CAPABILITIES: &[PlayerCapability] = &[PlayerCapability::Advertise];
const CONNECTION_PROBLEM: &str = "connection-failed";

pub(crate) struct Coordinator {
    options: PlayerOptions,
    player_id: String,
    name: String,
    presence: PlayerPresence,
    connector: Arc<dyn Connector>,
    metrics: Arc<dyn PlayerMetricsCollector>,
    closed: Arc<AtomicBool>,

    /// The current connection, from `connect` until its `Close` event.
    transport: Option<Box<dyn Transport>>,
    /// Incremented on every connection attempt; events carry the epoch of
    /// the attempt that produced them.
    epoch: u64,
    events_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    events_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    reconnect_at: Option<Instant>,

    registry: ChannelRegistry,
    subscriptions: SubscriptionManager,
    problems: ProblemSet,
    emitter: StateEmitter,
    delivered_tx: mpsc::UnboundedSender<()>,
    delivered_rx: mpsc::UnboundedReceiver<()>,
}

impl Coordinator {
    pub(crate) fn new(
        options: PlayerOptions,
        player_id: String,
        connector: Arc<dyn Connector>,
        metrics: Arc<dyn PlayerMetricsCollector>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (delivered_tx, delivered_rx) = mpsc::unbounded_channel();
        Self {
            name: options.url.clone(),
            options,
            player_id,
            presence: PlayerPresence::Initializing,
            connector,
            metrics,
            closed,
            transport: None,
            epoch: 0,
            events_tx,
            events_rx,
            reconnect_at: None,
            registry: ChannelRegistry::new(),
            subscriptions: SubscriptionManager::new(),
            problems: ProblemSet::new(),
            emitter: StateEmitter::new(),
            delivered_tx,
            delivered_rx,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.connect();

        loop {
            let reconnect_at = self.reconnect_at;
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(Command::SetListener(listener)) => {
                            self.emitter.set_listener(listener);
                            self.emit();
                        }
                        Some(Command::SetSubscriptions(topics)) => self.set_subscriptions(topics),
                        // Explicit close, or every handle is gone
                        Some(Command::Close) | None => break,
                    }
                }
                Some((epoch, event)) = self.events_rx.recv() => self.handle_event(epoch, event),
                Some(()) = self.delivered_rx.recv() => {
                    if self.emitter.complete() {
                        self.emit();
                    }
                }
                _ = sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    if !self.is_closed() {
                        self.connect();
                    }
                }
            }
        }

        self.shutdown();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn connect(&mut self) {
        self.epoch += 1;
        log::info!("Connecting to {} (attempt {})", self.options.url, self.epoch);
        let sink = EventSink::new(self.epoch, self.events_tx.clone());
        self.transport = Some(self.connector.connect(&self.options.url, sink));
    }

    fn shutdown(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.reconnect_at = None;
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.metrics.close();
        log::info!("Player {} stopped", self.player_id);
    }

    fn set_subscriptions(&mut self, topics: Vec<String>) {
        log::debug!("Desired topics: {:?}", topics);
        let transport = match (&mut self.transport, self.presence) {
            (Some(transport), PlayerPresence::Present) => Some(transport.as_mut() as &mut dyn Transport),
            _ => None,
        };
        self.subscriptions.set_desired(topics, transport);
        self.resolve_subscriptions();
    }

    /// Binds unresolved topics. Only a connection that has opened can carry
    /// subscriptions.
    fn resolve_subscriptions(&mut self) {
        let transport = match (&mut self.transport, self.presence) {
            (Some(transport), PlayerPresence::Present) => Some(transport.as_mut() as &mut dyn Transport),
            _ => None,
        };
        let issued = self.subscriptions.resolve_pending(&self.registry, transport);
        if issued > 0 {
            log::debug!("Resolved {} subscription(s)", issued);
        }
    }

    fn handle_event(&mut self, epoch: u64, event: TransportEvent) {
        if self.is_closed() {
            return;
        }
        if epoch != self.epoch || self.transport.is_none() {
            log::debug!("Ignoring event from superseded connection {}: {:?}", epoch, event);
            return;
        }

        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Error(error) => {
                log::warn!("Connection error on {}: {}", self.options.url, error);
            }
            TransportEvent::Close { code, reason } => self.on_close(code, reason),
            TransportEvent::ServerInfo { name, capabilities } => {
                log::info!("Server {} (capabilities: {:?})", name, capabilities);
                self.name = format!("{}\n{}", self.options.url, name);
                self.emit();
            }
            TransportEvent::Status { level, message } => match level {
                0 => log::info!("Server status: {}", message),
                1 => log::warn!("Server status: {}", message),
                _ => log::error!("Server status: {}", message),
            },
            TransportEvent::Advertise(channels) => {
                log::debug!("Server advertised {} channel(s)", channels.len());
                self.registry.advertise(channels, &mut self.problems);
                self.resolve_subscriptions();
                self.emit();
            }
            TransportEvent::Unadvertise(ids) => {
                log::debug!("Server unadvertised channel(s) {:?}", ids);
                let removed = self.registry.unadvertise(ids, &mut self.problems);
                self.subscriptions.on_channels_removed(&removed);
                self.resolve_subscriptions();
                self.emit();
            }
            TransportEvent::Message {
                subscription_id,
                timestamp,
                data,
            } => {
                if let Err(e) = self.on_message(subscription_id, timestamp, data) {
                    log::error!("{}", e);
                }
            }
        }
    }

    fn on_open(&mut self) {
        log::info!("Connected to {}", self.options.url);
        self.presence = PlayerPresence::Present;
        self.problems.clear();
        self.registry.clear();
        self.metrics.connected();
        self.resolve_subscriptions();
        self.emit();
    }

    fn on_close(&mut self, code: Option<u16>, reason: String) {
        log::warn!(
            "Connection to {} closed (code {:?}): {}",
            self.options.url,
            code,
            reason
        );
        self.transport = None;
        if self.presence == PlayerPresence::Present {
            self.metrics.disconnected();
        }
        self.presence = PlayerPresence::Reconnecting;
        self.subscriptions.on_disconnect();

        let mut problem = PlayerProblem::error(format!("Connection to {} failed", self.options.url))
            .with_tip(format!(
                "Check that a WebSocket server speaking {} is running at {}.",
                crate::transport::SUBPROTOCOL,
                self.options.url
            ));
        if !reason.is_empty() {
            problem.error = Some(reason);
        }
        self.problems.add(CONNECTION_PROBLEM, problem);
        self.emit();

        if self.reconnect_at.is_none() {
            log::info!(
                "Reconnecting to {} in {:?}",
                self.options.url,
                self.options.reconnect_delay
            );
            self.reconnect_at = Some(Instant::now() + self.options.reconnect_delay);
        }
    }

    /// Decodes one message. A decode failure is recorded as a problem and
    /// returned; the connection stays up.
    fn on_message(&mut self, subscription_id: SubscriptionId, timestamp: u64, data: Bytes) -> Result<(), PlayerError> {
        let Some(subscription) = self.subscriptions.route(subscription_id) else {
            log::warn!("Dropping message for unknown subscription {}", subscription_id);
            return Ok(());
        };
        let topic = subscription.topic.clone();
        let channel = Arc::clone(&subscription.channel);

        match channel.decode(&data) {
            Ok(message) => {
                self.metrics.record_bytes_received(data.len());
                self.emitter.push(MessageEvent {
                    topic,
                    schema_name: channel.channel.schema_name.clone(),
                    receive_time: Time::from_nanos(timestamp),
                    message,
                    size_in_bytes: data.len(),
                });
                self.emit();
                Ok(())
            }
            Err(source) => {
                self.problems.add(
                    format!("message:{}", topic),
                    PlayerProblem::error(format!("Failed to decode message on {}", topic)).with_cause(&source),
                );
                self.emit();
                Err(PlayerError::Decode { topic, source })
            }
        }
    }

    /// Starts a delivery, or marks one as due if a delivery is in flight.
    fn emit(&mut self) {
        if self.is_closed() {
            return;
        }
        let Some(listener) = self.emitter.begin() else {
            return;
        };

        let state = self.emitter.build(SnapshotContext {
            presence: self.presence,
            name: &self.name,
            player_id: &self.player_id,
            capabilities: CAPABILITIES,
            problems: self.problems.snapshot(),
            topics: self.registry.topics(),
            datatypes: self.registry.datatypes(),
        });

        let delivered = self.delivered_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::spawn(listener.on_state(state)).await {
                log::error!("Listener failed: {}", e);
            }
            let _ = delivered.send(());
        });
    }
}

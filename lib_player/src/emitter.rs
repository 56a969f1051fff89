//! # State Emitter
//!
//! Accumulates decoded messages between emissions, maintains the timeline
//! and gates delivery to the single listener.
//!
//! ## Coalescing
//! At most one delivery is in flight. A trigger that arrives while a
//! delivery is outstanding only marks the emitter dirty; when the delivery
//! completes, a dirty emitter produces exactly one follow-up delivery
//! carrying everything accumulated in the meantime. Deliveries never queue
//! deeper than that one slot.
//!
//! ## Timeline
//! The current time is the receive time of the newest queued message, or the
//! previous current time when nothing arrived. The start time latches on the
//! first observed time. A current time earlier than the previous one bumps
//! the seek generation, which never resets.

use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use crate::problems::PlayerProblem;
use crate::schema::Datatypes;
use crate::types::{
    MessageEvent, PlayerCapability, PlayerPresence, PlayerState, PlayerStateActiveData, Time, Topic,
};

/// Receives every snapshot. The returned future may take as long as it
/// likes; the next delivery waits for it.
pub trait PlayerListener: Send + Sync + 'static {
    fn on_state(&self, state: PlayerState) -> BoxFuture<'static, ()>;
}

impl<F, Fut> PlayerListener for F
where
    F: Fn(PlayerState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn on_state(&self, state: PlayerState) -> BoxFuture<'static, ()> {
        Box::pin(self(state))
    }
}

/// The parts of a snapshot owned by the coordinator rather than the emitter.
#[derive(Debug, Clone)]
pub struct SnapshotContext<'a> {
    pub presence: PlayerPresence,
    pub name: &'a str,
    pub player_id: &'a str,
    pub capabilities: &'a [PlayerCapability],
    pub problems: BTreeMap<String, PlayerProblem>,
    pub topics: Option<&'a [Topic]>,
    pub datatypes: Option<&'a Datatypes>,
}

#[derive(Default)]
pub struct StateEmitter {
    listener: Option<Arc<dyn PlayerListener>>,
    queue: Vec<MessageEvent>,
    total_bytes_received: u64,
    start_time: Option<Time>,
    current_time: Option<Time>,
    seek_generation: u64,
    in_flight: bool,
    dirty: bool,
}

impl StateEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listener(&mut self, listener: Arc<dyn PlayerListener>) {
        self.listener = Some(listener);
    }

    /// Queues a decoded message for the next emission.
    pub fn push(&mut self, event: MessageEvent) {
        self.total_bytes_received += event.size_in_bytes as u64;
        self.queue.push(event);
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Claims the delivery slot.
    ///
    /// Returns the listener when a delivery should start now. Returns `None`
    /// when there is no listener, or when a delivery is already in flight, in
    /// which case a follow-up is recorded instead.
    pub fn begin(&mut self) -> Option<Arc<dyn PlayerListener>> {
        let listener = self.listener.clone()?;
        if self.in_flight {
            self.dirty = true;
            return None;
        }
        self.in_flight = true;
        Some(listener)
    }

    /// Releases the delivery slot. Returns `true` if triggers arrived while
    /// the delivery was in flight and a follow-up is due.
    pub fn complete(&mut self) -> bool {
        self.in_flight = false;
        std::mem::take(&mut self.dirty)
    }

    /// Builds the snapshot for a delivery, draining the message queue.
    pub fn build(&mut self, context: SnapshotContext<'_>) -> PlayerState {
        let active_data = match (context.topics, context.datatypes) {
            (Some(topics), Some(datatypes)) => Some(self.active_data(topics, datatypes)),
            _ => None,
        };

        PlayerState {
            presence: context.presence,
            name: context.name.to_string(),
            player_id: context.player_id.to_string(),
            capabilities: context.capabilities.to_vec(),
            problems: context.problems,
            active_data,
        }
    }

    fn active_data(&mut self, topics: &[Topic], datatypes: &Datatypes) -> PlayerStateActiveData {
        let messages = std::mem::take(&mut self.queue);
        let current_time = self.advance_time(messages.last().map(|m| m.receive_time));

        PlayerStateActiveData {
            messages,
            total_bytes_received: self.total_bytes_received,
            start_time: self.start_time.unwrap_or_default(),
            current_time,
            end_time: current_time,
            is_playing: true,
            speed: 1.0,
            last_seek_time: self.seek_generation,
            topics: topics.to_vec(),
            datatypes: datatypes.clone(),
        }
    }

    fn advance_time(&mut self, latest: Option<Time>) -> Time {
        let Some(now) = latest.or(self.current_time) else {
            return Time::default();
        };

        if self.start_time.is_none() {
            self.start_time = Some(now);
        }
        if let Some(previous) = self.current_time {
            if now < previous {
                log::info!(
                    "Time went backwards ({:?} -> {:?}), bumping seek generation",
                    previous,
                    now
                );
                self.seek_generation += 1;
            }
        }
        self.current_time = Some(now);
        now
    }
}

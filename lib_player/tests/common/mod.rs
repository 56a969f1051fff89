#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use lib_player::{
    Channel, ChannelId, Connector, EventSink, PlayerListener, PlayerMetricsCollector, PlayerState,
    SubscriptionId, Transport,
};
use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, Value};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet};
use tokio::sync::mpsc;

pub const URL: &str = "ws://127.0.0.1:8765";

// --- Schemas ---

fn double_field(name: &str, number: i32) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(Type::Double as i32),
        ..Default::default()
    }
}

/// `package test; message Point { double x = 1; double y = 2; }`
pub fn descriptor_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![FileDescriptorProto {
            name: Some("point.proto".to_string()),
            package: Some("test".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Point".to_string()),
                field: vec![double_field("x", 1), double_field("y", 2)],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

pub fn channel(id: ChannelId, topic: &str) -> Channel {
    Channel {
        id,
        topic: topic.to_string(),
        encoding: "protobuf".to_string(),
        schema_name: "test.Point".to_string(),
        schema: general_purpose::STANDARD.encode(descriptor_set().encode_to_vec()),
    }
}

pub fn point_bytes(x: f64, y: f64) -> Vec<u8> {
    let pool = DescriptorPool::from_file_descriptor_set(descriptor_set()).unwrap();
    let mut point = DynamicMessage::new(pool.get_message_by_name("test.Point").unwrap());
    point.set_field_by_name("x", Value::F64(x));
    point.set_field_by_name("y", Value::F64(y));
    point.encode_to_vec()
}

// --- Fake transport ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Subscribe {
        epoch: u64,
        channel_id: ChannelId,
        subscription_id: SubscriptionId,
    },
    Unsubscribe {
        epoch: u64,
        subscription_id: SubscriptionId,
    },
    Close {
        epoch: u64,
    },
}

#[derive(Default)]
struct Recorded {
    sinks: Vec<EventSink>,
    calls: Vec<Call>,
}

/// Hands out transports that record every call and keeps the event sink of
/// every connection attempt so tests can play the server.
#[derive(Clone, Default)]
pub struct FakeConnector {
    recorded: Arc<Mutex<Recorded>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.recorded.lock().unwrap().sinks.len()
    }

    /// Sink of the `n`th connection attempt, counting from 1.
    pub fn sink(&self, n: usize) -> EventSink {
        self.recorded.lock().unwrap().sinks[n - 1].clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.recorded.lock().unwrap().calls.clone()
    }

    pub fn subscribed_channels(&self, epoch: u64) -> Vec<ChannelId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Subscribe {
                    epoch: e, channel_id, ..
                } if e == epoch => Some(channel_id),
                _ => None,
            })
            .collect()
    }

    /// Waits until at least `n` connection attempts were made.
    pub async fn wait_for_attempts(&self, n: usize) {
        for _ in 0..1000 {
            if self.attempts() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} connection attempts, saw {}", n, self.attempts());
    }
}

impl Connector for FakeConnector {
    fn connect(&self, _url: &str, sink: EventSink) -> Box<dyn Transport> {
        let epoch = sink.epoch();
        self.recorded.lock().unwrap().sinks.push(sink);
        Box::new(FakeTransport {
            epoch,
            next_id: 0,
            recorded: Arc::clone(&self.recorded),
        })
    }
}

struct FakeTransport {
    epoch: u64,
    next_id: SubscriptionId,
    recorded: Arc<Mutex<Recorded>>,
}

impl Transport for FakeTransport {
    fn subscribe(&mut self, channel_id: ChannelId) -> SubscriptionId {
        let subscription_id = self.next_id;
        self.next_id += 1;
        self.recorded.lock().unwrap().calls.push(Call::Subscribe {
            epoch: self.epoch,
            channel_id,
            subscription_id,
        });
        subscription_id
    }

    fn unsubscribe(&mut self, subscription_id: SubscriptionId) {
        self.recorded.lock().unwrap().calls.push(Call::Unsubscribe {
            epoch: self.epoch,
            subscription_id,
        });
    }

    fn close(&mut self) {
        self.recorded
            .lock()
            .unwrap()
            .calls
            .push(Call::Close { epoch: self.epoch });
    }
}

// --- Metrics ---

#[derive(Debug, Default)]
pub struct CountingMetrics {
    pub constructed: AtomicUsize,
    pub connected: AtomicUsize,
    pub disconnected: AtomicUsize,
    pub bytes: AtomicUsize,
    pub closed: AtomicUsize,
}

impl PlayerMetricsCollector for CountingMetrics {
    fn player_constructed(&self) {
        self.constructed.fetch_add(1, Ordering::SeqCst);
    }

    fn connected(&self) {
        self.connected.fetch_add(1, Ordering::SeqCst);
    }

    fn disconnected(&self) {
        self.disconnected.fetch_add(1, Ordering::SeqCst);
    }

    fn record_bytes_received(&self, bytes: usize) {
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// --- Listeners ---

/// A listener that forwards every snapshot to a channel.
pub fn collector() -> (impl PlayerListener, mpsc::UnboundedReceiver<PlayerState>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = move |state: PlayerState| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(state);
        }
    };
    (listener, rx)
}

/// Receives snapshots until one matches.
pub async fn wait_for<F>(states: &mut mpsc::UnboundedReceiver<PlayerState>, predicate: F) -> PlayerState
where
    F: Fn(&PlayerState) -> bool,
{
    loop {
        let state = tokio::time::timeout(Duration::from_secs(10), states.recv())
            .await
            .expect("timed out waiting for a matching state")
            .expect("listener channel closed");
        if predicate(&state) {
            return state;
        }
    }
}

pub fn topic_names(state: &PlayerState) -> Vec<String> {
    state
        .active_data
        .as_ref()
        .map(|data| data.topics.iter().map(|t| t.name.clone()).collect())
        .unwrap_or_default()
}

pub fn message_count(state: &PlayerState) -> usize {
    state.active_data.as_ref().map_or(0, |data| data.messages.len())
}

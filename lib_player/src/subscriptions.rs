//! # Subscription Manager
//!
//! Reconciles the topics the consumer wants with the channels the server
//! offers. Every wanted topic is in exactly one of two places:
//!
//! - **unresolved**: wanted, but no matching channel is registered yet, or
//!   there is no live connection to subscribe on;
//! - **resolved**: bound to a wire-level subscription id and the channel it
//!   was issued for. Resolved subscriptions are indexed by topic and by id so
//!   incoming messages can be routed back to their topic and decoder.
//!
//! Unresolved topics wait indefinitely; there is no timeout.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::registry::ChannelRegistry;
use crate::schema::ParsedChannel;
use crate::transport::Transport;
use crate::types::{ChannelId, SubscriptionId};

#[derive(Debug, Clone)]
pub struct ResolvedSubscription {
    pub topic: String,
    pub subscription_id: SubscriptionId,
    pub channel: Arc<ParsedChannel>,
}

#[derive(Debug, Default)]
pub struct SubscriptionManager {
    unresolved: BTreeSet<String>,
    by_topic: HashMap<String, SubscriptionId>,
    by_id: HashMap<SubscriptionId, ResolvedSubscription>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the wanted topic set.
    ///
    /// Resolved topics that are no longer wanted are unsubscribed on the wire
    /// when a transport is available. Call [`resolve_pending`] afterwards to
    /// bind the newly wanted topics.
    ///
    /// [`resolve_pending`]: SubscriptionManager::resolve_pending
    pub fn set_desired<I>(&mut self, topics: I, mut transport: Option<&mut dyn Transport>)
    where
        I: IntoIterator<Item = String>,
    {
        let desired: BTreeSet<String> = topics.into_iter().collect();

        let dropped: Vec<String> = self
            .by_topic
            .keys()
            .filter(|topic| !desired.contains(*topic))
            .cloned()
            .collect();
        for topic in dropped {
            if let Some(subscription_id) = self.by_topic.remove(&topic) {
                self.by_id.remove(&subscription_id);
                if let Some(transport) = transport.as_deref_mut() {
                    transport.unsubscribe(subscription_id);
                }
                log::debug!("Unsubscribed from {} ({})", topic, subscription_id);
            }
        }

        self.unresolved.retain(|topic| desired.contains(topic));

        for topic in desired {
            if !self.by_topic.contains_key(&topic) {
                self.unresolved.insert(topic);
            }
        }
    }

    /// Binds every unresolved topic that now has a registered channel.
    ///
    /// Does nothing without a live transport. Returns the number of
    /// subscriptions issued.
    pub fn resolve_pending(&mut self, registry: &ChannelRegistry, transport: Option<&mut dyn Transport>) -> usize {
        let Some(transport) = transport else {
            return 0;
        };

        let matched: Vec<(String, Arc<ParsedChannel>)> = self
            .unresolved
            .iter()
            .filter_map(|topic| {
                registry
                    .lookup_by_topic(topic)
                    .map(|channel| (topic.clone(), Arc::clone(channel)))
            })
            .collect();

        for (topic, channel) in &matched {
            let subscription_id = transport.subscribe(channel.channel.id);
            log::debug!(
                "Subscribed to {} on channel {} ({})",
                topic,
                channel.channel.id,
                subscription_id
            );
            self.unresolved.remove(topic);
            self.by_topic.insert(topic.clone(), subscription_id);
            self.by_id.insert(
                subscription_id,
                ResolvedSubscription {
                    topic: topic.clone(),
                    subscription_id,
                    channel: Arc::clone(channel),
                },
            );
        }

        matched.len()
    }

    /// The connection is gone and its subscription ids with it.
    pub fn on_disconnect(&mut self) {
        self.unresolved.extend(self.by_topic.drain().map(|(topic, _)| topic));
        self.by_id.clear();
    }

    /// Channels disappeared; subscriptions bound to them go back to waiting.
    pub fn on_channels_removed(&mut self, channel_ids: &[ChannelId]) {
        let orphaned: Vec<SubscriptionId> = self
            .by_id
            .values()
            .filter(|sub| channel_ids.contains(&sub.channel.channel.id))
            .map(|sub| sub.subscription_id)
            .collect();

        for subscription_id in orphaned {
            if let Some(sub) = self.by_id.remove(&subscription_id) {
                self.by_topic.remove(&sub.topic);
                self.unresolved.insert(sub.topic);
            }
        }
    }

    /// Finds the subscription an incoming message belongs to.
    pub fn route(&self, subscription_id: SubscriptionId) -> Option<&ResolvedSubscription> {
        self.by_id.get(&subscription_id)
    }

    pub fn is_resolved(&self, topic: &str) -> bool {
        self.by_topic.contains_key(topic)
    }

    pub fn is_unresolved(&self, topic: &str) -> bool {
        self.unresolved.contains(topic)
    }

    pub fn subscription_id(&self, topic: &str) -> Option<SubscriptionId> {
        self.by_topic.get(topic).copied()
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &str> {
        self.unresolved.iter().map(String::as_str)
    }

    pub fn resolved_count(&self) -> usize {
        self.by_id.len()
    }
}

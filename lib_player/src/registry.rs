//! # Channel Registry
//!
//! Tracks the channels the server currently advertises, indexed both by
//! channel id and by topic. Each advertised channel is resolved through the
//! schema resolver on arrival; only channels that resolve are registered.
//!
//! ## Policy
//! - A channel whose schema fails to resolve is reported under
//!   `schema:{topic}` and skipped. Its siblings in the same advertisement
//!   still register.
//! - A channel whose topic is already registered is reported under
//!   `duplicate-topic:{topic}` and rejected; the first registration wins.
//! - A channel whose id is already registered is reported under
//!   `duplicate-channel:{id}` and rejected the same way.
//! - Unadvertising an unknown id is reported under `unadvertise:{id}`.
//!
//! After every mutation the exported topic list and the merged datatype map
//! are recomputed. Datatypes merge in channel-id order with last write wins.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::problems::{PlayerProblem, ProblemSet};
use crate::schema::{self, Datatypes, ParsedChannel};
use crate::types::{Channel, ChannelId, Topic};

#[derive(Debug, Default)]
pub struct ChannelRegistry {
    by_id: BTreeMap<ChannelId, Arc<ParsedChannel>>,
    by_topic: HashMap<String, Arc<ParsedChannel>>,
    /// `None` until the first advertisement.
    topics: Option<Vec<Topic>>,
    datatypes: Option<Datatypes>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers newly advertised channels.
    pub fn advertise(&mut self, channels: Vec<Channel>, problems: &mut ProblemSet) {
        for channel in channels {
            if let Some(existing) = self.lookup_by_id(channel.id) {
                problems.add(
                    format!("duplicate-channel:{}", channel.id),
                    PlayerProblem::error(format!(
                        "Channel {} advertised again on {} while registered on {}",
                        channel.id, channel.topic, existing.channel.topic
                    ))
                    .with_tip("Channel ids must stay unique until the server unadvertises them."),
                );
                continue;
            }
            if self.lookup_by_topic(&channel.topic).is_some() {
                problems.add(
                    format!("duplicate-topic:{}", channel.topic),
                    PlayerProblem::error(format!(
                        "Multiple channels advertise the same topic: {} (channel {})",
                        channel.topic, channel.id
                    ))
                    .with_tip("Topics must be unique among the channels a server advertises."),
                );
                continue;
            }

            let parsed = match schema::resolve(&channel) {
                Ok(parsed) => Arc::new(parsed),
                Err(e) => {
                    problems.add(
                        format!("schema:{}", channel.topic),
                        PlayerProblem::error(format!(
                            "Failed to parse channel schema on {}",
                            channel.topic
                        ))
                        .with_cause(&e),
                    );
                    continue;
                }
            };

            log::debug!(
                "Registered channel {} on {} ({})",
                channel.id,
                channel.topic,
                parsed.full_schema_name
            );
            self.by_id.insert(channel.id, Arc::clone(&parsed));
            self.by_topic.insert(channel.topic.clone(), parsed);
        }

        self.recompute();
    }

    /// Removes channels and returns the ids that were actually registered.
    pub fn unadvertise(&mut self, ids: Vec<ChannelId>, problems: &mut ProblemSet) -> Vec<ChannelId> {
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            match self.by_id.remove(&id) {
                Some(parsed) => {
                    self.by_topic.remove(&parsed.channel.topic);
                    log::debug!("Unregistered channel {} on {}", id, parsed.channel.topic);
                    removed.push(id);
                }
                None => {
                    problems.add(
                        format!("unadvertise:{}", id),
                        PlayerProblem::warn(format!(
                            "Server unadvertised channel {} that was never advertised",
                            id
                        )),
                    );
                }
            }
        }

        self.recompute();
        removed
    }

    /// Forgets every channel. Established topic/datatype exports are kept
    /// established, just emptied.
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_topic.clear();
        if self.topics.is_some() {
            self.recompute();
        }
    }

    pub fn lookup_by_topic(&self, topic: &str) -> Option<&Arc<ParsedChannel>> {
        self.by_topic.get(topic)
    }

    pub fn lookup_by_id(&self, id: ChannelId) -> Option<&Arc<ParsedChannel>> {
        self.by_id.get(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn topics(&self) -> Option<&[Topic]> {
        self.topics.as_deref()
    }

    pub fn datatypes(&self) -> Option<&Datatypes> {
        self.datatypes.as_ref()
    }

    fn recompute(&mut self) {
        let mut topics = Vec::with_capacity(self.by_id.len());
        let mut datatypes = Datatypes::new();
        for parsed in self.by_id.values() {
            topics.push(Topic {
                name: parsed.channel.topic.clone(),
                schema_name: parsed.channel.schema_name.clone(),
            });
            datatypes.extend(parsed.datatypes.iter().map(|(name, definition)| (name.clone(), definition.clone())));
        }
        self.topics = Some(topics);
        self.datatypes = Some(datatypes);
    }
}

//! Typing indicators
//!
//! [`TypingTracker`] holds remote users who are composing input, per topic,
//! each entry expiring on its own after a period without a fresh `typing`
//! event. [`LocalTyping`] is the outbound side: it throttles `typing`
//! commands for the local user and produces `stop_typing` once input goes
//! idle, using the same timeout the remote side applies.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use super::message::{OutboundCommand, TopicId, UserId};
use super::timer::Timers;

/// Identifies one typing entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypingKey {
    pub topic_id: TopicId,
    pub user_id: UserId,
}

/// Read-only snapshot of who is typing where
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingSnapshot {
    topics: Arc<BTreeMap<TopicId, BTreeMap<UserId, String>>>,
}

impl TypingSnapshot {
    /// Display names of users typing in `topic_id`, ordered by user id
    pub fn names_in(&self, topic_id: &str) -> Vec<&str> {
        self.topics
            .get(topic_id)
            .map(|users| users.values().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_typing(&self, topic_id: &str, user_id: &str) -> bool {
        self.topics
            .get(topic_id)
            .is_some_and(|users| users.contains_key(user_id))
    }

    /// Topics with at least one typing user
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Remote typing registry with per-entry expiry
pub struct TypingTracker {
    topics: BTreeMap<TopicId, BTreeMap<UserId, String>>,
    timers: Timers<TypingKey>,
    expiry: Duration,
    tx: watch::Sender<TypingSnapshot>,
}

impl TypingTracker {
    pub fn new(expiry: Duration) -> Self {
        let (tx, _rx) = watch::channel(TypingSnapshot::default());
        Self {
            topics: BTreeMap::new(),
            timers: Timers::new(),
            expiry,
            tx,
        }
    }

    pub fn snapshot(&self) -> TypingSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TypingSnapshot> {
        self.tx.subscribe()
    }

    /// Insert or refresh an entry and re-arm its expiry
    pub fn on_typing_start(&mut self, topic_id: TopicId, user_id: UserId, username: String) {
        let key = TypingKey {
            topic_id: topic_id.clone(),
            user_id: user_id.clone(),
        };
        self.timers.arm(key, self.expiry);

        let users = self.topics.entry(topic_id).or_default();
        if users.get(&user_id) != Some(&username) {
            users.insert(user_id, username);
            self.publish();
        }
    }

    /// Remove an entry and cancel its expiry; returns whether it existed
    pub fn on_typing_stop(&mut self, topic_id: &str, user_id: &str) -> bool {
        let key = TypingKey {
            topic_id: topic_id.to_string(),
            user_id: user_id.to_string(),
        };
        self.timers.cancel(&key);
        self.remove(&key)
    }

    /// Wait for the next entry to expire, remove it and return its key
    pub async fn next_expiry(&mut self) -> TypingKey {
        let key = self.timers.expired().await;
        debug!(
            "Typing indicator expired for {} in topic {}",
            key.user_id, key.topic_id
        );
        self.remove(&key);
        key
    }

    /// Drop every entry and timer
    pub fn clear(&mut self) {
        self.timers.cancel_all();
        if !self.topics.is_empty() {
            self.topics.clear();
            self.publish();
        }
    }

    fn remove(&mut self, key: &TypingKey) -> bool {
        let Some(users) = self.topics.get_mut(&key.topic_id) else {
            return false;
        };
        if users.remove(&key.user_id).is_none() {
            return false;
        }
        if users.is_empty() {
            self.topics.remove(&key.topic_id);
        }
        self.publish();
        true
    }

    fn publish(&self) {
        self.tx.send_replace(TypingSnapshot {
            topics: Arc::new(self.topics.clone()),
        });
    }
}

/// Outbound typing state for the local user
pub struct LocalTyping {
    last_sent: HashMap<TopicId, Instant>,
    timers: Timers<TopicId>,
    idle_timeout: Duration,
    refresh: Duration,
}

impl LocalTyping {
    /// `idle_timeout` is how long after the last input a stop is sent;
    /// `refresh` is the minimum spacing between repeated `typing` commands.
    pub fn new(idle_timeout: Duration, refresh: Duration) -> Self {
        Self {
            last_sent: HashMap::new(),
            timers: Timers::new(),
            idle_timeout,
            refresh,
        }
    }

    /// Record an input event; returns a command when one should go out
    pub fn on_input(&mut self, topic_id: TopicId) -> Option<OutboundCommand> {
        self.timers.arm(topic_id.clone(), self.idle_timeout);

        let now = Instant::now();
        let due = match self.last_sent.get(&topic_id) {
            Some(last) => now.duration_since(*last) >= self.refresh,
            None => true,
        };
        if !due {
            return None;
        }

        self.last_sent.insert(topic_id.clone(), now);
        Some(OutboundCommand::Typing { topic_id })
    }

    /// Explicit stop (blur, submit); only produces a command if typing
    pub fn stop(&mut self, topic_id: &str) -> Option<OutboundCommand> {
        let topic_id = topic_id.to_string();
        self.timers.cancel(&topic_id);
        self.last_sent
            .remove(&topic_id)
            .map(|_| OutboundCommand::StopTyping { topic_id })
    }

    /// Wait until a topic has gone idle and return its stop command
    pub async fn next_idle(&mut self) -> OutboundCommand {
        let topic_id = self.timers.expired().await;
        self.last_sent.remove(&topic_id);
        OutboundCommand::StopTyping { topic_id }
    }

    pub fn is_typing(&self, topic_id: &str) -> bool {
        self.last_sent.contains_key(topic_id)
    }

    pub fn clear(&mut self) {
        self.timers.cancel_all();
        self.last_sent.clear();
    }
}

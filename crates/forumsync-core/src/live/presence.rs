//! Presence tracking
//!
//! Keeps the set of remote users currently connected to the server.
//! Consumers read it through a [`PresenceSet`] snapshot or a watch
//! receiver; only the session mutates it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use super::message::{OnlineUser, UserId};

/// Read-only snapshot of connected users, keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSet {
    users: Arc<BTreeMap<UserId, OnlineUser>>,
}

impl PresenceSet {
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    pub fn get(&self, user_id: &str) -> Option<&OnlineUser> {
        self.users.get(user_id)
    }

    /// Users ordered by id
    pub fn iter(&self) -> impl Iterator<Item = &OnlineUser> {
        self.users.values()
    }
}

/// Maintains the presence set and publishes every change
pub struct PresenceTracker {
    users: BTreeMap<UserId, OnlineUser>,
    tx: watch::Sender<PresenceSet>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PresenceSet::default());
        Self {
            users: BTreeMap::new(),
            tx,
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> PresenceSet {
        self.tx.borrow().clone()
    }

    /// Subscribe to presence changes
    pub fn subscribe(&self) -> watch::Receiver<PresenceSet> {
        self.tx.subscribe()
    }

    /// Replace the whole set with a server snapshot
    pub fn on_snapshot(&mut self, users: Vec<OnlineUser>) {
        self.users = users.into_iter().map(|u| (u.id.clone(), u)).collect();
        debug!("Presence snapshot: {} users online", self.users.len());
        self.publish();
    }

    /// Add a user; a user already present is left untouched
    pub fn on_join(&mut self, user: OnlineUser) -> bool {
        if self.users.contains_key(&user.id) {
            return false;
        }
        debug!("User joined: {} ({})", user.display_name, user.id);
        self.users.insert(user.id.clone(), user);
        self.publish();
        true
    }

    /// Remove a user if present
    pub fn on_leave(&mut self, user_id: &str) -> bool {
        if self.users.remove(user_id).is_none() {
            return false;
        }
        debug!("User left: {}", user_id);
        self.publish();
        true
    }

    /// Forget everyone (used on manual disconnect)
    pub fn clear(&mut self) {
        if self.users.is_empty() {
            return;
        }
        self.users.clear();
        self.publish();
    }

    fn publish(&self) {
        self.tx.send_replace(PresenceSet {
            users: Arc::new(self.users.clone()),
        });
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

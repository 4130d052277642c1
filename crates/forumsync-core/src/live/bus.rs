//! Notification bus for content updates
//!
//! Views subscribe to the kinds of change they care about (votes, new
//! comments, new replies) and get a callback for every matching event.
//! A callback that returns an error or panics is logged and skipped; the
//! remaining subscribers still run.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, error, warn};

use super::message::{id_from_value, TopicId};

/// Kinds of content notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NotificationKind {
    VoteChanged,
    CommentAdded,
    ReplyAdded,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::VoteChanged => write!(f, "vote-changed"),
            NotificationKind::CommentAdded => write!(f, "comment-added"),
            NotificationKind::ReplyAdded => write!(f, "reply-added"),
        }
    }
}

/// A content change pushed by the server
#[derive(Debug, Clone, PartialEq)]
pub struct ContentUpdate {
    pub kind: NotificationKind,
    pub data: Value,
}

impl ContentUpdate {
    pub fn new(kind: NotificationKind, data: Value) -> Self {
        Self { kind, data }
    }

    /// Post the update belongs to, if the payload names one
    pub fn post_id(&self) -> Option<TopicId> {
        self.data.get("post_id").and_then(id_from_value)
    }
}

/// Handle returned by [`NotificationBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&ContentUpdate) -> anyhow::Result<()> + Send + Sync>;

struct Subscription {
    kind: NotificationKind,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    // Ordered by id, which is registration order
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
}

/// Typed publish/subscribe for content updates
///
/// Cheap to clone; clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct NotificationBus {
    registry: Arc<RwLock<Registry>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one kind of notification
    pub fn subscribe<F>(&self, kind: NotificationKind, callback: F) -> SubscriptionId
    where
        F: Fn(&ContentUpdate) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut registry = self.write();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry.subscriptions.insert(
            id,
            Subscription {
                kind,
                callback: Arc::new(callback),
            },
        );
        debug!("Subscribed {:?} to {}", id, kind);
        id
    }

    /// Remove a subscription; returns whether it existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.write().subscriptions.remove(&id).is_some()
    }

    /// Number of callbacks registered for `kind`
    pub fn subscriber_count(&self, kind: NotificationKind) -> usize {
        self.read()
            .subscriptions
            .values()
            .filter(|s| s.kind == kind)
            .count()
    }

    /// Deliver an update to every subscriber of its kind
    ///
    /// Returns how many callbacks completed without error. The subscriber
    /// list is snapshotted first, so callbacks may subscribe or unsubscribe
    /// freely.
    pub fn publish(&self, update: &ContentUpdate) -> usize {
        let callbacks: Vec<(SubscriptionId, Callback)> = self
            .read()
            .subscriptions
            .iter()
            .filter(|(_, s)| s.kind == update.kind)
            .map(|(id, s)| (*id, Arc::clone(&s.callback)))
            .collect();

        let mut delivered = 0;
        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(update))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!("Subscriber {:?} failed on {}: {:#}", id, update.kind, e),
                Err(_) => error!("Subscriber {:?} panicked on {}", id, update.kind),
            }
        }
        delivered
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        // Callbacks run outside the lock
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscriptions", &self.read().subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn vote(post_id: i64) -> ContentUpdate {
        ContentUpdate::new(NotificationKind::VoteChanged, json!({ "post_id": post_id }))
    }

    #[test]
    fn test_publish_with_no_subscribers() {
        let bus = NotificationBus::new();
        assert_eq!(bus.publish(&vote(1)), 0);
    }

    #[test]
    fn test_failing_subscriber_does_not_stop_others() {
        let bus = NotificationBus::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let c = Arc::clone(&calls);
        bus.subscribe(NotificationKind::VoteChanged, move |_| {
            c.lock().unwrap().push("first");
            Ok(())
        });
        let c = Arc::clone(&calls);
        bus.subscribe(NotificationKind::VoteChanged, move |_| {
            c.lock().unwrap().push("second");
            anyhow::bail!("view is gone")
        });
        let c = Arc::clone(&calls);
        bus.subscribe(NotificationKind::VoteChanged, move |_| {
            c.lock().unwrap().push("third");
            Ok(())
        });

        assert_eq!(bus.publish(&vote(1)), 2);
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_panicking_subscriber_is_contained() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.subscribe(NotificationKind::CommentAdded, |_| panic!("boom"));
        let h = Arc::clone(&hits);
        bus.subscribe(NotificationKind::CommentAdded, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let update = ContentUpdate::new(NotificationKind::CommentAdded, json!({}));
        assert_eq!(bus.publish(&update), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // The bus stays usable afterwards
        assert_eq!(bus.publish(&update), 1);
    }

    #[test]
    fn test_delivery_is_filtered_by_kind() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe(NotificationKind::ReplyAdded, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(&vote(1));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count(NotificationKind::ReplyAdded), 1);
        assert_eq!(bus.subscriber_count(NotificationKind::VoteChanged), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = NotificationBus::new();
        let id = bus.subscribe(NotificationKind::VoteChanged, |_| Ok(()));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.publish(&vote(1)), 0);
    }

    #[test]
    fn test_unsubscribe_during_publish() {
        let bus = NotificationBus::new();
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let inner_bus = bus.clone();
        let inner_slot = Arc::clone(&slot);
        let id = bus.subscribe(NotificationKind::VoteChanged, move |_| {
            if let Some(id) = inner_slot.lock().unwrap().take() {
                inner_bus.unsubscribe(id);
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(id);

        assert_eq!(bus.publish(&vote(1)), 1);
        assert_eq!(bus.publish(&vote(2)), 0);
    }

    #[test]
    fn test_post_id_helper() {
        assert_eq!(vote(7).post_id().as_deref(), Some("7"));
        let update = ContentUpdate::new(NotificationKind::ReplyAdded, json!({"comment_id": 1}));
        assert_eq!(update.post_id(), None);
    }
}

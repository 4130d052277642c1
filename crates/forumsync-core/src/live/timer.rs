//! Keyed, cancellable timers
//!
//! Each armed key owns a sleeping task. When it wakes it reports
//! `(key, generation)` back through a channel; [`Timers::expired`] only
//! yields a key whose generation is still current, so a timer that was
//! re-armed or canceled after it fired is dropped silently.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

struct Armed {
    generation: u64,
    task: JoinHandle<()>,
}

/// A set of timers keyed by `K`
pub struct Timers<K> {
    armed: HashMap<K, Armed>,
    next_generation: u64,
    fired_tx: mpsc::UnboundedSender<(K, u64)>,
    fired_rx: mpsc::UnboundedReceiver<(K, u64)>,
}

impl<K> Timers<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new() -> Self {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        Self {
            armed: HashMap::new(),
            next_generation: 0,
            fired_tx,
            fired_rx,
        }
    }

    /// Arm (or re-arm) the timer for `key`
    ///
    /// Any previous timer for the same key is canceled first.
    /// Must be called from within a tokio runtime.
    pub fn arm(&mut self, key: K, delay: Duration) -> u64 {
        self.cancel(&key);

        self.next_generation += 1;
        let generation = self.next_generation;

        let tx = self.fired_tx.clone();
        let fired_key = key.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send((fired_key, generation));
        });

        self.armed.insert(key, Armed { generation, task });
        generation
    }

    /// Cancel the timer for `key`; returns whether one was armed
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.armed.remove(key) {
            Some(armed) => {
                armed.task.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every armed timer
    pub fn cancel_all(&mut self) {
        for (_, armed) in self.armed.drain() {
            armed.task.abort();
        }
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.armed.contains_key(key)
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Wait for the next timer that is still current and disarm it
    ///
    /// Cancel-safe: a fired key is only consumed once this returns.
    pub async fn expired(&mut self) -> K {
        loop {
            // We hold a sender ourselves, so the channel never closes.
            let Some((key, generation)) = self.fired_rx.recv().await else {
                return std::future::pending().await;
            };

            if self.claim(&key, generation) {
                return key;
            }
            trace!("Ignoring superseded timer generation {}", generation);
        }
    }

    /// Disarm `key` if `generation` is the one currently armed
    fn claim(&mut self, key: &K, generation: u64) -> bool {
        match self.armed.get(key) {
            Some(armed) if armed.generation == generation => {
                self.armed.remove(key);
                true
            }
            _ => false,
        }
    }
}

impl<K> Default for Timers<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for Timers<K> {
    fn drop(&mut self) {
        for armed in self.armed.values() {
            armed.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let mut timers = Timers::new();
        timers.arm("a", Duration::from_millis(500));
        assert!(timers.is_armed(&"a"));

        let start = tokio::time::Instant::now();
        let key = timers.expired().await;
        assert_eq!(key, "a");
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() < Duration::from_millis(510));
        assert!(!timers.is_armed(&"a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_supersedes_previous() {
        let mut timers = Timers::new();
        timers.arm("a", Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(50)).await;
        timers.arm("a", Duration::from_millis(100));

        let start = tokio::time::Instant::now();
        let key = timers.expired().await;
        assert_eq!(key, "a");
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(start.elapsed() < Duration::from_millis(110));

        // Nothing else should fire
        let next = tokio::time::timeout(Duration::from_secs(5), timers.expired()).await;
        assert!(next.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_canceled_timer_never_yields() {
        let mut timers = Timers::new();
        timers.arm("a", Duration::from_millis(100));
        assert!(timers.cancel(&"a"));
        assert!(!timers.cancel(&"a"));

        let next = tokio::time::timeout(Duration::from_secs(1), timers.expired()).await;
        assert!(next.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fire_is_ignored() {
        let mut timers = Timers::new();
        let first = timers.arm("a", Duration::from_millis(10));

        // Simulate a fire that raced with a re-arm
        timers.arm("a", Duration::from_millis(200));
        timers.fired_tx.send(("a", first)).unwrap();

        let start = tokio::time::Instant::now();
        let key = timers.expired().await;
        assert_eq!(key, "a");
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_fire_in_deadline_order() {
        let mut timers = Timers::new();
        timers.arm("slow", Duration::from_millis(300));
        timers.arm("fast", Duration::from_millis(100));
        assert_eq!(timers.armed_count(), 2);

        assert_eq!(timers.expired().await, "fast");
        assert_eq!(timers.expired().await, "slow");
        assert_eq!(timers.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let mut timers = Timers::new();
        timers.arm(1u32, Duration::from_millis(100));
        timers.arm(2u32, Duration::from_millis(100));
        timers.cancel_all();
        assert_eq!(timers.armed_count(), 0);

        let next = tokio::time::timeout(Duration::from_secs(1), timers.expired()).await;
        assert!(next.is_err());
    }
}

//! Handle to the live session
//!
//! [`LiveClient::spawn`] starts the session task and returns a handle. All
//! methods on the handle enqueue a command and return immediately; state is
//! observed through watch receivers and the notification bus.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::bus::{ContentUpdate, NotificationBus, NotificationKind, SubscriptionId};
use super::credentials::Credentials;
use super::message::{Envelope, TopicId};
use super::presence::{PresenceSet, PresenceTracker};
use super::session::{Session, SessionCommand};
use super::status::ConnectionStatus;
use super::typing::{TypingSnapshot, TypingTracker};
use crate::error::{SyncError, SyncResult};

/// Runtime settings for a live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// WebSocket endpoint without the token (e.g. `ws://localhost:8080/ws`)
    pub server_url: String,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    /// Highest attempt number the backoff counts to
    pub reconnect_attempt_cap: u32,
    /// Remote typing expiry, also the local idle timeout
    pub typing_timeout: Duration,
    /// Minimum spacing between repeated local `typing` commands
    pub typing_refresh: Duration,
    pub connect_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8080/ws".to_string(),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            reconnect_attempt_cap: 10,
            typing_timeout: Duration::from_secs(3),
            typing_refresh: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Handle to a running live session
pub struct LiveClient {
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    status_rx: watch::Receiver<ConnectionStatus>,
    presence_rx: watch::Receiver<PresenceSet>,
    typing_rx: watch::Receiver<TypingSnapshot>,
    bus: NotificationBus,
    task: JoinHandle<()>,
}

impl LiveClient {
    /// Spawn the session task
    ///
    /// Must be called from within a tokio runtime. The session starts
    /// disconnected; call [`LiveClient::connect`] to go online.
    pub fn spawn(config: SyncConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());

        let presence = PresenceTracker::new();
        let presence_rx = presence.subscribe();
        let typing = TypingTracker::new(config.typing_timeout);
        let typing_rx = typing.subscribe();
        let bus = NotificationBus::new();

        let label = format!("forumsync-{}", &uuid::Uuid::new_v4().to_string()[..8]);
        let session = Session::new(config, status_tx, presence, typing, bus.clone());
        let task = tokio::spawn(
            session
                .run(command_rx)
                .instrument(tracing::info_span!("session", id = %label)),
        );

        Self {
            command_tx,
            status_rx,
            presence_rx,
            typing_rx,
            bus,
            task,
        }
    }

    /// Go online; `None` is a no-op
    pub fn connect(&self, credentials: Option<Credentials>) -> SyncResult<()> {
        self.command(SessionCommand::Connect(credentials))
    }

    /// Go offline and stop retrying
    pub fn disconnect(&self) -> SyncResult<()> {
        self.command(SessionCommand::Disconnect)
    }

    /// Drop the current connection and connect again with the last credentials
    pub fn reconnect(&self) -> SyncResult<()> {
        self.command(SessionCommand::Reconnect)
    }

    /// Send a message if connected; otherwise it is dropped and logged
    pub fn send(&self, message: impl Into<Envelope>) -> SyncResult<()> {
        self.command(SessionCommand::Send(message.into()))
    }

    /// Call on every local input event in a topic's composer
    pub fn emit_local_typing(&self, topic_id: impl Into<TopicId>) -> SyncResult<()> {
        self.command(SessionCommand::LocalTyping(topic_id.into()))
    }

    /// Call when the composer loses focus or is submitted
    pub fn stop_local_typing(&self, topic_id: impl Into<TopicId>) -> SyncResult<()> {
        self.command(SessionCommand::StopLocalTyping(topic_id.into()))
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    pub fn presence(&self) -> PresenceSet {
        self.presence_rx.borrow().clone()
    }

    pub fn subscribe_presence(&self) -> watch::Receiver<PresenceSet> {
        self.presence_rx.clone()
    }

    pub fn typing(&self) -> TypingSnapshot {
        self.typing_rx.borrow().clone()
    }

    pub fn subscribe_typing(&self) -> watch::Receiver<TypingSnapshot> {
        self.typing_rx.clone()
    }

    /// Register a content-update callback
    pub fn subscribe<F>(&self, kind: NotificationKind, callback: F) -> SubscriptionId
    where
        F: Fn(&ContentUpdate) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// The bus the session publishes to
    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// Disconnect and wait for the session task to finish
    pub async fn shutdown(self) -> SyncResult<()> {
        // The task may already be gone; joining still reports how it ended
        let _ = self.command_tx.send(SessionCommand::Shutdown);
        self.task.await.map_err(|_| SyncError::SessionClosed)
    }

    fn command(&self, command: SessionCommand) -> SyncResult<()> {
        self.command_tx
            .send(command)
            .map_err(|_| SyncError::SessionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::status::ConnectionState;

    #[tokio::test]
    async fn test_spawn_starts_disconnected() {
        let client = LiveClient::spawn(SyncConfig::default());
        assert_eq!(client.status().state, ConnectionState::Disconnected);
        assert!(client.presence().is_empty());
        assert!(client.typing().is_empty());
        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_after_shutdown_fail() {
        let client = LiveClient::spawn(SyncConfig::default());
        let tx = client.command_tx.clone();
        client.shutdown().await.unwrap();
        assert!(tx.send(SessionCommand::Disconnect).is_err());
    }

    #[tokio::test]
    async fn test_connect_none_and_send_while_offline_are_harmless() {
        let client = LiveClient::spawn(SyncConfig::default());
        client.connect(None).unwrap();
        client
            .send(Envelope::new("typing", serde_json::json!({"topic_id": "1"})))
            .unwrap();
        client.emit_local_typing("1").unwrap();
        client.disconnect().unwrap();
        client.reconnect().unwrap();

        tokio::task::yield_now().await;
        assert_eq!(client.status().state, ConnectionState::Disconnected);
        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bus_is_shared_with_handle() {
        let client = LiveClient::spawn(SyncConfig::default());
        let id = client.subscribe(NotificationKind::VoteChanged, |_| Ok(()));
        assert_eq!(client.bus().subscriber_count(NotificationKind::VoteChanged), 1);
        assert!(client.unsubscribe(id));
        client.shutdown().await.unwrap();
    }
}

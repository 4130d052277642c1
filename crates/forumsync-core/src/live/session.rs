//! The live session actor
//!
//! One task owns the connection state machine, the presence and typing
//! trackers and the reconnect timer. Commands from the handle, events from
//! the current socket task and timer expiries are processed one at a time
//! in a single `select!` loop, so no state is ever shared or locked.

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use super::backoff::ReconnectPolicy;
use super::bus::{ContentUpdate, NotificationBus, NotificationKind};
use super::client::SyncConfig;
use super::credentials::{build_endpoint, redacted, Credentials};
use super::message::{Envelope, OnlineUser, OutboundCommand, TopicId, UserId};
use super::presence::PresenceTracker;
use super::router::{route_frame, EventHandler};
use super::status::{CloseInfo, ConnectionState, ConnectionStatus};
use super::timer::Timers;
use super::transport::{Transport, TransportEvent};
use super::typing::{LocalTyping, TypingTracker};
use crate::error::{SyncError, SyncResult};

/// Requests sent from the handle to the session task
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Connect(Option<Credentials>),
    Disconnect,
    Reconnect,
    Send(Envelope),
    LocalTyping(TopicId),
    StopLocalTyping(TopicId),
    Shutdown,
}

pub(crate) struct Session {
    config: SyncConfig,
    credentials: Option<Credentials>,
    /// Cleared by an explicit disconnect; reconnects only happen while set
    active: bool,
    transport: Option<Transport>,
    generation: u64,
    policy: ReconnectPolicy,
    reconnect_timer: Timers<()>,
    status: ConnectionStatus,
    status_tx: watch::Sender<ConnectionStatus>,
    presence: PresenceTracker,
    typing: TypingTracker,
    local_typing: LocalTyping,
    bus: NotificationBus,
    transport_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    transport_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
}

impl Session {
    pub(crate) fn new(
        config: SyncConfig,
        status_tx: watch::Sender<ConnectionStatus>,
        presence: PresenceTracker,
        typing: TypingTracker,
        bus: NotificationBus,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        Self {
            policy: ReconnectPolicy::new(
                config.reconnect_base_delay,
                config.reconnect_max_delay,
                config.reconnect_attempt_cap,
            ),
            local_typing: LocalTyping::new(config.typing_timeout, config.typing_refresh),
            config,
            credentials: None,
            active: false,
            transport: None,
            generation: 0,
            reconnect_timer: Timers::new(),
            status: ConnectionStatus::default(),
            status_tx,
            presence,
            typing,
            bus,
            transport_tx,
            transport_rx,
        }
    }

    /// Process inputs until shutdown or until every handle is gone
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Shutdown) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                }

                Some((generation, event)) = self.transport_rx.recv() => {
                    self.handle_transport(generation, event);
                }

                () = self.reconnect_timer.expired() => {
                    self.on_reconnect_due();
                }

                _ = self.typing.next_expiry() => {}

                command = self.local_typing.next_idle() => {
                    debug!("Local typing went idle in topic {}", command_topic(&command));
                    self.emit(command.into());
                }
            }
        }

        self.disconnect();
        info!("Live session stopped");
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect(credentials) => self.connect(credentials),
            SessionCommand::Disconnect => self.disconnect(),
            SessionCommand::Reconnect => self.reconnect(),
            SessionCommand::Send(envelope) => self.emit(envelope),
            SessionCommand::LocalTyping(topic_id) => self.local_input(topic_id),
            SessionCommand::StopLocalTyping(topic_id) => {
                if let Some(command) = self.local_typing.stop(&topic_id) {
                    self.emit(command.into());
                }
            }
            // Handled by the run loop
            SessionCommand::Shutdown => {}
        }
    }

    fn connect(&mut self, credentials: Option<Credentials>) {
        let Some(credentials) = credentials else {
            debug!("Connect without credentials, ignoring");
            return;
        };

        self.credentials = Some(credentials);
        self.active = true;
        self.open_transport(ConnectionState::Connecting);
    }

    fn disconnect(&mut self) {
        self.active = false;
        self.reconnect_timer.cancel_all();
        self.teardown_transport();

        self.presence.clear();
        self.typing.clear();
        self.local_typing.clear();

        if self.status.state != ConnectionState::Disconnected {
            info!("Disconnected");
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn reconnect(&mut self) {
        let Some(credentials) = self.credentials.clone() else {
            debug!("Reconnect requested before any connect, ignoring");
            return;
        };
        self.disconnect();
        self.connect(Some(credentials));
    }

    /// Start a fresh socket, replacing any existing one
    fn open_transport(&mut self, pending: ConnectionState) {
        self.reconnect_timer.cancel_all();
        self.teardown_transport();

        let Some(credentials) = &self.credentials else {
            return;
        };
        let token = match credentials.fresh_token() {
            Some(token) => token,
            None => {
                warn!("No token available for {}, not connecting", credentials.user_id);
                self.fail_without_retry(SyncError::MissingToken);
                return;
            }
        };
        let url = match build_endpoint(&self.config.server_url, &token) {
            Ok(url) => url,
            Err(e) => {
                warn!("Cannot connect: {}", e);
                self.fail_without_retry(e);
                return;
            }
        };

        self.generation += 1;
        info!("Connecting to {} ({})", redacted(&url), pending);
        self.transport = Some(Transport::spawn(
            url,
            self.generation,
            self.config.connect_timeout,
            self.transport_tx.clone(),
        ));
        self.set_state(pending);
    }

    fn teardown_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.shutdown();
        }
    }

    fn fail_without_retry(&mut self, error: SyncError) {
        self.status.last_error = Some(error.to_string());
        self.set_state(ConnectionState::Disconnected);
    }

    fn handle_transport(&mut self, generation: u64, event: TransportEvent) {
        let current = self.transport.as_ref().map(Transport::generation);
        if current != Some(generation) {
            trace!("Ignoring {:?} from stale transport {}", event, generation);
            return;
        }

        match event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Frame(text) => self.on_frame(&text),
            TransportEvent::Error(message) => {
                warn!("Connection error: {}", message);
                self.status.last_error = Some(message);
                self.publish_status();
            }
            TransportEvent::Closed(close) => self.on_close(close),
        }
    }

    fn on_open(&mut self) {
        info!("Connected");
        self.policy.reset();
        self.reconnect_timer.cancel_all();
        self.set_state(ConnectionState::Connected);
    }

    fn on_frame(&mut self, text: &str) {
        let self_id = self.credentials.as_ref().map(|c| c.user_id.as_str());
        let mut dispatch = Dispatch {
            self_id,
            presence: &mut self.presence,
            typing: &mut self.typing,
            bus: &self.bus,
        };
        let summary = route_frame(text, &mut dispatch);
        debug!(
            "Frame routed: {} dispatched, {} malformed, {} unknown",
            summary.dispatched, summary.malformed, summary.unknown
        );
    }

    /// The only path that schedules a reconnect
    fn on_close(&mut self, close: Option<CloseInfo>) {
        self.transport = None;
        match &close {
            Some(info) => info!("Connection closed: {} {}", info.code, info.reason),
            None => info!("Connection closed"),
        }
        self.status.last_close = close;
        self.local_typing.clear();
        self.set_state(ConnectionState::Disconnected);

        if self.active {
            let (attempt, delay) = self.policy.next_attempt();
            info!("Reconnecting in {:?} (attempt {})", delay, attempt);
            self.reconnect_timer.arm((), delay);
            self.set_state(ConnectionState::Reconnecting { attempt });
        }
    }

    fn on_reconnect_due(&mut self) {
        if !self.active {
            return;
        }
        let attempt = self.policy.attempt();
        self.open_transport(ConnectionState::Reconnecting { attempt });
    }

    fn local_input(&mut self, topic_id: TopicId) {
        if !self.status.state.is_connected() {
            warn!("Not connected, dropping typing for topic {}", topic_id);
            return;
        }
        if let Some(command) = self.local_typing.on_input(topic_id) {
            self.emit(command.into());
        }
    }

    /// Best-effort send; dropped with a warning unless connected
    fn emit(&mut self, envelope: Envelope) {
        if let Err(e) = self.try_send(&envelope) {
            warn!("Dropping outbound '{}': {}", envelope.kind, e);
            if !e.is_transient() {
                self.status.last_error = Some(e.to_string());
                self.publish_status();
            }
        }
    }

    fn try_send(&self, envelope: &Envelope) -> SyncResult<()> {
        let transport = match &self.transport {
            Some(transport) if self.status.state.is_connected() => transport,
            _ => return Err(SyncError::NotConnected),
        };
        transport.send(envelope.encode()?)
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.status.state = state;
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.status.clone());
    }
}

fn command_topic(command: &OutboundCommand) -> &str {
    match command {
        OutboundCommand::Typing { topic_id } | OutboundCommand::StopTyping { topic_id } => topic_id,
    }
}

/// Routes decoded events into the session's trackers and bus
struct Dispatch<'a> {
    self_id: Option<&'a str>,
    presence: &'a mut PresenceTracker,
    typing: &'a mut TypingTracker,
    bus: &'a NotificationBus,
}

impl Dispatch<'_> {
    fn notify(&self, kind: NotificationKind, data: Value) {
        let update = ContentUpdate::new(kind, data);
        let delivered = self.bus.publish(&update);
        trace!("{} delivered to {} subscribers", kind, delivered);
    }

    fn is_self(&self, user_id: &str) -> bool {
        self.self_id == Some(user_id)
    }
}

impl EventHandler for Dispatch<'_> {
    fn on_vote(&mut self, data: Value) {
        self.notify(NotificationKind::VoteChanged, data);
    }

    fn on_comment(&mut self, data: Value) {
        self.notify(NotificationKind::CommentAdded, data);
    }

    fn on_reply(&mut self, data: Value) {
        self.notify(NotificationKind::ReplyAdded, data);
    }

    fn on_user_joined(&mut self, user: OnlineUser) {
        self.presence.on_join(user);
    }

    fn on_user_left(&mut self, user_id: UserId) {
        self.presence.on_leave(&user_id);
    }

    fn on_online_users(&mut self, users: Vec<OnlineUser>) {
        self.presence.on_snapshot(users);
    }

    fn on_typing_started(&mut self, topic_id: TopicId, user_id: UserId, username: String) {
        if self.is_self(&user_id) {
            return;
        }
        self.typing.on_typing_start(topic_id, user_id, username);
    }

    fn on_typing_stopped(&mut self, topic_id: TopicId, user_id: UserId) {
        if self.is_self(&user_id) {
            return;
        }
        self.typing.on_typing_stop(&topic_id, &user_id);
    }
}

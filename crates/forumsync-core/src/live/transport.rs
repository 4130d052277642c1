//! Per-connection socket task
//!
//! Each connect attempt spawns one task that owns the WebSocket. It reports
//! back to the session through a channel, tagging every event with the
//! generation it was started with. The last event a task ever sends is
//! `Closed`, whatever happened before it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

use super::status::CloseInfo;
use crate::error::{SyncError, SyncResult};

/// Something the socket task observed
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TransportEvent {
    Opened,
    Frame(String),
    Error(String),
    Closed(Option<CloseInfo>),
}

pub(crate) type TransportEvents = mpsc::UnboundedSender<(u64, TransportEvent)>;

/// Session-side handle to one socket task
pub(crate) struct Transport {
    generation: u64,
    /// Set by the task once the handshake completes
    opened: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl Transport {
    pub(crate) fn spawn(
        url: Url,
        generation: u64,
        connect_timeout: Duration,
        events: TransportEvents,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let opened = Arc::new(AtomicBool::new(false));
        let socket = Socket {
            generation,
            opened: Arc::clone(&opened),
            events,
        };
        let task = tokio::spawn(async move {
            let close = socket.run(&url, connect_timeout, outbound_rx).await;
            socket.emit(TransportEvent::Closed(close));
        });

        Self {
            generation,
            opened,
            outbound,
            task,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a text frame for the socket
    pub(crate) fn send(&self, text: String) -> SyncResult<()> {
        self.outbound.send(text).map_err(|_| SyncError::NotConnected)
    }

    /// Stop the socket task
    ///
    /// An open socket gets a normal close frame, even if the session has not
    /// processed its `Opened` event yet. A pending handshake is aborted.
    pub(crate) fn shutdown(self) {
        if self.opened.load(Ordering::Acquire) {
            // Dropping the sender tells the task to send Close and exit
            drop(self.outbound);
        } else {
            self.task.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(generation: u64) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let transport = Self {
            generation,
            opened: Arc::new(AtomicBool::new(false)),
            outbound,
            task: tokio::spawn(async {}),
        };
        (transport, outbound_rx)
    }
}

struct Socket {
    generation: u64,
    opened: Arc<AtomicBool>,
    events: TransportEvents,
}

impl Socket {
    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send((self.generation, event));
    }

    async fn run(
        &self,
        url: &Url,
        connect_timeout: Duration,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
    ) -> Option<CloseInfo> {
        let stream = match tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                self.emit(TransportEvent::Error(SyncError::from(e).to_string()));
                return None;
            }
            Err(_) => {
                self.emit(TransportEvent::Error(
                    SyncError::ConnectTimeout(connect_timeout).to_string(),
                ));
                return None;
            }
        };

        self.opened.store(true, Ordering::Release);
        self.emit(TransportEvent::Opened);
        let (mut write, mut read) = stream.split();

        loop {
            tokio::select! {
                outgoing = outbound_rx.recv() => {
                    match outgoing {
                        Some(text) => {
                            if let Err(e) = write.send(Message::Text(text)).await {
                                self.emit(TransportEvent::Error(SyncError::from(e).to_string()));
                                return None;
                            }
                        }
                        None => {
                            let frame = CloseFrame {
                                code: CloseCode::Normal,
                                reason: "client disconnect".into(),
                            };
                            let info = CloseInfo::from(frame.clone());
                            if let Err(e) = write.send(Message::Close(Some(frame))).await {
                                debug!("Close handshake failed: {}", e);
                            }
                            return Some(info);
                        }
                    }
                }

                incoming = read.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => self.emit(TransportEvent::Frame(text)),
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => self.emit(TransportEvent::Frame(text)),
                            Err(_) => warn!("Dropping binary frame that is not UTF-8"),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            return frame.map(CloseInfo::from);
                        }
                        // Ping/pong are answered by tungstenite
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            self.emit(TransportEvent::Error(SyncError::from(e).to_string()));
                            return None;
                        }
                        None => return None,
                    }
                }
            }
        }
    }
}

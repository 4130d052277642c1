//! forumsync core library
//!
//! This crate provides the real-time side of the forum client: a single
//! persistent WebSocket session that keeps presence, typing indicators and
//! content notifications up to date.
//!
//! # Architecture
//!
//! - **Session task**: owns all live state and processes commands, socket
//!   events and timers one at a time
//! - **Handle**: [`LiveClient`] enqueues commands and exposes watch
//!   receivers plus the [`NotificationBus`]
//!
//! # Quick Start
//!
//! ```text
//! let client = LiveClient::spawn(Config::load()?.sync_config());
//! client.connect(Some(Credentials::new("42", "ana", token)))?;
//!
//! let mut status = client.subscribe_status();
//! status.changed().await?;
//! println!("{}", status.borrow().state);
//! ```
//!
//! # Modules
//!
//! - `live`: connection, decoding, presence, typing and the bus
//! - `config`: Application configuration
//! - `error`: Error types

pub mod config;
pub mod error;
pub mod live;

pub use config::Config;
pub use error::{EventError, SyncError, SyncResult};
pub use live::{
    ConnectionState, ConnectionStatus, ContentUpdate, Credentials, LiveClient, NotificationBus,
    NotificationKind, PresenceSet, SyncConfig, TypingSnapshot,
};

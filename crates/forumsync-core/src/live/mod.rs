//! Live updates over a persistent WebSocket
//!
//! Keeps one authenticated connection to the forum server, reconnecting
//! with exponential backoff, and turns what the server pushes into
//! observable state.
//!
//! ## Protocol
//!
//! Every message is a JSON envelope `{ "type": ..., "data": ... }`. The
//! server may batch several envelopes in one frame, one per line or as a
//! JSON array. Inbound types:
//!
//! - `vote`, `comment`, `reply`: content updates, published on the bus
//! - `user_joined`, `user_left`, `online_users`: presence
//! - `typing`, `stop_typing`: typing indicators, expiring after 3 seconds
//!
//! Outbound the client only sends `typing` and `stop_typing`, each with
//! `{ "topic_id": ... }`.
//!
//! ## Usage
//!
//! ```ignore
//! let client = LiveClient::spawn(SyncConfig::default());
//! client.connect(Some(Credentials::new("42", "ana", token)))?;
//!
//! client.subscribe(NotificationKind::VoteChanged, |update| {
//!     println!("votes changed on {:?}", update.post_id());
//!     Ok(())
//! });
//!
//! let mut presence = client.subscribe_presence();
//! while presence.changed().await.is_ok() {
//!     println!("{} online", presence.borrow().len());
//! }
//! ```

mod backoff;
mod bus;
mod client;
mod credentials;
mod message;
mod presence;
mod router;
mod session;
mod status;
mod timer;
mod transport;
mod typing;

pub use backoff::ReconnectPolicy;
pub use bus::{ContentUpdate, NotificationBus, NotificationKind, SubscriptionId};
pub use client::{LiveClient, SyncConfig};
pub use credentials::{build_endpoint, Credentials};
pub use message::{
    decode_frame, inbound, outbound, DecodedFrame, Envelope, InboundEvent, OnlineUser,
    OutboundCommand, TopicId, UserId,
};
pub use presence::{PresenceSet, PresenceTracker};
pub use router::{route_frame, EventHandler, RouteSummary};
pub use status::{CloseInfo, ConnectionState, ConnectionStatus};
pub use timer::Timers;
pub use typing::{LocalTyping, TypingKey, TypingSnapshot, TypingTracker};

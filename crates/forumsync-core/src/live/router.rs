//! Event routing
//!
//! Decodes a frame and hands each envelope, in arrival order, to exactly
//! one method of an [`EventHandler`].

use serde_json::Value;
use tracing::{debug, warn};

use super::message::{decode_frame, InboundEvent, OnlineUser, TopicId, UserId};

/// Receives routed events, one method per inbound event type
pub trait EventHandler {
    fn on_vote(&mut self, data: Value);
    fn on_comment(&mut self, data: Value);
    fn on_reply(&mut self, data: Value);
    fn on_user_joined(&mut self, user: OnlineUser);
    fn on_user_left(&mut self, user_id: UserId);
    fn on_online_users(&mut self, users: Vec<OnlineUser>);
    fn on_typing_started(&mut self, topic_id: TopicId, user_id: UserId, username: String);
    fn on_typing_stopped(&mut self, topic_id: TopicId, user_id: UserId);
}

/// Outcome of routing one frame
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouteSummary {
    /// Envelopes handed to a handler
    pub dispatched: usize,
    /// Segments that failed to parse, or known events with a bad payload
    pub malformed: usize,
    /// Envelopes with a type nobody handles
    pub unknown: usize,
}

/// Decode `payload` and dispatch every envelope to `handler`
pub fn route_frame<H: EventHandler + ?Sized>(payload: &str, handler: &mut H) -> RouteSummary {
    let frame = decode_frame(payload);
    let mut summary = RouteSummary {
        malformed: frame.malformed,
        ..RouteSummary::default()
    };

    for envelope in frame.envelopes {
        let kind = envelope.kind.clone();
        match InboundEvent::from_envelope(envelope) {
            Ok(Some(event)) => {
                dispatch(event, handler);
                summary.dispatched += 1;
            }
            Ok(None) => {
                debug!("Dropping unknown event type '{}'", kind);
                summary.unknown += 1;
            }
            Err(e) => {
                warn!("Skipping event: {}", e);
                summary.malformed += 1;
            }
        }
    }

    summary
}

fn dispatch<H: EventHandler + ?Sized>(event: InboundEvent, handler: &mut H) {
    match event {
        InboundEvent::VoteUpdated(data) => handler.on_vote(data),
        InboundEvent::CommentAdded(data) => handler.on_comment(data),
        InboundEvent::ReplyAdded(data) => handler.on_reply(data),
        InboundEvent::UserJoined(user) => handler.on_user_joined(user),
        InboundEvent::UserLeft(user_id) => handler.on_user_left(user_id),
        InboundEvent::OnlineUsers(users) => handler.on_online_users(users),
        InboundEvent::TypingStarted {
            topic_id,
            user_id,
            username,
        } => handler.on_typing_started(topic_id, user_id, username),
        InboundEvent::TypingStopped { topic_id, user_id } => {
            handler.on_typing_stopped(topic_id, user_id)
        }
    }
}

//! Wire message types and frame decoding
//!
//! Every message on the socket is an envelope `{ "type": ..., "data": ... }`.
//! A single transport frame may hold several envelopes, either one JSON
//! object per line or a JSON array of objects (or a mix of both).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::EventError;

/// User identifier, normalized to a string
pub type UserId = String;

/// Topic (post) identifier, normalized to a string
pub type TopicId = String;

/// Inbound event type tags
pub mod inbound {
    pub const VOTE: &str = "vote";
    pub const COMMENT: &str = "comment";
    pub const REPLY: &str = "reply";
    pub const USER_JOINED: &str = "user_joined";
    pub const USER_LEFT: &str = "user_left";
    pub const ONLINE_USERS: &str = "online_users";
    pub const TYPING: &str = "typing";
    pub const STOP_TYPING: &str = "stop_typing";
}

/// Outbound command type tags
pub mod outbound {
    pub const TYPING: &str = "typing";
    pub const STOP_TYPING: &str = "stop_typing";
}

/// A decoded message with a type tag and opaque payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub data: Value,

    /// Sender identity, filled in by the server for presence and typing events
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_id"
    )]
    pub user_id: Option<UserId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_lenient_timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Create an envelope with just a type and payload
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            user_id: None,
            username: None,
            timestamp: None,
        }
    }

    /// Encode as a single-line JSON text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Sender id from the envelope, falling back to `data.user_id`
    fn sender_id(&self) -> Option<UserId> {
        self.user_id
            .clone()
            .or_else(|| self.data.get("user_id").and_then(id_from_value))
    }

    /// Sender display name from the envelope, falling back to `data.username`
    fn sender_name(&self) -> Option<String> {
        self.username
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| {
                self.data
                    .get("username")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
    }

    /// Topic from `data.topic_id`, or `data.post_id` as older clients send
    fn topic_id(&self) -> Option<TopicId> {
        self.data
            .get("topic_id")
            .and_then(id_from_value)
            .or_else(|| self.data.get("post_id").and_then(id_from_value))
    }
}

/// A remote user currently connected to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUser {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: UserId,

    #[serde(rename = "username", alias = "display_name", default)]
    pub display_name: String,
}

impl OnlineUser {
    pub fn new(id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Typed inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Vote totals changed on a post or comment
    VoteUpdated(Value),
    /// A comment was added
    CommentAdded(Value),
    /// A reply was added
    ReplyAdded(Value),
    /// A user connected
    UserJoined(OnlineUser),
    /// A user's last connection closed
    UserLeft(UserId),
    /// Full list of connected users
    OnlineUsers(Vec<OnlineUser>),
    /// A user started (or keeps) typing in a topic
    TypingStarted {
        topic_id: TopicId,
        user_id: UserId,
        username: String,
    },
    /// A user stopped typing in a topic
    TypingStopped { topic_id: TopicId, user_id: UserId },
}

impl InboundEvent {
    /// Convert an envelope into a typed event
    ///
    /// Returns `Ok(None)` for event types this client does not know about.
    pub fn from_envelope(envelope: Envelope) -> Result<Option<Self>, EventError> {
        let event = match envelope.kind.as_str() {
            inbound::VOTE => Self::VoteUpdated(envelope.data),
            inbound::COMMENT => Self::CommentAdded(envelope.data),
            inbound::REPLY => Self::ReplyAdded(envelope.data),
            inbound::USER_JOINED => {
                let id = envelope
                    .sender_id()
                    .or_else(|| envelope.data.get("id").and_then(id_from_value))
                    .ok_or(EventError::MissingField {
                        kind: inbound::USER_JOINED,
                        field: "user_id",
                    })?;
                let name = envelope.sender_name().unwrap_or_else(|| id.clone());
                Self::UserJoined(OnlineUser::new(id, name))
            }
            inbound::USER_LEFT => {
                let id = envelope
                    .sender_id()
                    .or_else(|| envelope.data.get("id").and_then(id_from_value))
                    .ok_or(EventError::MissingField {
                        kind: inbound::USER_LEFT,
                        field: "user_id",
                    })?;
                Self::UserLeft(id)
            }
            inbound::ONLINE_USERS => {
                let users = match envelope.data {
                    Value::Null => Vec::new(),
                    Value::Array(entries) => entries
                        .into_iter()
                        .filter_map(|entry| match serde_json::from_value::<OnlineUser>(entry) {
                            Ok(user) => Some(user),
                            Err(e) => {
                                warn!("Skipping online_users entry: {}", e);
                                None
                            }
                        })
                        .collect(),
                    data => serde_json::from_value(data).map_err(|source| {
                        EventError::InvalidPayload {
                            kind: inbound::ONLINE_USERS,
                            source,
                        }
                    })?,
                };
                Self::OnlineUsers(users)
            }
            inbound::TYPING => {
                let topic_id = envelope.topic_id().ok_or(EventError::MissingField {
                    kind: inbound::TYPING,
                    field: "topic_id",
                })?;
                let user_id = envelope.sender_id().ok_or(EventError::MissingField {
                    kind: inbound::TYPING,
                    field: "user_id",
                })?;
                let username = envelope.sender_name().unwrap_or_else(|| user_id.clone());
                Self::TypingStarted {
                    topic_id,
                    user_id,
                    username,
                }
            }
            inbound::STOP_TYPING => {
                let topic_id = envelope.topic_id().ok_or(EventError::MissingField {
                    kind: inbound::STOP_TYPING,
                    field: "topic_id",
                })?;
                let user_id = envelope.sender_id().ok_or(EventError::MissingField {
                    kind: inbound::STOP_TYPING,
                    field: "user_id",
                })?;
                Self::TypingStopped { topic_id, user_id }
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }
}

/// Commands this client sends to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Local user is typing in a topic
    Typing { topic_id: TopicId },
    /// Local user stopped typing in a topic
    StopTyping { topic_id: TopicId },
}

impl OutboundCommand {
    /// Wire type tag
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundCommand::Typing { .. } => outbound::TYPING,
            OutboundCommand::StopTyping { .. } => outbound::STOP_TYPING,
        }
    }
}

impl From<OutboundCommand> for Envelope {
    fn from(command: OutboundCommand) -> Self {
        let kind = command.kind();
        match command {
            OutboundCommand::Typing { topic_id } | OutboundCommand::StopTyping { topic_id } => {
                Envelope::new(kind, serde_json::json!({ "topic_id": topic_id }))
            }
        }
    }
}

/// Result of decoding one transport frame
#[derive(Debug, Default)]
pub struct DecodedFrame {
    /// Envelopes in arrival order
    pub envelopes: Vec<Envelope>,
    /// Segments that could not be parsed into an envelope
    pub malformed: usize,
}

/// Decode a raw text frame into envelopes
///
/// The whole payload is tried as one JSON value first so that a
/// pretty-printed array still decodes. Otherwise each non-empty line is
/// parsed on its own; a bad line is logged and skipped.
pub fn decode_frame(payload: &str) -> DecodedFrame {
    let mut frame = DecodedFrame::default();

    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return frame;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        flatten_into(value, &mut frame);
        return frame;
    }

    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(value) => flatten_into(value, &mut frame),
            Err(e) => {
                warn!("Skipping unparseable frame segment: {} ({})", e, line);
                frame.malformed += 1;
            }
        }
    }

    frame
}

fn flatten_into(value: Value, frame: &mut DecodedFrame) {
    match value {
        Value::Array(items) => {
            for item in items {
                push_envelope(item, frame);
            }
        }
        other => push_envelope(other, frame),
    }
}

fn push_envelope(value: Value, frame: &mut DecodedFrame) {
    match serde_json::from_value::<Envelope>(value) {
        Ok(envelope) => frame.envelopes.push(envelope),
        Err(e) => {
            warn!("Skipping segment that is not an envelope: {}", e);
            frame.malformed += 1;
        }
    }
}

/// Normalize a JSON id (string or number) to a string
pub(crate) fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<UserId, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_from_value(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected string or number id, got {}", value)))
}

fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(id_from_value(&value))
}

fn deserialize_lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kinds(frame: &DecodedFrame) -> Vec<&str> {
        frame.envelopes.iter().map(|e| e.kind.as_str()).collect()
    }

    #[test]
    fn test_decode_single_object() {
        let frame = decode_frame(r#"{"type":"vote","data":{"post_id":1}}"#);
        assert_eq!(kinds(&frame), vec!["vote"]);
        assert_eq!(frame.envelopes[0].data, json!({"post_id": 1}));
        assert_eq!(frame.malformed, 0);
    }

    #[test]
    fn test_decode_newline_delimited_preserves_order() {
        let payload = "{\"type\":\"vote\",\"data\":{\"post_id\":1}}\n{\"type\":\"bogus\"}\n{\"type\":\"comment\",\"data\":{\"post_id\":1}}";
        let frame = decode_frame(payload);
        assert_eq!(kinds(&frame), vec!["vote", "bogus", "comment"]);
        assert_eq!(frame.malformed, 0);
    }

    #[test]
    fn test_decode_skips_malformed_line() {
        let payload = "{\"type\":\"vote\",\"data\":{}}\n{not json\n\n{\"type\":\"reply\",\"data\":{}}\n";
        let frame = decode_frame(payload);
        assert_eq!(kinds(&frame), vec!["vote", "reply"]);
        assert_eq!(frame.malformed, 1);
    }

    #[test]
    fn test_decode_array_and_mixed_lines() {
        let payload = concat!(
            r#"[{"type":"user_joined","user_id":"7","username":"ana"},{"type":"vote","data":{}}]"#,
            "\n",
            r#"{"type":"reply","data":{"post_id":"p1"}}"#
        );
        let frame = decode_frame(payload);
        assert_eq!(kinds(&frame), vec!["user_joined", "vote", "reply"]);
    }

    #[test]
    fn test_decode_pretty_printed_array() {
        let payload = "[\n  {\"type\": \"vote\", \"data\": {}},\n  {\"type\": \"comment\", \"data\": {}}\n]";
        let frame = decode_frame(payload);
        assert_eq!(kinds(&frame), vec!["vote", "comment"]);
        assert_eq!(frame.malformed, 0);
    }

    #[test]
    fn test_decode_non_envelope_values_are_malformed() {
        let frame = decode_frame("42\n{\"data\":{}}\n{\"type\":\"vote\"}");
        assert_eq!(kinds(&frame), vec!["vote"]);
        assert_eq!(frame.malformed, 2);
    }

    #[test]
    fn test_decode_empty_payload() {
        let frame = decode_frame("  \n ");
        assert!(frame.envelopes.is_empty());
        assert_eq!(frame.malformed, 0);
    }

    #[test]
    fn test_envelope_accepts_server_fields() {
        let frame = decode_frame(
            r#"{"type":"typing","data":{"post_id":12},"user_id":5,"username":"bo","timestamp":"2024-03-01T10:00:00.123456789Z"}"#,
        );
        let envelope = &frame.envelopes[0];
        assert_eq!(envelope.user_id.as_deref(), Some("5"));
        assert_eq!(envelope.username.as_deref(), Some("bo"));
        assert!(envelope.timestamp.is_some());
    }

    #[test]
    fn test_bad_timestamp_does_not_reject_envelope() {
        let frame = decode_frame(r#"{"type":"vote","data":{},"timestamp":"yesterday"}"#);
        assert_eq!(frame.envelopes.len(), 1);
        assert!(frame.envelopes[0].timestamp.is_none());
    }

    #[test]
    fn test_event_from_typing_envelope() {
        let envelope: Envelope = serde_json::from_value(json!({
            "type": "typing",
            "data": {"topic_id": "p9"},
            "user_id": "u1",
            "username": "ana"
        }))
        .unwrap();

        let event = InboundEvent::from_envelope(envelope).unwrap().unwrap();
        assert_eq!(
            event,
            InboundEvent::TypingStarted {
                topic_id: "p9".to_string(),
                user_id: "u1".to_string(),
                username: "ana".to_string(),
            }
        );
    }

    #[test]
    fn test_typing_without_topic_is_an_error() {
        let envelope = Envelope {
            user_id: Some("u1".to_string()),
            ..Envelope::new(inbound::TYPING, json!({}))
        };
        let err = InboundEvent::from_envelope(envelope).unwrap_err();
        assert!(matches!(
            err,
            EventError::MissingField {
                field: "topic_id",
                ..
            }
        ));
    }

    #[test]
    fn test_stop_typing_reads_post_id() {
        let envelope = Envelope {
            user_id: Some("u1".to_string()),
            ..Envelope::new(inbound::STOP_TYPING, json!({"post_id": 3}))
        };
        let event = InboundEvent::from_envelope(envelope).unwrap().unwrap();
        assert_eq!(
            event,
            InboundEvent::TypingStopped {
                topic_id: "3".to_string(),
                user_id: "u1".to_string(),
            }
        );
    }

    #[test]
    fn test_user_joined_name_falls_back_to_id() {
        let envelope = Envelope {
            user_id: Some("u2".to_string()),
            ..Envelope::new(inbound::USER_JOINED, Value::Null)
        };
        let event = InboundEvent::from_envelope(envelope).unwrap().unwrap();
        assert_eq!(event, InboundEvent::UserJoined(OnlineUser::new("u2", "u2")));
    }

    #[test]
    fn test_online_users_numeric_ids() {
        let envelope = Envelope::new(
            inbound::ONLINE_USERS,
            json!([{"id": 1, "username": "a"}, {"id": "2", "username": "b"}]),
        );
        let event = InboundEvent::from_envelope(envelope).unwrap().unwrap();
        assert_eq!(
            event,
            InboundEvent::OnlineUsers(vec![OnlineUser::new("1", "a"), OnlineUser::new("2", "b")])
        );
    }

    #[test]
    fn test_online_users_skips_entries_without_id() {
        let envelope = Envelope::new(
            inbound::ONLINE_USERS,
            json!([{"id": 1, "username": "a"}, {"username": "ghost"}, {"id": 3, "username": "c"}]),
        );
        let event = InboundEvent::from_envelope(envelope).unwrap().unwrap();
        assert_eq!(
            event,
            InboundEvent::OnlineUsers(vec![OnlineUser::new("1", "a"), OnlineUser::new("3", "c")])
        );
    }

    #[test]
    fn test_online_users_invalid_payload() {
        let envelope = Envelope::new(inbound::ONLINE_USERS, json!({"id": 1}));
        let err = InboundEvent::from_envelope(envelope).unwrap_err();
        assert!(matches!(err, EventError::InvalidPayload { .. }));
    }

    #[test]
    fn test_unknown_event_type() {
        let envelope = Envelope::new("bogus", Value::Null);
        assert!(InboundEvent::from_envelope(envelope).unwrap().is_none());
    }

    #[test]
    fn test_outbound_command_encoding() {
        let envelope: Envelope = OutboundCommand::Typing {
            topic_id: "42".to_string(),
        }
        .into();
        let json = envelope.encode().unwrap();
        assert_eq!(json, r#"{"type":"typing","data":{"topic_id":"42"}}"#);

        let stop: Envelope = OutboundCommand::StopTyping {
            topic_id: "42".to_string(),
        }
        .into();
        assert_eq!(stop.kind, "stop_typing");
    }
}

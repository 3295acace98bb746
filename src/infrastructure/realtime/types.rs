use crate::model::{Conversation, Message, StatusUpdate};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewMessage,
    ConversationUpdate,
    StatusUpdate,
    ConnectionEstablished,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::NewMessage,
        EventKind::ConversationUpdate,
        EventKind::StatusUpdate,
        EventKind::ConnectionEstablished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewMessage => "new_message",
            EventKind::ConversationUpdate => "conversation_update",
            EventKind::StatusUpdate => "status_update",
            EventKind::ConnectionEstablished => "connection_established",
        }
    }
}

/// A classified server push.
#[derive(Debug, Clone, PartialEq)]
pub enum InboxEvent {
    NewMessage(Message),
    ConversationUpdate(Conversation),
    StatusUpdate(StatusUpdate),
    ConnectionEstablished,
}

impl InboxEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InboxEvent::NewMessage(_) => EventKind::NewMessage,
            InboxEvent::ConversationUpdate(_) => EventKind::ConversationUpdate,
            InboxEvent::StatusUpdate(_) => EventKind::StatusUpdate,
            InboxEvent::ConnectionEstablished => EventKind::ConnectionEstablished,
        }
    }
}

fn payload<T: DeserializeOwned>(envelope: &mut Value, field: &str) -> Option<T> {
    let value = envelope.get_mut(field).map(Value::take)?;
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!("Dropping malformed {} payload: {}", field, e);
            None
        }
    }
}

/// Classify one text frame. Unknown types and malformed payloads yield `None`.
pub fn parse_frame(text: &str) -> Option<InboxEvent> {
    let mut envelope: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!("Dropping non-JSON frame: {}", e);
            return None;
        }
    };

    let kind = envelope.get("type").and_then(Value::as_str)?.to_string();
    match kind.as_str() {
        "new_message" => payload(&mut envelope, "message").map(InboxEvent::NewMessage),
        "conversation_update" => {
            payload(&mut envelope, "conversation").map(InboxEvent::ConversationUpdate)
        }
        "status_update" => payload(&mut envelope, "status_update").map(InboxEvent::StatusUpdate),
        "connection_established" => Some(InboxEvent::ConnectionEstablished),
        other => {
            debug!("Ignoring frame of unknown type {}", other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeliveryStatus;

    #[test]
    fn parses_new_message_frame() {
        let frame = r#"{"type":"new_message","message":{
            "id":"m1","conversation_id":"c1","direction":"incoming",
            "message_type":"text","body":"hola","delivery_status":"delivered",
            "created_at":"2024-05-01T10:00:00Z","contact_name":"Ana","contact_phone":"57300"
        }}"#;

        let Some(InboxEvent::NewMessage(msg)) = parse_frame(frame) else {
            panic!("expected a new_message event");
        };
        assert_eq!(msg.conversation_id, "c1");
        assert_eq!(msg.body.as_deref(), Some("hola"));
    }

    #[test]
    fn parses_status_update_and_handshake() {
        let status = parse_frame(
            r#"{"type":"status_update","status_update":{"message_id":"abc","delivery_status":"read"}}"#,
        );
        assert_eq!(
            status,
            Some(InboxEvent::StatusUpdate(StatusUpdate {
                message_id: "abc".into(),
                delivery_status: DeliveryStatus::Read,
            }))
        );

        let hello = parse_frame(
            r#"{"type":"connection_established","message":"Connected to inbox updates"}"#,
        );
        assert_eq!(hello.map(|e| e.kind()), Some(EventKind::ConnectionEstablished));
    }

    #[test]
    fn drops_unknown_and_malformed_frames() {
        assert_eq!(parse_frame("not json"), None);
        assert_eq!(parse_frame(r#"{"type":"typing","who":"x"}"#), None);
        assert_eq!(parse_frame(r#"{"message":{}}"#), None);
        assert_eq!(
            parse_frame(r#"{"type":"new_message","message":{"id":"m1"}}"#),
            None
        );
        assert_eq!(
            parse_frame(r#"{"type":"status_update","status_update":{"message_id":"x","delivery_status":"lost"}}"#),
            None
        );
    }
}

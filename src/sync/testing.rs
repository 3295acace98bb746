//! Fixtures shared by the reducer and runtime tests.

use crate::model::{
    ContactSummary, Conversation, ConversationStatus, DeliveryStatus, Direction, Message,
    MessageType,
};
use chrono::{DateTime, Duration, TimeZone, Utc};

pub fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::minutes(minute)
}

pub fn conversation(id: &str, unread: u32, last_at: Option<DateTime<Utc>>) -> Conversation {
    Conversation {
        id: id.to_string(),
        contact: ContactSummary {
            id: format!("contact-{}", id),
            name: format!("Contact {}", id),
            phone_number: "573000000000".into(),
            profile_picture_url: None,
        },
        account_id: Some("acc-1".into()),
        account_name: Some("Main line".into()),
        status: ConversationStatus::Open,
        last_message: None,
        last_message_at: last_at,
        unread_count: unread,
        can_send_free_message: true,
        last_incoming_message_at: Some(Utc::now()),
        created_at: Some(at(0)),
    }
}

pub fn message(id: &str, conversation_id: &str, direction: Direction, created_at: DateTime<Utc>) -> Message {
    Message {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        direction,
        message_type: MessageType::Text,
        body: Some(format!("body of {}", id)),
        media_url: None,
        delivery_status: DeliveryStatus::Sent,
        created_at,
        metadata: serde_json::Value::Null,
    }
}

pub fn incoming(id: &str, conversation_id: &str, created_at: DateTime<Utc>) -> Message {
    let mut msg = message(id, conversation_id, Direction::Incoming, created_at);
    msg.delivery_status = DeliveryStatus::Delivered;
    msg
}

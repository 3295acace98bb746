use crate::model::{Conversation, Message};
use serde::Deserialize;

/// Server page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Largest page the backend will return.
pub const MAX_PAGE_SIZE: u32 = 100;

/// One page of message history, newest first on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePage {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub results: Vec<Message>,
}

impl MessagePage {
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }

    pub(crate) fn stamp_conversation(&mut self, conversation_id: &str) {
        for msg in &mut self.results {
            if msg.conversation_id.is_empty() {
                msg.conversation_id = conversation_id.to_string();
            }
        }
    }
}

/// The conversation endpoint answers with either a bare array or a page envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ConversationListing {
    Plain(Vec<Conversation>),
    Paged { results: Vec<Conversation> },
}

impl ConversationListing {
    pub fn into_vec(self) -> Vec<Conversation> {
        match self {
            ConversationListing::Plain(v) => v,
            ConversationListing::Paged { results } => results,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MarkReadResult {
    pub marked_as_read: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_listing_shapes() {
        let conv = serde_json::json!({
            "id": "c1",
            "contact": {"id": "k1", "name": "Ana", "phone_number": "57300"},
            "unread_count": 3
        });

        let plain: ConversationListing =
            serde_json::from_value(serde_json::json!([conv.clone()])).unwrap();
        let paged: ConversationListing = serde_json::from_value(serde_json::json!({
            "count": 1, "next": null, "previous": null, "results": [conv]
        }))
        .unwrap();

        assert_eq!(plain.into_vec()[0].unread_count, 3);
        assert_eq!(paged.into_vec()[0].id, "c1");
    }

    #[test]
    fn stamps_missing_conversation_ids() {
        let mut page: MessagePage = serde_json::from_value(serde_json::json!({
            "count": 1,
            "next": "http://host/api/chat/messages/by_conversation/?page=2",
            "results": [{
                "id": "m1", "direction": "outgoing", "message_type": "text",
                "body": "ok", "delivery_status": "sent",
                "created_at": "2024-05-01T10:00:00Z"
            }]
        }))
        .unwrap();

        page.stamp_conversation("c9");

        assert!(page.has_more());
        assert_eq!(page.results[0].conversation_id, "c9");
    }
}

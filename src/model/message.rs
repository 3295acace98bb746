use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of client-generated ids for optimistic sends.
pub const TEMP_ID_PREFIX: &str = "temp-";

const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Location,
    Contacts,
    Template,
    Interactive,
    /// Any type the backend stores that this client does not render.
    #[serde(other)]
    Unknown,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Audio => "audio",
            MessageType::Document => "document",
            MessageType::Sticker => "sticker",
            MessageType::Location => "location",
            MessageType::Contacts => "contacts",
            MessageType::Template => "template",
            MessageType::Interactive => "interactive",
            MessageType::Unknown => "unknown",
        }
    }

    pub fn is_media(&self) -> bool {
        matches!(
            self,
            MessageType::Image
                | MessageType::Video
                | MessageType::Audio
                | MessageType::Document
                | MessageType::Sticker
        )
    }
}

/// Delivery lifecycle of a single message.
///
/// The normal path is `Pending -> Sent -> Delivered -> Read`; `Failed` is only
/// entered locally from `Pending` when the REST send fails. Statuses coming from
/// the server are applied as received, in whatever order they arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    #[default]
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
            DeliveryStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub conversation_id: String,
    pub direction: Direction,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub delivery_status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

impl Message {
    pub fn is_incoming(&self) -> bool {
        self.direction == Direction::Incoming
    }

    pub fn is_temporary(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }

    pub fn ai_generated(&self) -> bool {
        self.metadata
            .get("ai_generated")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Inbox preview text: the body for text messages, `[TYPE]` otherwise.
    pub fn preview(&self) -> Option<String> {
        match self.message_type {
            MessageType::Text => self
                .body
                .as_deref()
                .filter(|b| !b.is_empty())
                .map(|b| b.chars().take(PREVIEW_CHARS).collect()),
            other => Some(format!("[{}]", other.as_str().to_uppercase())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub message_id: String,
    pub delivery_status: DeliveryStatus,
}

/// Content of a message the user is about to send.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageDraft {
    Text {
        body: String,
    },
    Media {
        media_type: MessageType,
        media_url: String,
        caption: Option<String>,
    },
    Template {
        name: String,
        language: String,
        components: Vec<Value>,
    },
}

impl MessageDraft {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageDraft::Text { .. } => MessageType::Text,
            MessageDraft::Media { media_type, .. } => *media_type,
            MessageDraft::Template { .. } => MessageType::Template,
        }
    }

    /// Free-form content is only allowed while the 24-hour window is open.
    pub fn requires_open_window(&self) -> bool {
        !matches!(self, MessageDraft::Template { .. })
    }

    /// Build the locally rendered copy shown until the server confirms.
    pub fn to_pending_message(&self, conversation_id: &str, created_at: DateTime<Utc>) -> Message {
        let (body, media_url, metadata) = match self {
            MessageDraft::Text { body } => (Some(body.clone()), None, Value::Null),
            MessageDraft::Media {
                media_url, caption, ..
            } => (caption.clone(), Some(media_url.clone()), Value::Null),
            MessageDraft::Template {
                name,
                language,
                components,
            } => (
                Some(format!("[Template: {}]", name)),
                None,
                serde_json::json!({
                    "template_name": name,
                    "template_language": language,
                    "components": components,
                }),
            ),
        };

        Message {
            id: format!("{}{}", TEMP_ID_PREFIX, uuid::Uuid::new_v4()),
            conversation_id: conversation_id.to_string(),
            direction: Direction::Outgoing,
            message_type: self.message_type(),
            body,
            media_url,
            delivery_status: DeliveryStatus::Pending,
            created_at,
            metadata,
        }
    }
}

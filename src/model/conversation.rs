use super::message::Message;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Hours after the customer's last message during which free-form replies are allowed.
pub const FREE_MESSAGE_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Open,
    Pending,
    Resolved,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub phone_number: String,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

impl ContactSummary {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.phone_number
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub contact: ContactSummary,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub status: ConversationStatus,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub can_send_free_message: bool,
    #[serde(default)]
    pub last_incoming_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn display_name(&self) -> &str {
        self.contact.display_name()
    }

    pub fn window_open_at(&self, now: DateTime<Utc>) -> bool {
        self.last_incoming_message_at
            .is_some_and(|at| now < at + Duration::hours(FREE_MESSAGE_WINDOW_HOURS))
    }

    /// Whether free-form content may be sent at `now`. Falls back to the
    /// server's flag when no incoming message time is known.
    pub fn free_messaging_open(&self, now: DateTime<Utc>) -> bool {
        match self.last_incoming_message_at {
            Some(_) => self.window_open_at(now),
            None => self.can_send_free_message,
        }
    }

    /// Fold a live message into the denormalized preview fields.
    pub fn record_message(&mut self, message: &Message) {
        self.last_message = message.preview();
        self.last_message_at = Some(message.created_at);

        if message.is_incoming() {
            self.last_incoming_message_at = Some(message.created_at);
            self.can_send_free_message = self.window_open_at(Utc::now());
        }
    }
}

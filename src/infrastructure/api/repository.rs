use super::error::ApiError;
use super::types::MessagePage;
use crate::model::{ContactSummary, Conversation, Message, MessageType};
use async_trait::async_trait;
use serde_json::Value;

/// REST collaborator consumed by the inbox. Every call is an opaque
/// request/response returning the entity shapes of [`crate::model`].
#[async_trait]
pub trait InboxRepository: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError>;
    async fn list_messages(
        &self,
        conversation_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<MessagePage, ApiError>;

    async fn send_text(&self, conversation_id: &str, body: &str) -> Result<Message, ApiError>;
    async fn send_media(
        &self,
        conversation_id: &str,
        media_type: MessageType,
        media_url: &str,
        caption: Option<&str>,
    ) -> Result<Message, ApiError>;
    async fn send_template(
        &self,
        conversation_id: &str,
        name: &str,
        language: &str,
        components: &[Value],
    ) -> Result<Message, ApiError>;

    async fn mark_as_read(&self, conversation_id: &str) -> Result<u64, ApiError>;
    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError>;
    async fn update_contact(&self, contact_id: &str, name: &str) -> Result<ContactSummary, ApiError>;
}

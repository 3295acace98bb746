use super::error::ApiError;
use super::repository::InboxRepository;
use super::types::{ConversationListing, MAX_PAGE_SIZE, MarkReadResult, MessagePage};
use crate::model::{ContactSummary, Conversation, Message, MessageType};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub struct RestClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl RestClient {
    pub fn new(mut base: Url, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base, token })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute<R: DeserializeOwned>(&self, request: RequestBuilder) -> Result<R, ApiError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let url = response.url().to_string();
        let body = response.text().await?;

        debug!("{} -> {}", url, status);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(ApiError::Unauthorized),
            StatusCode::NOT_FOUND => return Err(ApiError::NotFound(url)),
            s if !s.is_success() => {
                warn!("Request to {} failed with {}", url, s);
                return Err(ApiError::Status {
                    status: s.as_u16(),
                    body,
                });
            }
            _ => {}
        }

        if body.trim().is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn post<P, R>(&self, path: &str, params: &P) -> Result<R, ApiError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        self.execute(self.http.post(url).json(params)).await
    }

    async fn post_message<P>(&self, conversation_id: &str, action: &str, params: &P) -> Result<Message, ApiError>
    where
        P: Serialize + ?Sized,
    {
        let path = format!("api/chat/messages/{}/{}/", conversation_id, action);
        let mut message: Message = self.post(&path, params).await?;
        if message.conversation_id.is_empty() {
            message.conversation_id = conversation_id.to_string();
        }
        Ok(message)
    }
}

#[async_trait]
impl InboxRepository for RestClient {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let url = self.endpoint("api/chat/conversations/")?;
        let listing: ConversationListing = self.execute(self.http.get(url)).await?;
        Ok(listing.into_vec())
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<MessagePage, ApiError> {
        let mut url = self.endpoint("api/chat/messages/by_conversation/")?;
        url.query_pairs_mut()
            .append_pair("conversation", conversation_id)
            .append_pair("page", &page.max(1).to_string())
            .append_pair("page_size", &page_size.clamp(1, MAX_PAGE_SIZE).to_string());

        let mut page: MessagePage = self.execute(self.http.get(url)).await?;
        page.stamp_conversation(conversation_id);
        Ok(page)
    }

    async fn send_text(&self, conversation_id: &str, body: &str) -> Result<Message, ApiError> {
        #[derive(Serialize)]
        struct Params<'a> {
            message: &'a str,
        }

        self.post_message(conversation_id, "send_text", &Params { message: body })
            .await
    }

    async fn send_media(
        &self,
        conversation_id: &str,
        media_type: MessageType,
        media_url: &str,
        caption: Option<&str>,
    ) -> Result<Message, ApiError> {
        #[derive(Serialize)]
        struct Params<'a> {
            media_type: &'a str,
            media_url: &'a str,
            caption: &'a str,
        }

        self.post_message(
            conversation_id,
            "send_media",
            &Params {
                media_type: media_type.as_str(),
                media_url,
                caption: caption.unwrap_or_default(),
            },
        )
        .await
    }

    async fn send_template(
        &self,
        conversation_id: &str,
        name: &str,
        language: &str,
        components: &[Value],
    ) -> Result<Message, ApiError> {
        #[derive(Serialize)]
        struct Params<'a> {
            template_name: &'a str,
            template_language: &'a str,
            components: &'a [Value],
        }

        self.post_message(
            conversation_id,
            "send_template",
            &Params {
                template_name: name,
                template_language: language,
                components,
            },
        )
        .await
    }

    async fn mark_as_read(&self, conversation_id: &str) -> Result<u64, ApiError> {
        let path = format!("api/chat/messages/{}/mark_as_read/", conversation_id);
        let result: MarkReadResult = self.post(&path, &serde_json::json!({})).await?;
        Ok(result.marked_as_read)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("api/chat/conversations/{}/", conversation_id))?;
        let _: Value = self.execute(self.http.delete(url)).await?;
        Ok(())
    }

    async fn update_contact(&self, contact_id: &str, name: &str) -> Result<ContactSummary, ApiError> {
        #[derive(Serialize)]
        struct Params<'a> {
            name: &'a str,
        }

        let url = self.endpoint(&format!("api/contacts/contacts/{}/", contact_id))?;
        self.execute(self.http.patch(url).json(&Params { name })).await
    }
}

//! Thin reqwest wrapper over the conversation endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use tutorhub_chats::{
    ChatResult, Conversation, ConversationSource, HistorySource, Message, MessageSink,
    SendMessageRequest,
};
use tutorhub_realtime::TokenProvider;

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct MessageEnvelope {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct ConversationList {
    #[serde(default)]
    conversations: Vec<Conversation>,
}

/// REST client for one API base URL, authenticated with the current token.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        tokens: Arc<dyn TokenProvider>,
    ) -> ApiResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One page of history, newest message first.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn fetch_messages(
        &self,
        conversation_id: &str,
        page: u32,
        page_size: u32,
    ) -> ApiResult<Vec<Message>> {
        let request = self
            .http
            .get(self.url(&format!("conversations/{conversation_id}/messages")))
            .query(&[("page", page), ("page_size", page_size)]);

        let body: MessagePage = read_json(self.authorize(request).send().await?).await?;
        debug!(count = body.messages.len(), "fetched message page");
        Ok(body.messages)
    }

    #[instrument(skip(self, request), fields(base_url = %self.base_url))]
    pub async fn post_message(
        &self,
        conversation_id: &str,
        request: &SendMessageRequest,
    ) -> ApiResult<Message> {
        let builder = self
            .http
            .post(self.url(&format!("conversations/{conversation_id}/messages")))
            .json(request);

        let body: MessageEnvelope = read_json(self.authorize(builder).send().await?).await?;
        debug!(message_id = %body.message.id, "message stored");
        Ok(body.message)
    }

    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn conversations(&self) -> ApiResult<Vec<Conversation>> {
        let request = self.http.get(self.url("conversations"));
        let body: ConversationList = read_json(self.authorize(request).send().await?).await?;
        debug!(count = body.conversations.len(), "fetched conversations");
        Ok(body.conversations)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(serde_json::from_str(&body)?)
}

#[async_trait]
impl HistorySource for ApiClient {
    async fn fetch_page(
        &self,
        conversation_id: &str,
        page: u32,
        page_size: u32,
    ) -> ChatResult<Vec<Message>> {
        Ok(self
            .fetch_messages(conversation_id, page, page_size)
            .await?)
    }
}

#[async_trait]
impl MessageSink for ApiClient {
    async fn send_message(
        &self,
        conversation_id: &str,
        request: &SendMessageRequest,
    ) -> ChatResult<Message> {
        Ok(self.post_message(conversation_id, request).await?)
    }
}

#[async_trait]
impl ConversationSource for ApiClient {
    async fn list_conversations(&self) -> ChatResult<Vec<Conversation>> {
        Ok(self.conversations().await?)
    }
}

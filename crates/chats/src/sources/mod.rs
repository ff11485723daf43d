//! Seams between the chat state and whatever serves it.
//!
//! `tutorhub-api` implements these over REST; tests use in-memory fakes.

use async_trait::async_trait;

use crate::entities::{Conversation, Message, SendMessageRequest};
use crate::types::ChatResult;

/// Paged message history, newest page first.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetch page `page` (1-based) of at most `page_size` messages, newest first.
    async fn fetch_page(
        &self,
        conversation_id: &str,
        page: u32,
        page_size: u32,
    ) -> ChatResult<Vec<Message>>;
}

/// Accepts outgoing messages and returns the stored copy.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_message(
        &self,
        conversation_id: &str,
        request: &SendMessageRequest,
    ) -> ChatResult<Message>;
}

/// Lists the conversations visible to the signed-in user.
#[async_trait]
pub trait ConversationSource: Send + Sync {
    async fn list_conversations(&self) -> ChatResult<Vec<Conversation>>;
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::ids::{opt_string_or_number, string_or_number};
use crate::types::{MessageId, UserId};

/// Prefix carried by ids of optimistic entries that the server has not confirmed yet.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// A message as rendered in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Server-assigned id, or a `local-` id while the send is pending
    #[serde(deserialize_with = "string_or_number")]
    pub id: MessageId,
    /// Role of the sender
    pub sender: MessageRole,
    /// Message body
    pub content: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Set when a human sent the message
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "opt_string_or_number"
    )]
    pub sender_user_id: Option<UserId>,
    /// Set when an assistant sent the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_assistant_id: Option<String>,
    /// Message this one answers
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "opt_string_or_number"
    )]
    pub reply_to_message_id: Option<MessageId>,
    /// Short excerpt of the message being answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_brief: Option<String>,
    /// Client-side delivery state, never sent over the wire
    #[serde(skip)]
    pub delivery: Delivery,
}

/// Message role enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl From<&str> for MessageRole {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "assistant" | "ai" | "bot" => MessageRole::Assistant,
            "system" => MessageRole::System,
            _ => MessageRole::User,
        }
    }
}

impl From<String> for MessageRole {
    fn from(s: String) -> Self {
        MessageRole::from(s.as_str())
    }
}

impl From<MessageRole> for String {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => "user".to_string(),
            MessageRole::Assistant => "assistant".to_string(),
            MessageRole::System => "system".to_string(),
        }
    }
}

/// Where a message stands from the client's point of view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Delivery {
    /// Fetched from history, pushed by the server, or acknowledged after a send
    #[default]
    Confirmed,
    /// Appended optimistically, waiting for the server
    Pending,
    /// The server rejected the send or could not be reached
    Failed,
}

/// Body of a send-message request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "opt_string_or_number"
    )]
    pub reply_to_message_id: Option<MessageId>,
}

impl SendMessageRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reply_to_message_id: None,
        }
    }

    pub fn replying_to(mut self, message_id: impl Into<MessageId>) -> Self {
        self.reply_to_message_id = Some(message_id.into());
        self
    }
}

impl Message {
    /// Build the optimistic entry shown while a send is in flight.
    pub fn pending(local_user_id: &str, request: &SendMessageRequest) -> Self {
        Self {
            id: format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()),
            sender: MessageRole::User,
            content: request.content.clone(),
            timestamp: Utc::now(),
            sender_user_id: Some(local_user_id.to_string()),
            sender_assistant_id: None,
            reply_to_message_id: request.reply_to_message_id.clone(),
            reply_to_brief: None,
            delivery: Delivery::Pending,
        }
    }

    /// Whether the id was minted locally.
    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn is_pending(&self) -> bool {
        self.delivery == Delivery::Pending
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self.sender, MessageRole::Assistant)
    }
}

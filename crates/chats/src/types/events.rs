//! Live events pushed over the user socket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{opt_string_or_number, string_or_number};
use super::{ChatError, ChatResult, ConversationId, MessageId, UserId};
use crate::entities::{Delivery, Message, MessageRole};

/// A message pushed for one of the user's conversations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationEvent {
    #[serde(deserialize_with = "string_or_number")]
    pub conversation_id: ConversationId,
    pub content: String,
    /// Role name or user id of the sender, depending on the producer
    pub sender: String,
    #[serde(default)]
    pub invocation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, alias = "id", deserialize_with = "opt_string_or_number")]
    pub message_id: Option<MessageId>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub sender_user_id: Option<UserId>,
    #[serde(default)]
    pub sender_assistant_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub reply_to_message_id: Option<MessageId>,
}

impl ConversationEvent {
    /// Decode a payload forwarded by the connection manager.
    pub fn from_value(value: Value) -> ChatResult<Self> {
        serde_json::from_value(value).map_err(ChatError::from)
    }

    /// Identity used for de-duplication.
    ///
    /// Prefers the server message id, then the assistant invocation id, and
    /// finally sender plus timestamp for producers that send neither.
    pub fn dedup_key(&self) -> MessageId {
        if let Some(id) = &self.message_id {
            return id.clone();
        }
        if let Some(invocation) = &self.invocation_id {
            return invocation.clone();
        }
        format!("{}:{}", self.sender, self.timestamp.to_rfc3339())
    }

    /// Whether the local user produced this event.
    pub fn is_from(&self, user_id: &str) -> bool {
        match &self.sender_user_id {
            Some(sender) => sender == user_id,
            None => self.sender == user_id,
        }
    }

    pub fn belongs_to(&self, conversation_id: &str) -> bool {
        self.conversation_id == conversation_id
    }

    /// Convert into a renderable message.
    pub fn to_message(&self) -> Message {
        let sender = if self.sender_assistant_id.is_some() {
            MessageRole::Assistant
        } else {
            MessageRole::from(self.sender.as_str())
        };

        Message {
            id: self.dedup_key(),
            sender,
            content: self.content.clone(),
            timestamp: self.timestamp,
            sender_user_id: self.sender_user_id.clone(),
            sender_assistant_id: self.sender_assistant_id.clone(),
            reply_to_message_id: self.reply_to_message_id.clone(),
            reply_to_brief: None,
            delivery: Delivery::Confirmed,
        }
    }
}

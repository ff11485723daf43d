use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ids::{opt_string_or_number, string_or_number};
use crate::types::{ConversationId, UserId};

/// A conversation as listed for the signed-in user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    #[serde(deserialize_with = "string_or_number")]
    pub id: ConversationId,
    #[serde(rename = "type", alias = "conversation_type")]
    pub kind: ConversationType,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
}

/// Kind of conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    /// One-to-one with another user or an assistant
    Dm,
    Group,
    /// Thread scoped to an instructional goal
    #[serde(alias = "learning-topic")]
    LearningTopic,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub assistant_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Preview of the newest message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastMessage {
    pub content: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
}

impl Conversation {
    /// Time of the newest known activity, if any.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_message.as_ref().map(|message| message.timestamp)
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants
            .iter()
            .any(|participant| participant.user_id.as_deref() == Some(user_id))
    }
}

//! Shared types for the chat client.

pub mod errors;
pub mod events;
pub(crate) mod ids;

pub use errors::{ChatError, ChatResult};
pub use events::ConversationEvent;

pub type ConversationId = String;
pub type MessageId = String;
pub type UserId = String;

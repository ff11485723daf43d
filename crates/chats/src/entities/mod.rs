//! Domain entities for the chat client.
//!
//! Client-side mirrors of what the backend serves. The server owns them;
//! the client only caches and renders.

pub mod conversation;
pub mod message;

pub use conversation::{Conversation, ConversationType, LastMessage, Participant};
pub use message::{Delivery, Message, MessageRole, SendMessageRequest, LOCAL_ID_PREFIX};

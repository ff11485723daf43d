//! # Tutorhub Chats Crate
//!
//! Client-side chat logic for Tutorhub: the entities the backend serves,
//! decoding of live socket events, and the state a chat view keeps.
//!
//! ## Architecture
//!
//! - **Entities**: `Message`, `Conversation`
//! - **Types**: errors, ids, `ConversationEvent`
//! - **Sources**: traits the REST client implements
//! - **Services**: `Timeline`, `ConversationCache`, `DraftStore`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tutorhub_chats::{ConversationEvent, Timeline};
//!
//! let mut timeline = Timeline::new(conversation_id, user_id, 20);
//! timeline.load_initial(&api).await?;
//! timeline.apply_event(&ConversationEvent::from_value(payload)?);
//! ```

pub mod entities;
pub mod services;
pub mod sources;
pub mod types;

pub use entities::{
    Conversation, ConversationType, Delivery, LastMessage, Message, MessageRole, Participant,
    SendMessageRequest,
};
pub use services::{
    ConversationCache, DraftStore, EventOutcome, LoadMore, PendingSend, Timeline,
};
pub use sources::{ConversationSource, HistorySource, MessageSink};
pub use types::{ChatError, ChatResult, ConversationEvent, ConversationId, MessageId, UserId};

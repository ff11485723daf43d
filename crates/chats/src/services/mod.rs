//! Client-side chat state.
//!
//! - `timeline`: the ascending, de-duplicated message list of the open conversation
//! - `conversation_cache`: the user's conversations, refetched on demand
//! - `drafts`: unsent text per conversation, persisted with debounced writes

pub mod conversation_cache;
pub mod drafts;
pub mod timeline;

pub use conversation_cache::ConversationCache;
pub use drafts::DraftStore;
pub use timeline::{EventOutcome, LoadMore, PendingSend, Timeline};

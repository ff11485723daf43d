//! Read-mostly copy of the user's conversation list.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::entities::{Conversation, LastMessage};
use crate::sources::ConversationSource;
use crate::types::{ChatResult, ConversationEvent, ConversationId};

#[derive(Debug, Default)]
pub struct ConversationCache {
    entries: HashMap<ConversationId, Conversation>,
    refreshed_at: Option<DateTime<Utc>>,
    stale: bool,
}

impl ConversationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True before the first refresh and after any invalidation.
    pub fn is_stale(&self) -> bool {
        self.stale || self.refreshed_at.is_none()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Refetch everything from `source`, replacing the cached copy.
    pub async fn refresh<S>(&mut self, source: &S) -> ChatResult<usize>
    where
        S: ConversationSource + ?Sized,
    {
        let conversations = source.list_conversations().await?;

        self.entries = conversations
            .into_iter()
            .map(|conversation| (conversation.id.clone(), conversation))
            .collect();
        self.refreshed_at = Some(Utc::now());
        self.stale = false;

        debug!(count = self.entries.len(), "refreshed conversation cache");
        Ok(self.entries.len())
    }

    /// Refresh only when stale.
    pub async fn ensure_fresh<S>(&mut self, source: &S) -> ChatResult<()>
    where
        S: ConversationSource + ?Sized,
    {
        if self.is_stale() {
            self.refresh(source).await?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.entries.get(id)
    }

    /// Most recently active first; conversations without messages go last.
    pub fn list(&self) -> Vec<&Conversation> {
        let mut conversations: Vec<&Conversation> = self.entries.values().collect();
        conversations.sort_by(|a, b| {
            b.last_activity()
                .cmp(&a.last_activity())
                .then_with(|| a.id.cmp(&b.id))
        });
        conversations
    }

    /// Fold a live event into the cached preview.
    ///
    /// Returns `false` and invalidates when the conversation is not cached,
    /// which is how a new conversation triggers a refetch.
    pub fn record_event(&mut self, event: &ConversationEvent) -> bool {
        let Some(conversation) = self.entries.get_mut(&event.conversation_id) else {
            self.invalidate();
            return false;
        };

        let newer = conversation
            .last_activity()
            .map_or(true, |current| current <= event.timestamp);
        if newer {
            conversation.last_message = Some(LastMessage {
                content: event.content.clone(),
                sender: event.sender.clone(),
                timestamp: event.timestamp,
            });
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ConversationType;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn conversation(id: &str, minute: Option<u32>) -> Conversation {
        Conversation {
            id: id.to_string(),
            kind: ConversationType::Dm,
            title: None,
            participants: Vec::new(),
            last_message: minute.map(|minute| LastMessage {
                content: format!("last in {id}"),
                sender: "assistant".into(),
                timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 9, minute, 0).unwrap(),
            }),
        }
    }

    struct FakeConversations {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConversationSource for FakeConversations {
        async fn list_conversations(&self) -> ChatResult<Vec<Conversation>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                conversation("a", Some(5)),
                conversation("b", Some(30)),
                conversation("c", None),
            ])
        }
    }

    fn event(conversation_id: &str, minute: u32) -> ConversationEvent {
        ConversationEvent {
            conversation_id: conversation_id.into(),
            content: "new".into(),
            sender: "u2".into(),
            invocation_id: None,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 9, minute, 0).unwrap(),
            message_id: Some("m".into()),
            sender_user_id: None,
            sender_assistant_id: None,
            reply_to_message_id: None,
        }
    }

    #[tokio::test]
    async fn ensure_fresh_only_fetches_when_stale() {
        let source = FakeConversations {
            calls: AtomicUsize::new(0),
        };
        let mut cache = ConversationCache::new();
        assert!(cache.is_stale());

        cache.ensure_fresh(&source).await.unwrap();
        cache.ensure_fresh(&source).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        cache.invalidate();
        cache.ensure_fresh(&source).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn list_orders_by_recent_activity() {
        let source = FakeConversations {
            calls: AtomicUsize::new(0),
        };
        let mut cache = ConversationCache::new();
        cache.refresh(&source).await.unwrap();

        let order: Vec<&str> = cache.list().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);

        assert!(cache.record_event(&event("a", 45)));
        let order: Vec<&str> = cache.list().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(cache.get("a").unwrap().last_message.as_ref().unwrap().content, "new");
    }

    #[tokio::test]
    async fn event_for_unknown_conversation_invalidates() {
        let source = FakeConversations {
            calls: AtomicUsize::new(0),
        };
        let mut cache = ConversationCache::new();
        cache.refresh(&source).await.unwrap();
        assert!(!cache.is_stale());

        assert!(!cache.record_event(&event("zzz", 1)));
        assert!(cache.is_stale());
    }

    #[tokio::test]
    async fn older_event_does_not_replace_preview() {
        let source = FakeConversations {
            calls: AtomicUsize::new(0),
        };
        let mut cache = ConversationCache::new();
        cache.refresh(&source).await.unwrap();

        cache.record_event(&event("b", 1));
        assert_eq!(
            cache.get("b").unwrap().last_message.as_ref().unwrap().content,
            "last in b"
        );
    }
}

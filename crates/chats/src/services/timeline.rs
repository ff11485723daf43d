//! Ascending message list for one open conversation.
//!
//! History arrives newest-first in pages and is reversed before display.
//! Live events and optimistic sends are merged into the same list, and every
//! server id is remembered so a message never shows up twice.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::entities::{Delivery, Message, SendMessageRequest};
use crate::sources::{HistorySource, MessageSink};
use crate::types::{ChatError, ChatResult, ConversationEvent, ConversationId, MessageId, UserId};

/// What `apply_event` did with a live event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Appended,
    /// Event for a conversation that is not open
    OtherConversation,
    /// Echo of something the local user sent
    OwnEcho,
    /// Already rendered
    Duplicate,
}

/// Result of fetching an older page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadMore {
    /// Entries inserted at the top; the view shifts its scroll offset by this many
    pub prepended: usize,
    /// No older history remains
    pub exhausted: bool,
}

/// An optimistic entry awaiting the server
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub local_id: MessageId,
    pub request: SendMessageRequest,
}

#[derive(Debug)]
pub struct Timeline {
    conversation_id: ConversationId,
    local_user_id: UserId,
    page_size: u32,
    messages: Vec<Message>,
    seen: HashSet<MessageId>,
    next_page: u32,
    exhausted: bool,
}

impl Timeline {
    pub fn new(
        conversation_id: impl Into<ConversationId>,
        local_user_id: impl Into<UserId>,
        page_size: u32,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            local_user_id: local_user_id.into(),
            page_size: page_size.max(1),
            messages: Vec::new(),
            seen: HashSet::new(),
            next_page: 1,
            exhausted: false,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Messages in display order, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Replace the list with the newest page of history.
    ///
    /// Sends still awaiting the server stay at the end of the list so they
    /// can be confirmed or failed afterwards.
    pub async fn load_initial<S>(&mut self, source: &S) -> ChatResult<usize>
    where
        S: HistorySource + ?Sized,
    {
        let page = source
            .fetch_page(&self.conversation_id, 1, self.page_size)
            .await?;

        self.exhausted = page.len() < self.page_size as usize;
        self.next_page = 2;
        self.seen.clear();
        let in_flight: Vec<Message> = self
            .messages
            .drain(..)
            .filter(Message::is_pending)
            .collect();

        for message in page.into_iter().rev() {
            if self.seen.insert(message.id.clone()) {
                self.messages.push(message);
            }
        }
        self.messages.extend(in_flight);

        debug!(
            conversation_id = %self.conversation_id,
            count = self.messages.len(),
            exhausted = self.exhausted,
            "loaded initial history"
        );
        Ok(self.messages.len())
    }

    /// Prepend the next older page, skipping anything already shown.
    pub async fn load_more<S>(&mut self, source: &S) -> ChatResult<LoadMore>
    where
        S: HistorySource + ?Sized,
    {
        if self.exhausted {
            return Ok(LoadMore {
                prepended: 0,
                exhausted: true,
            });
        }

        let page = source
            .fetch_page(&self.conversation_id, self.next_page, self.page_size)
            .await?;

        self.next_page += 1;
        self.exhausted = page.len() < self.page_size as usize;

        let mut older = Vec::with_capacity(page.len());
        for message in page.into_iter().rev() {
            if self.seen.insert(message.id.clone()) {
                older.push(message);
            }
        }

        let prepended = older.len();
        if prepended > 0 {
            older.append(&mut self.messages);
            self.messages = older;
        }

        debug!(
            conversation_id = %self.conversation_id,
            page = self.next_page - 1,
            prepended,
            exhausted = self.exhausted,
            "loaded older history"
        );
        Ok(LoadMore {
            prepended,
            exhausted: self.exhausted,
        })
    }

    /// Merge a live event pushed over the socket.
    pub fn apply_event(&mut self, event: &ConversationEvent) -> EventOutcome {
        if !event.belongs_to(&self.conversation_id) {
            return EventOutcome::OtherConversation;
        }
        if event.is_from(&self.local_user_id) {
            return EventOutcome::OwnEcho;
        }

        let message = event.to_message();
        if !self.seen.insert(message.id.clone()) {
            return EventOutcome::Duplicate;
        }

        self.messages.push(message);
        EventOutcome::Appended
    }

    /// Append the optimistic entry for an outgoing message.
    pub fn begin_send(&mut self, request: SendMessageRequest) -> ChatResult<PendingSend> {
        if request.content.trim().is_empty() {
            return Err(ChatError::validation("message content is empty"));
        }

        let message = Message::pending(&self.local_user_id, &request);
        let local_id = message.id.clone();
        self.messages.push(message);

        Ok(PendingSend { local_id, request })
    }

    /// Record the server's copy of a message sent with `begin_send`.
    pub fn confirm_send(&mut self, local_id: &str, confirmed: Message) -> ChatResult<()> {
        let position = self
            .position_of(local_id)
            .ok_or_else(|| ChatError::unknown_pending(local_id))?;

        if !self.seen.insert(confirmed.id.clone()) {
            // The server copy reached us through another path first.
            self.messages.remove(position);
            return Ok(());
        }

        let entry = &mut self.messages[position];
        entry.id = confirmed.id;
        entry.timestamp = confirmed.timestamp;
        entry.delivery = Delivery::Confirmed;
        Ok(())
    }

    /// Mark an optimistic entry as failed; it stays visible.
    pub fn fail_send(&mut self, local_id: &str) -> ChatResult<()> {
        let position = self
            .position_of(local_id)
            .ok_or_else(|| ChatError::unknown_pending(local_id))?;
        self.messages[position].delivery = Delivery::Failed;
        Ok(())
    }

    /// Optimistically append, deliver through `sink`, then confirm or fail.
    pub async fn send<S>(&mut self, sink: &S, request: SendMessageRequest) -> ChatResult<Message>
    where
        S: MessageSink + ?Sized,
    {
        let pending = self.begin_send(request)?;

        match sink
            .send_message(&self.conversation_id, &pending.request)
            .await
        {
            Ok(confirmed) => {
                self.confirm_send(&pending.local_id, confirmed.clone())?;
                Ok(confirmed)
            }
            Err(error) => {
                warn!(
                    conversation_id = %self.conversation_id,
                    %error,
                    "failed to send message"
                );
                self.fail_send(&pending.local_id)?;
                Err(error)
            }
        }
    }

    fn position_of(&self, local_id: &str) -> Option<usize> {
        self.messages
            .iter()
            .position(|message| message.id == local_id && message.is_local())
    }
}

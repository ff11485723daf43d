//! Line parsing and rendering for the interactive chat.

use tutorhub_chats::{Conversation, Delivery, Message, MessageRole};

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    /// Load the next page of older history
    More,
    /// Keep unsent text for later
    Draft(String),
    Quit,
    Send(String),
    Empty,
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }

    match line.split_once(char::is_whitespace) {
        Some(("/draft", text)) => Input::Draft(text.trim().to_string()),
        None if line == "/draft" => Input::Draft(String::new()),
        None if line == "/more" => Input::More,
        None if line == "/quit" || line == "/exit" => Input::Quit,
        _ => Input::Send(line.to_string()),
    }
}

pub fn render_message(message: &Message, local_user_id: &str) -> String {
    let who = match message.sender {
        MessageRole::Assistant => "tutor".to_string(),
        MessageRole::System => "system".to_string(),
        MessageRole::User => match message.sender_user_id.as_deref() {
            Some(id) if id == local_user_id => "you".to_string(),
            Some(id) => id.to_string(),
            None => "user".to_string(),
        },
    };

    let status = match message.delivery {
        Delivery::Confirmed => "",
        Delivery::Pending => " (sending)",
        Delivery::Failed => " (failed)",
    };

    let reply = message
        .reply_to_brief
        .as_deref()
        .map(|brief| format!(" > {brief}\n  "))
        .unwrap_or_default();

    format!(
        "[{}] {who}:{status} {reply}{}",
        message.timestamp.format("%Y-%m-%d %H:%M"),
        message.content
    )
}

pub fn render_conversation(conversation: &Conversation) -> String {
    let title = conversation.title.as_deref().unwrap_or("(untitled)");
    let preview = conversation
        .last_message
        .as_ref()
        .map(|last| format!("  {}: {}", last.sender, last.content))
        .unwrap_or_default();
    format!("{:<12} {:?}  {title}{preview}", conversation.id, conversation.kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message(sender: MessageRole, user: Option<&str>) -> Message {
        Message {
            id: "m1".into(),
            sender,
            content: "What is a limit?".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap(),
            sender_user_id: user.map(str::to_string),
            sender_assistant_id: None,
            reply_to_message_id: None,
            reply_to_brief: None,
            delivery: Delivery::Confirmed,
        }
    }

    #[test]
    fn commands_are_recognised() {
        assert_eq!(parse_input("/more"), Input::More);
        assert_eq!(parse_input(" /quit "), Input::Quit);
        assert_eq!(parse_input("/draft  half a thought"), Input::Draft("half a thought".into()));
        assert_eq!(parse_input("/draft"), Input::Draft(String::new()));
        assert_eq!(parse_input("   "), Input::Empty);
    }

    #[test]
    fn everything_else_is_sent() {
        assert_eq!(parse_input("hello"), Input::Send("hello".into()));
        assert_eq!(parse_input("/morelater"), Input::Send("/morelater".into()));
    }

    #[test]
    fn own_messages_render_as_you_with_status() {
        let mut own = message(MessageRole::User, Some("u1"));
        own.delivery = Delivery::Pending;
        assert_eq!(
            render_message(&own, "u1"),
            "[2024-03-01 10:05] you: (sending) What is a limit?"
        );

        let tutor = message(MessageRole::Assistant, None);
        assert!(render_message(&tutor, "u1").contains("tutor: What"));
    }
}

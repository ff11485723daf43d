//! Integration tests for the REST client against a mock server.

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;
use tutorhub_api::{ApiClient, ApiError};
use tutorhub_chats::{
    ChatError, ConversationType, Delivery, MessageRole, SendMessageRequest, Timeline,
};
use tutorhub_realtime::{NoToken, StaticToken};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(
        server.url("/api"),
        Duration::from_secs(5),
        Arc::new(StaticToken::new("secret-token")),
    )
    .unwrap()
}

fn message(id: &str, content: &str, minute: u32) -> serde_json::Value {
    json!({
        "id": id,
        "sender": "user",
        "sender_user_id": "u2",
        "content": content,
        "timestamp": format!("2024-03-01T10:{minute:02}:00Z"),
    })
}

#[tokio::test]
async fn fetch_messages_sends_paging_and_bearer_token() -> TestResult {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/conversations/c1/messages")
                .query_param("page", "2")
                .query_param("page_size", "3")
                .header("authorization", "Bearer secret-token");
            then.status(200).json_body(json!({
                "messages": [message("m3", "third", 3), message("m2", "second", 2)]
            }));
        })
        .await;

    let messages = client(&server).fetch_messages("c1", 2, 3).await?;

    mock.assert_async().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, "m3");
    assert_eq!(messages[0].sender, MessageRole::User);
    Ok(())
}

#[tokio::test]
async fn requests_without_token_still_reach_the_server() -> TestResult {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/conversations");
            then.status(200).json_body(json!({ "conversations": [] }));
        })
        .await;

    let client = ApiClient::new(server.url("/api"), Duration::from_secs(5), Arc::new(NoToken))?;
    assert!(client.conversations().await?.is_empty());
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn post_message_returns_stored_copy() -> TestResult {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/conversations/c1/messages")
                .json_body(json!({ "content": "What is a derivative?", "reply_to_message_id": "m7" }));
            then.status(201).json_body(json!({
                "message": {
                    "id": "m8",
                    "sender": "user",
                    "sender_user_id": "u1",
                    "content": "What is a derivative?",
                    "timestamp": "2024-03-01T11:00:00Z",
                    "reply_to_message_id": "m7",
                    "reply_to_brief": "Any questions?"
                }
            }));
        })
        .await;

    let request = SendMessageRequest::new("What is a derivative?").replying_to("m7");
    let stored = client(&server).post_message("c1", &request).await?;

    mock.assert_async().await;
    assert_eq!(stored.id, "m8");
    assert_eq!(stored.reply_to_brief.as_deref(), Some("Any questions?"));
    assert_eq!(stored.delivery, Delivery::Confirmed);
    Ok(())
}

#[tokio::test]
async fn conversations_are_decoded() -> TestResult {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/conversations");
            then.status(200).json_body(json!({
                "conversations": [
                    {
                        "id": "c1",
                        "type": "learning_topic",
                        "title": "Calculus",
                        "participants": [{ "user_id": "u1" }, { "assistant_id": "a1", "name": "Tutor" }],
                        "last_message": { "content": "hi", "sender": "assistant", "timestamp": "2024-03-01T10:00:00Z" }
                    },
                    { "id": "c2", "type": "dm" }
                ]
            }));
        })
        .await;

    let conversations = client(&server).conversations().await?;

    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0].kind, ConversationType::LearningTopic);
    assert!(conversations[0].has_participant("u1"));
    assert_eq!(conversations[1].kind, ConversationType::Dm);
    Ok(())
}

#[tokio::test]
async fn error_status_keeps_code_and_body() -> TestResult {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/conversations/c1/messages");
            then.status(403).body("not a participant");
        })
        .await;

    let error = client(&server).fetch_messages("c1", 1, 20).await.unwrap_err();

    assert_eq!(error.status(), Some(403));
    match error {
        ApiError::Status { body, .. } => assert_eq!(body, "not a participant"),
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() -> TestResult {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/conversations");
            then.status(200).body("<html>maintenance</html>");
        })
        .await;

    let error = client(&server).conversations().await.unwrap_err();
    assert!(matches!(error, ApiError::Decode(_)));
    Ok(())
}

#[tokio::test]
async fn timeline_pages_through_rest_history() -> TestResult {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/conversations/c1/messages")
                .query_param("page", "1");
            then.status(200).json_body(json!({
                "messages": [message("m4", "four", 4), message("m3", "three", 3)]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/conversations/c1/messages")
                .query_param("page", "2");
            then.status(200)
                .json_body(json!({ "messages": [message("m2", "two", 2)] }));
        })
        .await;

    let client = client(&server);
    let mut timeline = Timeline::new("c1", "u1", 2);
    timeline.load_initial(&client).await?;
    let more = timeline.load_more(&client).await?;

    let ids: Vec<_> = timeline.messages().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["m2", "m3", "m4"]);
    assert_eq!(more.prepended, 1);
    assert!(more.exhausted);
    Ok(())
}

#[tokio::test]
async fn failed_send_surfaces_as_backend_error() -> TestResult {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/conversations/c1/messages");
            then.status(500).body("boom");
        })
        .await;

    let client = client(&server);
    let mut timeline = Timeline::new("c1", "u1", 20);
    let error = timeline
        .send(&client, SendMessageRequest::new("hello"))
        .await
        .unwrap_err();

    assert!(matches!(error, ChatError::Backend(_)));
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline.messages()[0].delivery, Delivery::Failed);
    Ok(())
}

#[tokio::test]
async fn integer_ids_in_history_and_listing_decode() -> TestResult {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/conversations/42/messages");
            then.status(200).json_body(json!({
                "messages": [{
                    "id": 7,
                    "sender": "user",
                    "sender_user_id": 12,
                    "content": "hi",
                    "timestamp": "2024-03-01T10:00:00Z"
                }]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/conversations");
            then.status(200).json_body(json!({
                "conversations": [{ "id": 42, "type": "group", "participants": [{ "user_id": 12 }] }]
            }));
        })
        .await;

    let client = client(&server);
    let messages = client.fetch_messages("42", 1, 20).await?;
    let conversations = client.conversations().await?;

    assert_eq!(messages[0].id, "7");
    assert_eq!(messages[0].sender_user_id.as_deref(), Some("12"));
    assert_eq!(conversations[0].id, "42");
    assert!(conversations[0].has_participant("12"));
    Ok(())
}

//! Completion client against a mock chat-completions endpoint.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use ltrq_core::ChatRole;
use ltrq_integration_tests::{CompletionReply, OPENAI_KEY, Recorded, Upstream};
use ltrq_storefront::assistant::{
    CompletionError, CompletionMessage, CompletionRequest, OpenAiClient,
};

fn request() -> CompletionRequest {
    CompletionRequest {
        model: "gpt-3.5-turbo".to_string(),
        messages: vec![
            CompletionMessage::new(ChatRole::System, "You are LTRQ AI"),
            CompletionMessage::new(ChatRole::User, "looking for jeans"),
        ],
        max_tokens: 150,
    }
}

async fn client_with(reply: CompletionReply) -> (Upstream, OpenAiClient) {
    let upstream = Upstream::start(Recorded {
        completion_reply: reply,
        ..Recorded::default()
    })
    .await;
    let config = upstream.config();
    let client = OpenAiClient::new(&config.assistant, config.http_timeout).unwrap();
    (upstream, client)
}

#[tokio::test]
async fn sends_bearer_key_and_reads_first_choice() {
    let (upstream, client) =
        client_with(CompletionReply::Text("Try the Classic Jeans!".to_string())).await;

    let reply = client.chat(&request()).await.unwrap();
    assert_eq!(reply, "Try the Classic Jeans!");

    let recorded = upstream.state.lock().await;
    assert_eq!(recorded.completion_auth, vec![format!("Bearer {OPENAI_KEY}")]);
    assert_eq!(
        recorded.completion_requests[0],
        json!({
            "model": "gpt-3.5-turbo",
            "messages": [
                { "role": "system", "content": "You are LTRQ AI" },
                { "role": "user", "content": "looking for jeans" }
            ],
            "max_tokens": 150
        })
    );
    drop(recorded);

    upstream.stop().await;
}

#[tokio::test]
async fn rate_limit_reads_retry_after() {
    let (upstream, client) = client_with(CompletionReply::Status {
        status: StatusCode::TOO_MANY_REQUESTS,
        body: json!({ "error": { "type": "rate_limit", "message": "slow down" } }),
        retry_after: Some(7),
    })
    .await;

    let err = client.chat(&request()).await.unwrap_err();
    assert!(matches!(err, CompletionError::RateLimited(7)));

    upstream.stop().await;
}

#[tokio::test]
async fn unauthorized_and_api_errors_are_distinguished() {
    let (upstream, client) = client_with(CompletionReply::Status {
        status: StatusCode::UNAUTHORIZED,
        body: json!({ "error": { "message": "bad key" } }),
        retry_after: None,
    })
    .await;
    assert!(matches!(
        client.chat(&request()).await.unwrap_err(),
        CompletionError::Unauthorized(_)
    ));
    upstream.stop().await;

    let (upstream, client) = client_with(CompletionReply::Status {
        status: StatusCode::BAD_REQUEST,
        body: json!({ "error": { "type": "invalid_request_error", "message": "max_tokens too large" } }),
        retry_after: None,
    })
    .await;
    match client.chat(&request()).await.unwrap_err() {
        CompletionError::Api {
            error_type,
            message,
        } => {
            assert_eq!(error_type, "invalid_request_error");
            assert_eq!(message, "max_tokens too large");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    upstream.stop().await;
}

//! Shopping assistant route handlers.

use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::assistant::send_shared;
use crate::error::{AppError, Result};
use crate::middleware::Shopper;
use crate::models::{ChatMessage, ChatView};

/// A shopper message.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub text: String,
}

/// The assistant's answer and the full chat state after it.
#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub reply: ChatMessage,
    pub chat: ChatView,
}

/// Current chat state.
pub async fn show(Shopper(shopper): Shopper) -> Json<ChatView> {
    Json(shopper.chat.lock().await.view())
}

/// Expand or collapse the chat window.
pub async fn toggle(Shopper(shopper): Shopper) -> Json<ChatView> {
    let mut chat = shopper.chat.lock().await;
    chat.toggle();
    Json(chat.view())
}

/// Send a message and wait for the reply.
///
/// The chat stays readable while the reply is pending, and the reply is
/// recorded even if the client goes away.
#[instrument(skip_all)]
pub async fn send(
    Shopper(shopper): Shopper,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>> {
    let (reply, chat) = send_shared(&shopper.chat, &request.text)
        .await
        .map_err(|e| AppError::Internal(format!("assistant reply task: {e}")))?
        .ok_or_else(|| AppError::BadRequest("Message must not be empty".to_string()))?;

    Ok(Json(SendResponse { reply, chat }))
}

//! Chat completion client.
//!
//! Speaks the OpenAI chat-completions wire format: a model name, the
//! conversation as role/content pairs and a `max_tokens` cap. Only the
//! first choice's message content is read back.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use ltrq_core::ChatRole;

use crate::config::AssistantConfig;

/// Errors that can occur when calling the completion endpoint.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// No API key is configured.
    #[error("completion API key is not configured")]
    MissingApiKey,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API returned an error body.
    #[error("API error ({error_type}): {message}")]
    Api { error_type: String, message: String },

    /// Rate limited by the API.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Authentication failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Failed to parse response.
    #[error("parse error: {0}")]
    Parse(String),

    /// The response had no message content.
    #[error("completion response had no content")]
    EmptyResponse,
}

/// One entry of the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: ChatRole,
    pub content: String,
}

impl CompletionMessage {
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Request body for the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<CompletionMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    message: String,
}

pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>>;

/// Something that turns a conversation into the assistant's next reply.
pub trait CompletionGateway: Send + Sync {
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a>;
}

// =============================================================================
// OpenAiClient
// =============================================================================

/// HTTP client for the chat-completions endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    inner: Arc<OpenAiClientInner>,
}

struct OpenAiClientInner {
    /// `None` when no API key is configured.
    client: Option<reqwest::Client>,
    endpoint: url::Url,
}

impl OpenAiClient {
    /// Create a new completion client.
    ///
    /// A missing API key is not an error here; every call then fails with
    /// `CompletionError::MissingApiKey`.
    ///
    /// # Errors
    ///
    /// Returns error if the key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &AssistantConfig, timeout: Duration) -> Result<Self, CompletionError> {
        let client = match &config.api_key {
            Some(api_key) => {
                let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
                    .map_err(|_| CompletionError::Unauthorized("API key is not a valid header".to_string()))?;
                auth.set_sensitive(true);

                let mut headers = HeaderMap::new();
                headers.insert(AUTHORIZATION, auth);

                Some(
                    reqwest::Client::builder()
                        .default_headers(headers)
                        .timeout(timeout)
                        .build()?,
                )
            }
            None => None,
        };

        Ok(Self {
            inner: Arc::new(OpenAiClientInner {
                client,
                endpoint: config.completions_url.clone(),
            }),
        })
    }

    /// Send a conversation and return the reply text.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError` on a missing key, transport failure,
    /// non-success status or a response without content.
    #[instrument(skip(self, request), fields(model = %request.model, messages = request.messages.len()))]
    pub async fn chat(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let client = self
            .inner
            .client
            .as_ref()
            .ok_or(CompletionError::MissingApiKey)?;

        let response = client
            .post(self.inner.endpoint.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(handle_error_status(status, response).await);
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Parse(e.to_string()))?;

        let reply = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(CompletionError::EmptyResponse)?;

        debug!(reply_len = reply.len(), "Completion received");
        Ok(reply)
    }
}

impl CompletionGateway for OpenAiClient {
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a> {
        Box::pin(self.chat(request))
    }
}

/// Handle an error status code.
async fn handle_error_status(
    status: reqwest::StatusCode,
    response: reqwest::Response,
) -> CompletionError {
    // Check for rate limiting
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return CompletionError::RateLimited(retry_after);
    }

    // Check for unauthorized
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return CompletionError::Unauthorized("Invalid API key".to_string());
    }

    // Try to parse API error response
    match response.text().await {
        Ok(body) => serde_json::from_str::<ApiErrorResponse>(&body).map_or_else(
            |_| CompletionError::Api {
                error_type: status.as_u16().to_string(),
                message: body,
            },
            |api_error| CompletionError::Api {
                error_type: api_error
                    .error
                    .error_type
                    .unwrap_or_else(|| "unknown".to_string()),
                message: api_error.error.message,
            },
        ),
        Err(e) => CompletionError::Parse(format!("Failed to read error response: {e}")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = CompletionRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![
                CompletionMessage::new(ChatRole::System, "prompt"),
                CompletionMessage::new(ChatRole::User, "hi"),
            ],
            max_tokens: 150,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    { "role": "system", "content": "prompt" },
                    { "role": "user", "content": "hi" }
                ],
                "max_tokens": 150
            })
        );
    }

    #[test]
    fn test_response_parsing() {
        let body: CompletionResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Try the Slim Fit Shirt!"}}]}"#,
        )
        .unwrap();
        assert_eq!(
            body.choices[0].message.content.as_deref(),
            Some("Try the Slim Fit Shirt!")
        );

        let empty: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(empty.choices.is_empty());
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let config = AssistantConfig {
            api_key: None,
            completions_url: url::Url::parse("http://127.0.0.1:9/v1/chat/completions").unwrap(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 150,
        };
        let client = OpenAiClient::new(&config, Duration::from_secs(1)).unwrap();
        let request = CompletionRequest {
            model: config.model.clone(),
            messages: Vec::new(),
            max_tokens: config.max_tokens,
        };
        assert!(matches!(
            client.chat(&request).await,
            Err(CompletionError::MissingApiKey)
        ));
    }
}

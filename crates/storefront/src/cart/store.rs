//! Remote cart store.
//!
//! The store mirrors each signed-in shopper's cart. It is read once at
//! sign-in and overwritten with the full snapshot after every debounced
//! mutation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use ltrq_core::{Email, UserId};

use crate::config::CartStoreConfig;
use crate::models::CartLine;

/// Errors from the remote cart store.
#[derive(Debug, Error)]
pub enum CartStoreError {
    /// HTTP request failed before a response arrived.
    #[error("cart store request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("cart store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Failed to parse the store's response.
    #[error("failed to parse cart store response: {0}")]
    Parse(String),

    /// No ID token could be obtained for the shopper.
    #[error("failed to get ID token: {0}")]
    Token(String),
}

impl CartStoreError {
    /// Message surfaced to the shopper after a failed write.
    #[must_use]
    pub fn sync_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => format!("Backend error: {message}"),
            _ => "Failed to update cart on backend".to_string(),
        }
    }

    /// Message surfaced to the shopper after a failed sign-in fetch.
    #[must_use]
    pub fn fetch_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => format!("Failed to fetch cart: {message}"),
            _ => "Failed to fetch cart from backend".to_string(),
        }
    }
}

/// Body of a cart write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSyncPayload {
    pub cart: Vec<CartLine>,
    pub user_id: UserId,
    pub email: Email,
    pub timestamp: DateTime<Utc>,
}

pub type CartStoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CartStoreError>> + Send + 'a>>;

/// Read and write access to the remote cart mirror.
pub trait CartStore: Send + Sync {
    /// Fetch the cart of the shopper the token belongs to.
    fn fetch<'a>(&'a self, token: &'a SecretString) -> CartStoreFuture<'a, Vec<CartLine>>;

    /// Replace the shopper's stored cart with `payload.cart`.
    fn push<'a>(
        &'a self,
        token: &'a SecretString,
        payload: &'a CartSyncPayload,
    ) -> CartStoreFuture<'a, ()>;
}

#[derive(Deserialize)]
struct FetchResponse {
    #[serde(default)]
    cart: Option<Vec<CartLine>>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

// =============================================================================
// HttpCartStore
// =============================================================================

/// Cart store client over HTTP with bearer authentication.
#[derive(Clone)]
pub struct HttpCartStore {
    inner: Arc<HttpCartStoreInner>,
}

struct HttpCartStoreInner {
    client: reqwest::Client,
    fetch_url: url::Url,
    sync_url: url::Url,
}

impl HttpCartStore {
    /// Create a new cart store client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &CartStoreConfig, timeout: Duration) -> Result<Self, CartStoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            inner: Arc::new(HttpCartStoreInner {
                client,
                fetch_url: config.fetch_url.clone(),
                sync_url: config.sync_url.clone(),
            }),
        })
    }

    #[instrument(skip_all)]
    async fn fetch_lines(&self, token: &SecretString) -> Result<Vec<CartLine>, CartStoreError> {
        let response = self
            .inner
            .client
            .get(self.inner.fetch_url.clone())
            .bearer_auth(token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(rejection(status, response).await);
        }

        let body: FetchResponse = response
            .json()
            .await
            .map_err(|e| CartStoreError::Parse(e.to_string()))?;
        let lines = body.cart.unwrap_or_default();

        debug!(lines = lines.len(), "Fetched remote cart");
        Ok(lines)
    }

    #[instrument(skip_all, fields(user_id = %payload.user_id, lines = payload.cart.len()))]
    async fn push_snapshot(
        &self,
        token: &SecretString,
        payload: &CartSyncPayload,
    ) -> Result<(), CartStoreError> {
        let response = self
            .inner
            .client
            .post(self.inner.sync_url.clone())
            .bearer_auth(token.expose_secret())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(rejection(status, response).await);
        }

        debug!("Cart snapshot written");
        Ok(())
    }
}

impl CartStore for HttpCartStore {
    fn fetch<'a>(&'a self, token: &'a SecretString) -> CartStoreFuture<'a, Vec<CartLine>> {
        Box::pin(self.fetch_lines(token))
    }

    fn push<'a>(
        &'a self,
        token: &'a SecretString,
        payload: &'a CartSyncPayload,
    ) -> CartStoreFuture<'a, ()> {
        Box::pin(self.push_snapshot(token, payload))
    }
}

/// Build a `Rejected` error, preferring the store's `{ error }` message.
async fn rejection(status: reqwest::StatusCode, response: reqwest::Response) -> CartStoreError {
    let fallback = format!("Request failed with status code {}", status.as_u16());
    let message = match response.text().await {
        Ok(body) => serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .map(|e| e.error)
            .filter(|e| !e.trim().is_empty())
            .unwrap_or(fallback),
        Err(_) => fallback,
    };

    CartStoreError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let rejected = CartStoreError::Rejected {
            status: 403,
            message: "Unauthorized user".to_string(),
        };
        assert_eq!(rejected.sync_message(), "Backend error: Unauthorized user");
        assert_eq!(rejected.fetch_message(), "Failed to fetch cart: Unauthorized user");

        let token = CartStoreError::Token("expired".to_string());
        assert_eq!(token.sync_message(), "Failed to update cart on backend");
        assert_eq!(token.fetch_message(), "Failed to fetch cart from backend");
    }

    #[test]
    fn test_payload_wire_shape() {
        let payload = CartSyncPayload {
            cart: Vec::new(),
            user_id: UserId::new("uid-1"),
            email: Email::parse("shopper@ltrq.shop").unwrap(),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["userId"], "uid-1");
        assert_eq!(value["email"], "shopper@ltrq.shop");
        assert!(value["cart"].as_array().unwrap().is_empty());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_fetch_response_missing_cart_is_empty() {
        let body: FetchResponse = serde_json::from_str("{}").unwrap();
        assert!(body.cart.unwrap_or_default().is_empty());
        let body: FetchResponse = serde_json::from_str(r#"{"cart":null}"#).unwrap();
        assert!(body.cart.is_none());
    }
}

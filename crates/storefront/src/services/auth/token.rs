//! Bearer token sources for calls made on a shopper's behalf.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::warn;

use super::{AuthError, IdentityClient, SignedInUser};

/// Refresh this long before the provider's stated expiry.
const REFRESH_SKEW_SECS: i64 = 60;

pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<SecretString, AuthError>> + Send + 'a>>;

/// Supplies a current ID token for the signed-in shopper.
pub trait TokenSource: Send + Sync {
    fn id_token(&self) -> TokenFuture<'_>;
}

/// Token source backed by the identity provider's refresh endpoint.
pub struct FirebaseTokenSource {
    client: IdentityClient,
    state: Mutex<TokenState>,
}

struct TokenState {
    id_token: SecretString,
    refresh_token: SecretString,
    expires_at: DateTime<Utc>,
}

impl FirebaseTokenSource {
    /// Start from the tokens issued at sign-in.
    #[must_use]
    pub fn new(client: IdentityClient, user: &SignedInUser) -> Self {
        Self {
            client,
            state: Mutex::new(TokenState {
                id_token: user.id_token.clone(),
                refresh_token: user.refresh_token.clone(),
                expires_at: user.expires_at,
            }),
        }
    }

    async fn current(&self) -> Result<SecretString, AuthError> {
        let mut state = self.state.lock().await;
        if needs_refresh(state.expires_at, Utc::now()) {
            let refreshed = self.client.refresh(&state.refresh_token).await.inspect_err(|e| {
                warn!(error = %e, "ID token refresh failed");
            })?;
            state.id_token = refreshed.id_token;
            state.refresh_token = refreshed.refresh_token;
            state.expires_at = refreshed.expires_at;
        }
        Ok(state.id_token.clone())
    }
}

impl TokenSource for FirebaseTokenSource {
    fn id_token(&self) -> TokenFuture<'_> {
        Box::pin(self.current())
    }
}

/// A fixed token, for service accounts and tests.
pub struct StaticTokenSource(SecretString);

impl StaticTokenSource {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }
}

impl TokenSource for StaticTokenSource {
    fn id_token(&self) -> TokenFuture<'_> {
        let token = self.0.clone();
        Box::pin(async move { Ok(token) })
    }
}

fn needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at - now <= chrono::Duration::seconds(REFRESH_SKEW_SECS)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_needs_refresh_within_skew() {
        let now = Utc::now();
        assert!(needs_refresh(now + chrono::Duration::seconds(30), now));
        assert!(needs_refresh(now - chrono::Duration::seconds(1), now));
        assert!(!needs_refresh(now + chrono::Duration::seconds(600), now));
    }

    #[tokio::test]
    async fn test_static_token_source() {
        let source = StaticTokenSource::new("fixed-token");
        let token = source.id_token().await.unwrap();
        assert_eq!(token.expose_secret(), "fixed-token");
    }
}

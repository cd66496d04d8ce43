//! Authentication service.
//!
//! Email/password accounts live with the identity provider (Firebase
//! Identity Toolkit REST API). This module signs shoppers in and up, keeps
//! their ID tokens fresh for calls to the cart store, and validates the
//! sign-in forms before anything goes over the wire.

mod error;
mod token;
pub mod validation;

pub use error::AuthError;
pub use token::{FirebaseTokenSource, StaticTokenSource, TokenFuture, TokenSource};
pub use validation::{FieldErrors, validate_sign_in, validate_sign_up};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use ltrq_core::{Email, UserId};

use crate::config::IdentityConfig;

/// A shopper who just signed in or signed up.
///
/// Implements `Debug` manually to redact tokens.
#[derive(Clone)]
pub struct SignedInUser {
    pub user_id: UserId,
    pub email: Email,
    pub id_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for SignedInUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedInUser")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("id_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A freshly exchanged ID token.
#[derive(Clone, Debug)]
pub struct RefreshedToken {
    pub id_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    email: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Deserialize)]
struct ProviderErrorResponse {
    error: ProviderErrorBody,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    message: String,
}

// =============================================================================
// IdentityClient
// =============================================================================

/// Client for the identity provider's REST API.
#[derive(Clone)]
pub struct IdentityClient {
    inner: Arc<IdentityClientInner>,
}

struct IdentityClientInner {
    client: reqwest::Client,
    api_key: SecretString,
    identity_base_url: String,
    token_base_url: String,
}

impl IdentityClient {
    /// Create a new identity client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &IdentityConfig, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            inner: Arc::new(IdentityClientInner {
                client,
                api_key: config.api_key.clone(),
                identity_base_url: with_trailing_slash(config.identity_base_url.as_str()),
                token_base_url: with_trailing_slash(config.token_base_url.as_str()),
            }),
        })
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns the translated provider error on rejection.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in(&self, email: &Email, password: &str) -> Result<SignedInUser, AuthError> {
        self.password_call("accounts:signInWithPassword", email, password)
            .await
    }

    /// Create an account with email and password.
    ///
    /// # Errors
    ///
    /// Returns the translated provider error on rejection.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_up(&self, email: &Email, password: &str) -> Result<SignedInUser, AuthError> {
        self.password_call("accounts:signUp", email, password).await
    }

    /// Exchange a refresh token for a new ID token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionExpired` when the refresh token is no
    /// longer accepted.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<RefreshedToken, AuthError> {
        let url = format!(
            "{}token?key={}",
            self.inner.token_base_url,
            self.inner.api_key.expose_secret()
        );

        let response = self
            .inner
            .client
            .post(url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(provider_error(status, response).await);
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Parse(e.to_string()))?;

        debug!("ID token refreshed");
        Ok(RefreshedToken {
            id_token: SecretString::from(body.id_token),
            refresh_token: SecretString::from(body.refresh_token),
            expires_at: expiry_from(&body.expires_in)?,
        })
    }

    async fn password_call(
        &self,
        method: &str,
        email: &Email,
        password: &str,
    ) -> Result<SignedInUser, AuthError> {
        let url = format!(
            "{}{method}?key={}",
            self.inner.identity_base_url,
            self.inner.api_key.expose_secret()
        );

        let response = self
            .inner
            .client
            .post(url)
            .json(&PasswordRequest {
                email: email.as_str(),
                password,
                return_secure_token: true,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(provider_error(status, response).await);
        }

        let body: PasswordResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Parse(e.to_string()))?;

        let email = match body.email.as_deref() {
            Some(returned) if !returned.is_empty() => Email::parse(returned)?,
            _ => email.clone(),
        };

        debug!(user_id = %body.local_id, "Identity call succeeded");
        Ok(SignedInUser {
            user_id: UserId::new(body.local_id),
            email,
            id_token: SecretString::from(body.id_token),
            refresh_token: SecretString::from(body.refresh_token),
            expires_at: expiry_from(&body.expires_in)?,
        })
    }
}

/// Turn a non-success response into an `AuthError`.
async fn provider_error(status: reqwest::StatusCode, response: reqwest::Response) -> AuthError {
    match response.text().await {
        Ok(body) => serde_json::from_str::<ProviderErrorResponse>(&body).map_or_else(
            |_| AuthError::Provider(format!("{status}: {body}")),
            |parsed| AuthError::from_provider_message(&parsed.error.message),
        ),
        Err(e) => AuthError::Parse(e.to_string()),
    }
}

/// Absolute expiry from the provider's `expiresIn` seconds string.
fn expiry_from(expires_in: &str) -> Result<DateTime<Utc>, AuthError> {
    let seconds: i64 = expires_in
        .trim()
        .parse()
        .map_err(|_| AuthError::Parse(format!("invalid expiresIn: {expires_in}")))?;
    Ok(Utc::now() + chrono::Duration::seconds(seconds))
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_from_seconds() {
        let before = Utc::now();
        let expiry = expiry_from("3600").unwrap();
        assert!(expiry >= before + chrono::Duration::seconds(3600));
        assert!(expiry_from("soon").is_err());
    }

    #[test]
    fn test_with_trailing_slash() {
        assert_eq!(
            with_trailing_slash("https://identitytoolkit.googleapis.com/v1"),
            "https://identitytoolkit.googleapis.com/v1/"
        );
        assert_eq!(with_trailing_slash("http://x/v1/"), "http://x/v1/");
    }

    #[test]
    fn test_password_request_wire_shape() {
        let body = serde_json::to_value(PasswordRequest {
            email: "shopper@ltrq.shop",
            password: "hunter22",
            return_secure_token: true,
        })
        .unwrap();
        assert_eq!(body["returnSecureToken"], true);
        assert_eq!(body["email"], "shopper@ltrq.shop");
    }

    #[test]
    fn test_signed_in_user_debug_redacts_tokens() {
        let user = SignedInUser {
            user_id: UserId::new("uid-1"),
            email: Email::parse("shopper@ltrq.shop").unwrap(),
            id_token: SecretString::from("id-token-value"),
            refresh_token: SecretString::from("refresh-token-value"),
            expires_at: Utc::now(),
        };
        let debug = format!("{user:?}");
        assert!(debug.contains("uid-1"));
        assert!(!debug.contains("id-token-value"));
        assert!(!debug.contains("refresh-token-value"));
    }
}

//! Authentication error types.

use thiserror::Error;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] ltrq_core::EmailError),

    /// The password did not match the account.
    #[error("wrong password")]
    WrongPassword,

    /// No account exists for the email.
    #[error("user not found")]
    UserNotFound,

    /// Email or password is wrong; the provider does not say which.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account already exists for the email.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password rejected by the provider.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Account disabled or sign-in throttled by the provider.
    #[error("identity provider refused the request: {0}")]
    Refused(String),

    /// The refresh token was revoked or has expired.
    #[error("session expired")]
    SessionExpired,

    /// Any other provider error code.
    #[error("identity provider error: {0}")]
    Provider(String),

    /// HTTP request failed.
    #[error("identity request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response could not be parsed.
    #[error("failed to parse identity response: {0}")]
    Parse(String),
}

impl AuthError {
    /// Map a provider error code (`EMAIL_NOT_FOUND`, `WEAK_PASSWORD : ...`).
    #[must_use]
    pub fn from_provider_message(message: &str) -> Self {
        let (code, detail) = message
            .split_once(" : ")
            .map_or((message.trim(), ""), |(code, detail)| {
                (code.trim(), detail.trim())
            });

        match code {
            "INVALID_PASSWORD" => Self::WrongPassword,
            "EMAIL_NOT_FOUND" => Self::UserNotFound,
            "INVALID_LOGIN_CREDENTIALS" => Self::InvalidCredentials,
            "EMAIL_EXISTS" => Self::UserAlreadyExists,
            "INVALID_EMAIL" => Self::Provider(code.to_string()),
            "WEAK_PASSWORD" => Self::WeakPassword(detail.to_string()),
            "USER_DISABLED" | "TOO_MANY_ATTEMPTS_TRY_LATER" | "OPERATION_NOT_ALLOWED" => {
                Self::Refused(code.to_string())
            }
            "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND" => Self::SessionExpired,
            _ => Self::Provider(message.to_string()),
        }
    }

    /// Message shown under the password field after a failed sign-in.
    #[must_use]
    pub const fn sign_in_message(&self) -> &'static str {
        match self {
            Self::WrongPassword => "Incorrect password",
            Self::UserNotFound => "No user found with this email",
            _ => "Sign-in failed, please try again",
        }
    }

    /// Message shown under the email field after a failed sign-up.
    #[must_use]
    pub const fn sign_up_message(&self) -> &'static str {
        match self {
            Self::UserAlreadyExists => "Email already in use",
            _ => "Sign-up failed, please try again",
        }
    }
}

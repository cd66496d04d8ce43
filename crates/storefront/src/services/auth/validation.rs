//! Sign-in and sign-up form validation.
//!
//! Errors are keyed by form field so the caller can show each one next to
//! its input.

use serde::Serialize;

use ltrq_core::Email;

/// Minimum password length accepted by the identity provider.
pub const MIN_PASSWORD_LENGTH: usize = 6;

const INVALID_EMAIL: &str = "Please enter a valid email address";
const SHORT_PASSWORD: &str = "Password must be at least 6 characters";
const PASSWORD_MISMATCH: &str = "Passwords must match";

/// Per-field validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldErrors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm_password: Option<String>,
}

impl FieldErrors {
    /// Only the email field is in error.
    #[must_use]
    pub fn email(message: impl Into<String>) -> Self {
        Self {
            email: Some(message.into()),
            ..Self::default()
        }
    }

    /// Only the password field is in error.
    #[must_use]
    pub fn password(message: impl Into<String>) -> Self {
        Self {
            password: Some(message.into()),
            ..Self::default()
        }
    }

    /// Whether no field is in error.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.email.is_none() && self.password.is_none() && self.confirm_password.is_none()
    }
}

fn check_password(password: &str) -> Option<String> {
    (password.chars().count() < MIN_PASSWORD_LENGTH).then(|| SHORT_PASSWORD.to_string())
}

/// Validate a sign-in form.
///
/// # Errors
///
/// Returns the messages for every invalid field.
pub fn validate_sign_in(email: &str, password: &str) -> Result<Email, FieldErrors> {
    let parsed = Email::parse(email);
    let errors = FieldErrors {
        email: parsed.as_ref().err().map(|_| INVALID_EMAIL.to_string()),
        password: check_password(password),
        confirm_password: None,
    };

    match parsed {
        Ok(email) if errors.is_empty() => Ok(email),
        _ => Err(errors),
    }
}

/// Validate a sign-up form.
///
/// The confirmation is only compared once every field is individually valid.
///
/// # Errors
///
/// Returns the messages for every invalid field.
pub fn validate_sign_up(
    email: &str,
    password: &str,
    confirm_password: &str,
) -> Result<Email, FieldErrors> {
    let parsed = Email::parse(email);
    let mut errors = FieldErrors {
        email: parsed.as_ref().err().map(|_| INVALID_EMAIL.to_string()),
        password: check_password(password),
        confirm_password: check_password(confirm_password),
    };

    if errors.is_empty() && password != confirm_password {
        errors.confirm_password = Some(PASSWORD_MISMATCH.to_string());
    }

    match parsed {
        Ok(email) if errors.is_empty() => Ok(email),
        _ => Err(errors),
    }
}

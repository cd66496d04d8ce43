//! Session-related types.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ltrq_core::{Email, UserId};

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the signed-in shopper.
/// Tokens never go into the cookie session; they live in the shopper's
/// server-side state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Identity provider user id.
    pub id: UserId,
    /// Email address used to sign in.
    pub email: Email,
}

/// Handle to a shopper's server-side cart and assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShopperId(pub Uuid);

impl ShopperId {
    /// Generate a fresh handle.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ShopperId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current signed-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the shopper handle.
    pub const SHOPPER_ID: &str = "shopper_id";
}

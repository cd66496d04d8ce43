//! Authentication and shopper extractors.
//!
//! Provides extractors for the signed-in user and for the shopper's
//! server-side session in route handlers.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;
use tracing::info;

use crate::error::AppError;
use crate::models::{CurrentUser, ShopperId, session_keys};
use crate::state::{AppState, ShopperSession};

fn session_of(parts: &Parts) -> Result<Session, AppError> {
    parts
        .extensions
        .get::<Session>()
        .cloned()
        .ok_or_else(|| AppError::Internal("session layer missing".to_string()))
}

/// Everything the extractors below read from one request.
struct Resolved {
    shopper: Arc<ShopperSession>,
    user: Option<CurrentUser>,
}

async fn resolve(parts: &Parts, state: &AppState) -> Result<Resolved, AppError> {
    let session = session_of(parts)?;
    let shopper = state.shopper(shopper_id(&session).await?).await;
    let user = signed_in_user(&session, &shopper).await?;
    Ok(Resolved { shopper, user })
}

/// The signed-in user, as long as their cart still carries the sign-in.
///
/// The user's tokens live in the shopper session. Once that expires the
/// cart can no longer sync, so the user is signed out instead.
async fn signed_in_user(
    session: &Session,
    shopper: &ShopperSession,
) -> Result<Option<CurrentUser>, tower_sessions::session::Error> {
    let Some(user) = session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await?
    else {
        return Ok(None);
    };

    let attached = shopper
        .cart
        .lock()
        .await
        .identity()
        .is_some_and(|identity| identity.user_id == user.id);
    if attached {
        return Ok(Some(user));
    }

    info!(user_id = %user.id, "Shopper session expired, signing out");
    clear_current_user(session).await?;
    Ok(None)
}

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        resolve(parts, state)
            .await?
            .user
            .map(Self)
            .ok_or_else(|| AppError::Unauthorized("Please sign in".to_string()))
    }
}

/// Extractor that optionally gets the signed-in user.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is
/// signed in.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(resolve(parts, state).await?.user))
    }
}

/// Extractor for the shopper's cart and assistant.
///
/// Creates the shopper handle and its session on first use.
pub struct Shopper(pub Arc<ShopperSession>);

impl FromRequestParts<AppState> for Shopper {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(resolve(parts, state).await?.shopper))
    }
}

/// Get the shopper handle stored in the session, creating one if needed.
///
/// # Errors
///
/// Returns an error if the session cannot be read or modified.
pub async fn shopper_id(session: &Session) -> Result<ShopperId, tower_sessions::session::Error> {
    if let Some(id) = session.get::<ShopperId>(session_keys::SHOPPER_ID).await? {
        return Ok(id);
    }

    let id = ShopperId::generate();
    session.insert(session_keys::SHOPPER_ID, id).await?;
    Ok(id)
}

/// Helper to set the signed-in user in the session.
///
/// Cycles the session id to prevent fixation.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the signed-in user from the session (sign-out).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    Ok(())
}

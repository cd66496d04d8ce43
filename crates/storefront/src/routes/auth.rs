//! Authentication route handlers.
//!
//! Sign-in and sign-up go through the identity provider. On success the
//! user is stored in the cookie session and the shopper's cart is replaced
//! by the one stored remotely.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{info, instrument};

use crate::cart::UserIdentity;
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireAuth, Shopper, clear_current_user, set_current_user};
use crate::models::{CartView, CurrentUser};
use crate::services::auth::{FirebaseTokenSource, SignedInUser, validate_sign_in, validate_sign_up};
use crate::state::{AppState, ShopperSession};

// =============================================================================
// Request Types
// =============================================================================

/// Sign-in form data.
#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Sign-up form data.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Returned after sign-in or sign-up.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: CurrentUser,
    pub cart: CartView,
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle sign-in.
#[instrument(skip_all)]
pub async fn sign_in(
    State(state): State<AppState>,
    Shopper(shopper): Shopper,
    session: Session,
    Json(form): Json<SignInRequest>,
) -> Result<Json<SessionResponse>> {
    let email = validate_sign_in(&form.email, &form.password).map_err(AppError::Validation)?;

    let signed_in = state
        .identity()
        .sign_in(&email, &form.password)
        .await
        .map_err(AppError::SignIn)?;

    start_session(&state, &shopper, &session, &signed_in).await
}

/// Handle sign-up. A new account is signed in straight away.
#[instrument(skip_all)]
pub async fn sign_up(
    State(state): State<AppState>,
    Shopper(shopper): Shopper,
    session: Session,
    Json(form): Json<SignUpRequest>,
) -> Result<Json<SessionResponse>> {
    let email = validate_sign_up(&form.email, &form.password, &form.confirm_password)
        .map_err(AppError::Validation)?;

    let signed_in = state
        .identity()
        .sign_up(&email, &form.password)
        .await
        .map_err(AppError::SignUp)?;

    start_session(&state, &shopper, &session, &signed_in).await
}

/// Handle sign-out.
///
/// Drops any cart write still waiting out the debounce window.
#[instrument(skip_all)]
pub async fn sign_out(Shopper(shopper): Shopper, session: Session) -> Result<StatusCode> {
    shopper.cart.lock().await.logout();
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// The signed-in user.
pub async fn me(RequireAuth(user): RequireAuth) -> Json<CurrentUser> {
    Json(user)
}

async fn start_session(
    state: &AppState,
    shopper: &Arc<ShopperSession>,
    session: &Session,
    signed_in: &SignedInUser,
) -> Result<Json<SessionResponse>> {
    let user = CurrentUser {
        id: signed_in.user_id.clone(),
        email: signed_in.email.clone(),
    };
    let identity = UserIdentity {
        user_id: user.id.clone(),
        email: user.email.clone(),
        tokens: Arc::new(FirebaseTokenSource::new(state.identity().clone(), signed_in)),
    };

    // The cart is signed in before the session so no request sees the
    // user without their cart.
    let mut cart = shopper.cart.lock().await;
    cart.login(identity).await;
    set_current_user(session, &user).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    info!(user_id = %user.id, lines = cart.lines().len(), "Shopper signed in");

    Ok(Json(SessionResponse {
        user,
        cart: cart.view(),
    }))
}

//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Every error response is JSON: `{"error": "...", "fields": {...}}`, where
//! `fields` is only present for form validation failures.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::cart::CartError;
use crate::catalog::{AdminAction, AdminError, CatalogError};
use crate::services::auth::{AuthError, FieldErrors};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Local cart mutation rejected.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Catalog store operation failed.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Admin catalog write failed.
    #[error("Admin error: {source}")]
    Admin {
        action: AdminAction,
        source: AdminError,
    },

    /// Sign-in failed at the identity provider.
    #[error("Sign-in error: {0}")]
    SignIn(AuthError),

    /// Sign-up failed at the identity provider.
    #[error("Sign-up error: {0}")]
    SignUp(AuthError),

    /// Form fields failed validation.
    #[error("Validation failed")]
    Validation(FieldErrors),

    /// Session store operation failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<FieldErrors>,
}

const fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::WrongPassword
        | AuthError::UserNotFound
        | AuthError::InvalidCredentials
        | AuthError::SessionExpired => StatusCode::UNAUTHORIZED,
        AuthError::UserAlreadyExists => StatusCode::CONFLICT,
        AuthError::WeakPassword(_) | AuthError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
        AuthError::Refused(_) => StatusCode::FORBIDDEN,
        AuthError::Provider(_) | AuthError::Http(_) | AuthError::Parse(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

const fn catalog_status(err: &CatalogError) -> StatusCode {
    match err {
        CatalogError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Cart(CartError::InsufficientStock { .. }) => StatusCode::CONFLICT,
            Self::Cart(CartError::InvalidQuantity(_) | CartError::QuantityTooLarge)
            | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Catalog(err) | Self::Admin { source: AdminError::Catalog(err), .. } => {
                catalog_status(err)
            }
            Self::Admin { source: AdminError::NotSignedIn(_), .. } | Self::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Admin { .. } => StatusCode::BAD_REQUEST,
            Self::SignIn(err) | Self::SignUp(err) => auth_status(err),
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Session(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(self) -> ErrorBody {
        let (error, fields) = match self {
            Self::Cart(err) => (err.to_string(), None),
            Self::Catalog(CatalogError::ProductNotFound(_)) => {
                ("Product not found".to_string(), None)
            }
            // Don't expose upstream details to clients
            Self::Catalog(_) => ("External service error".to_string(), None),
            Self::Admin { action, source } => (source.user_message(action), None),
            Self::SignIn(err) => {
                let message = err.sign_in_message();
                (message.to_string(), Some(FieldErrors::password(message)))
            }
            Self::SignUp(err) => {
                let message = err.sign_up_message();
                (message.to_string(), Some(FieldErrors::email(message)))
            }
            Self::Validation(fields) => ("Validation failed".to_string(), Some(fields)),
            Self::Session(_) | Self::Internal(_) => ("Internal server error".to_string(), None),
            Self::NotFound(msg) | Self::Unauthorized(msg) | Self::BadRequest(msg) => (msg, None),
        };
        ErrorBody { error, fields }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                status = status.as_u16(),
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(self.body())).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for shopper actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Line added", Some(&[("item_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

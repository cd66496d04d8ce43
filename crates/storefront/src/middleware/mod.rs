//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Session layer (tower-sessions with in-memory store)

pub mod auth;
pub mod session;

pub use auth::{
    OptionalAuth, RequireAuth, Shopper, clear_current_user, set_current_user, shopper_id,
};
pub use session::create_session_layer;

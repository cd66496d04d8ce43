//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET   /health                    - Liveness check
//! GET   /health/ready              - Readiness check (catalog reachable)
//!
//! # Auth
//! POST  /api/auth/sign-in          - Sign in, load the stored cart
//! POST  /api/auth/sign-up          - Create an account and sign in
//! POST  /api/auth/sign-out         - Sign out, drop the unsent cart write
//! GET   /api/auth/me               - Signed-in user (requires auth)
//!
//! # Cart
//! GET   /api/cart                  - Cart view
//! POST  /api/cart/add              - Add a catalog product
//! POST  /api/cart/remove           - Remove a line
//! POST  /api/cart/increase         - One more unit
//! POST  /api/cart/decrease         - One unit fewer
//! POST  /api/cart/clear            - Empty the cart
//!
//! # Assistant
//! GET   /api/chat                  - Chat view
//! POST  /api/chat/toggle           - Expand or collapse
//! POST  /api/chat/send             - Send a message
//!
//! # Catalog
//! GET   /api/products              - Listable products
//! POST  /api/admin/products        - Add a product (signed-in only)
//! PATCH /api/admin/products/{id}   - Update a product (signed-in only)
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod chat;
pub mod products;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
};
use tower_http::trace::TraceLayer;

use crate::middleware::create_session_layer;
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/sign-in", post(auth::sign_in))
        .route("/sign-up", post(auth::sign_up))
        .route("/sign-out", post(auth::sign_out))
        .route("/me", get(auth::me))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/remove", post(cart::remove))
        .route("/increase", post(cart::increase))
        .route("/decrease", post(cart::decrease))
        .route("/clear", post(cart::clear))
}

/// Create the assistant routes router.
pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(chat::show))
        .route("/toggle", post(chat::toggle))
        .route("/send", post(chat::send))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(admin::add_product))
        .route("/products/{id}", patch(admin::update_product))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/api/products", get(products::index))
        .nest("/api/auth", auth_routes())
        .nest("/api/cart", cart_routes())
        .nest("/api/chat", chat_routes())
        .nest("/api/admin", admin_routes())
}

/// Build the full application with sessions and request tracing.
pub fn app(state: AppState) -> Router {
    let session_layer = create_session_layer(state.config());

    routes()
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the catalog cannot be read.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.catalog().fetch_all().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

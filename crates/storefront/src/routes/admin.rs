//! Admin catalog handlers.
//!
//! Both writes require a signed-in user; the check lives in
//! [`crate::catalog::AdminCatalog`] so the form gets its own message.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use tracing::instrument;

use ltrq_core::{Product, ProductPatch};

use crate::catalog::{AdminAction, added_message, updated_message};
use crate::error::{AppError, Result};
use crate::middleware::OptionalAuth;
use crate::state::AppState;

/// Result of an admin write.
#[derive(Debug, Serialize)]
pub struct AdminResponse {
    pub message: String,
    pub product: Product,
}

/// Create a product.
#[instrument(skip_all)]
pub async fn add_product(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Json(draft): Json<Product>,
) -> Result<(StatusCode, Json<AdminResponse>)> {
    let product = state
        .admin()
        .add_product(user.as_ref(), draft)
        .await
        .map_err(|source| AppError::Admin {
            action: AdminAction::Add,
            source,
        })?;

    Ok((
        StatusCode::CREATED,
        Json(AdminResponse {
            message: added_message(&product),
            product,
        }),
    ))
}

/// Apply a partial update.
#[instrument(skip_all, fields(product_id = %id))]
pub async fn update_product(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<String>,
    Json(patch): Json<ProductPatch>,
) -> Result<Json<AdminResponse>> {
    let product = state
        .admin()
        .update_product(user.as_ref(), &id, &patch)
        .await
        .map_err(|source| AppError::Admin {
            action: AdminAction::Update,
            source,
        })?;

    Ok(Json(AdminResponse {
        message: updated_message(&id),
        product,
    }))
}

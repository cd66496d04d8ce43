//! Cart route handlers.
//!
//! Every mutation answers with the updated cart view. Remote sync happens
//! in the background, so a sync failure shows up in `error` on a later read.

use axum::{
    Json,
    extract::State,
};
use serde::Deserialize;
use tracing::instrument;

use ltrq_core::ItemId;

use crate::cart::DEFAULT_QUANTITY;
use crate::catalog::find_by_item_id;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::Shopper;
use crate::models::CartView;
use crate::state::AppState;

/// Add-to-cart request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLineRequest {
    pub item_id: ItemId,
    pub size: String,
    pub color: String,
    pub quantity: Option<i64>,
}

/// Identifies one cart line.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineKey {
    pub item_id: ItemId,
    pub size: String,
    pub color: String,
}

/// Current cart.
pub async fn show(Shopper(shopper): Shopper) -> Json<CartView> {
    Json(shopper.cart.lock().await.view())
}

/// Add a catalog product to the cart.
#[instrument(skip_all, fields(item_id = %request.item_id))]
pub async fn add(
    State(state): State<AppState>,
    Shopper(shopper): Shopper,
    Json(request): Json<AddLineRequest>,
) -> Result<Json<CartView>> {
    let product = find_by_item_id(state.catalog().as_ref(), request.item_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    let mut cart = shopper.cart.lock().await;
    cart.add_line(
        product,
        request.size,
        request.color,
        request.quantity.unwrap_or(DEFAULT_QUANTITY),
    )?;

    add_breadcrumb(
        "cart",
        "Line added",
        Some(&[("item_id", &request.item_id.to_string())]),
    );
    Ok(Json(cart.view()))
}

/// Remove a line.
pub async fn remove(Shopper(shopper): Shopper, Json(key): Json<LineKey>) -> Json<CartView> {
    let mut cart = shopper.cart.lock().await;
    cart.remove_line(key.item_id, &key.size, &key.color);
    Json(cart.view())
}

/// Add one unit to a line.
pub async fn increase(
    Shopper(shopper): Shopper,
    Json(key): Json<LineKey>,
) -> Result<Json<CartView>> {
    let mut cart = shopper.cart.lock().await;
    cart.increase_quantity(key.item_id, &key.size, &key.color)?;
    Ok(Json(cart.view()))
}

/// Take one unit off a line.
pub async fn decrease(Shopper(shopper): Shopper, Json(key): Json<LineKey>) -> Json<CartView> {
    let mut cart = shopper.cart.lock().await;
    cart.decrease_quantity(key.item_id, &key.size, &key.color);
    Json(cart.view())
}

/// Empty the cart.
pub async fn clear(Shopper(shopper): Shopper) -> Json<CartView> {
    let mut cart = shopper.cart.lock().await;
    cart.clear();
    Json(cart.view())
}

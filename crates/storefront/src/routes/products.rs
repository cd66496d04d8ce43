//! Product catalog handlers.

use axum::{Json, extract::State};

use ltrq_core::Product;

use crate::error::Result;
use crate::state::AppState;

/// Catalog records that can be listed.
pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    let products = state
        .catalog()
        .fetch_all()
        .await?
        .into_iter()
        .filter(Product::has_required_fields)
        .collect();
    Ok(Json(products))
}

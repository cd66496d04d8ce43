//! Admin catalog editing.
//!
//! Only signed-in shoppers may write. This is a convenience check on the
//! storefront side; the catalog token itself is what the store trusts.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use ltrq_core::{ItemId, Metric, NOT_AVAILABLE, Product, ProductPatch, RowId};

use super::{CatalogError, CatalogStore};
use crate::models::CurrentUser;

/// Which admin form produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Add,
    Update,
}

impl AdminAction {
    const fn verb(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
        }
    }

    const fn gerund(self) -> &'static str {
        match self {
            Self::Add => "adding",
            Self::Update => "updating",
        }
    }
}

/// Errors from admin catalog writes.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Please log in to {} products.", .0.verb())]
    NotSignedIn(AdminAction),

    #[error("Please fill all required fields: itemName, price, color, itemSize")]
    MissingRequiredFields,

    #[error("Please enter a product ID to update")]
    MissingProductId,

    #[error("Product ID must be a number: {0}")]
    InvalidProductId(String),

    #[error("Please provide at least one field to update")]
    EmptyUpdate,

    #[error("{0}")]
    Catalog(#[from] CatalogError),
}

impl AdminError {
    /// Message shown on the admin form.
    #[must_use]
    pub fn user_message(&self, action: AdminAction) -> String {
        match self {
            Self::NotSignedIn(_) => self.to_string(),
            Self::Catalog(CatalogError::ProductNotFound(_)) => {
                format!("Error {} product: Product not found", action.gerund())
            }
            Self::Catalog(_) => format!(
                "Error {} product: Failed to {} product",
                action.gerund(),
                action.verb()
            ),
            _ => format!("Error {} product: {self}", action.gerund()),
        }
    }

    /// Whether the caller sent something invalid, as opposed to a store failure.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Catalog(_) | Self::NotSignedIn(_))
    }
}

/// Admin-side writes to the catalog.
#[derive(Clone)]
pub struct AdminCatalog {
    store: Arc<dyn CatalogStore>,
}

impl AdminCatalog {
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Validate a new product, fill defaults and create it.
    ///
    /// # Errors
    ///
    /// Returns `AdminError` on a missing sign-in, missing required fields
    /// or a store failure.
    pub async fn add_product(
        &self,
        user: Option<&CurrentUser>,
        draft: Product,
    ) -> Result<Product, AdminError> {
        let user = user.ok_or(AdminError::NotSignedIn(AdminAction::Add))?;
        if !draft.has_required_fields() {
            return Err(AdminError::MissingRequiredFields);
        }

        let product = with_defaults(draft, Utc::now().timestamp_millis());
        let created = self.store.add_product(&product).await?;

        info!(
            user_id = %user.id,
            row_id = ?created.id,
            item_id = %created.item_id,
            "Product added"
        );
        Ok(created)
    }

    /// Apply a partial update to the row with the given id.
    ///
    /// # Errors
    ///
    /// Returns `AdminError` on a missing sign-in, a blank or malformed id,
    /// an empty patch or a store failure.
    pub async fn update_product(
        &self,
        user: Option<&CurrentUser>,
        product_id: &str,
        patch: &ProductPatch,
    ) -> Result<Product, AdminError> {
        let user = user.ok_or(AdminError::NotSignedIn(AdminAction::Update))?;

        let product_id = product_id.trim();
        if product_id.is_empty() {
            return Err(AdminError::MissingProductId);
        }
        let row_id = product_id
            .parse::<i64>()
            .map(RowId::new)
            .map_err(|_| AdminError::InvalidProductId(product_id.to_string()))?;

        if patch.is_empty() {
            return Err(AdminError::EmptyUpdate);
        }

        let updated = self.store.update_product(row_id, patch).await?;
        info!(user_id = %user.id, row_id = %row_id, "Product updated");
        Ok(updated)
    }
}

/// Message reported after a successful add.
#[must_use]
pub fn added_message(product: &Product) -> String {
    let id = product
        .id
        .map_or_else(|| product.item_id.to_string(), |id| id.to_string());
    format!("Product added successfully with ID: {id}")
}

/// Message reported after a successful update.
#[must_use]
pub fn updated_message(product_id: &str) -> String {
    format!("Product {} updated successfully", product_id.trim())
}

fn or_not_available(value: String) -> String {
    if value.trim().is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        value
    }
}

/// Fill the fields a new record must not leave blank.
fn with_defaults(mut product: Product, now_millis: i64) -> Product {
    if product.item_id.as_i64() == 0 {
        product.item_id = ItemId::new(now_millis);
    }
    if product.sku.trim().is_empty() {
        product.sku = format!("SKU-{now_millis}");
    }
    product.material = or_not_available(product.material);
    product.dimension = or_not_available(product.dimension);
    product.category_id = or_not_available(product.category_id);
    product.sub_category_id = or_not_available(product.sub_category_id);
    if matches!(&product.average_rating, Metric::Text(text) if text.trim().is_empty()) {
        product.average_rating = Metric::default();
    }
    if matches!(&product.review_count, Metric::Text(text) if text.trim().is_empty()) {
        product.review_count = Metric::default();
    }
    product.id = None;
    product
}

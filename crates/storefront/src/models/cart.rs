//! Cart line and projection types.

use serde::{Deserialize, Serialize};

use ltrq_core::{ItemId, Price, Product};

/// One line of a shopper's cart.
///
/// The line holds a snapshot of the catalog record it was added from; the
/// record's `itemID` is the line's product reference. This is also the shape
/// the remote cart store reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: Product,
    pub quantity: i64,
    pub size: String,
    pub color: String,
}

impl CartLine {
    /// Whether this line has the given `(item, size, color)` key.
    #[must_use]
    pub fn matches(&self, item_id: ItemId, size: &str, color: &str) -> bool {
        self.product.item_id == item_id && self.size == size && self.color == color
    }
}

/// A cart line as the shopping assistant sees it.
///
/// Casing matches what the prompt templates describe to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCartItem {
    #[serde(rename = "itemName")]
    pub item_name: String,
    #[serde(rename = "Price")]
    pub price: Price,
    #[serde(rename = "Color")]
    pub color: String,
    #[serde(rename = "ItemSize")]
    pub item_size: String,
    #[serde(rename = "Quantity")]
    pub quantity: i64,
}

impl From<&CartLine> for ExternalCartItem {
    fn from(line: &CartLine) -> Self {
        Self {
            item_name: line.product.item_name.clone(),
            price: line.product.price,
            // Colour comes from the catalog record, size from the chosen line.
            color: line.product.color.clone(),
            item_size: line.size.clone(),
            quantity: line.quantity,
        }
    }
}

/// Cart state returned by the cart API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub total_quantity: i64,
    pub error: Option<String>,
    pub is_loading: bool,
}

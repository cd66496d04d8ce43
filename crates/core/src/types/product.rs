//! Catalog product records.
//!
//! Field names follow the remote product store's casing exactly (`itemName`,
//! `SKU`, `imgURL1`, ...), so records deserialize straight from the store and
//! serialize back unchanged for admin writes and remote cart payloads.

use serde::{Deserialize, Deserializer, Serialize};

use super::id::{ItemId, RowId};
use super::price::Price;
use super::status::ProductStatus;

/// Placeholder the store uses for unset text fields.
pub const NOT_AVAILABLE: &str = "N/A";

/// A number that the store sometimes keeps as free text (ratings, review counts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metric {
    Number(f64),
    Text(String),
}

impl Default for Metric {
    fn default() -> Self {
        Self::Text(NOT_AVAILABLE.to_owned())
    }
}

/// A product record from the catalog store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Product {
    /// Row id assigned by the store; absent on records that were never stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RowId>,
    #[serde(rename = "itemID", deserialize_with = "lenient_id")]
    pub item_id: ItemId,
    #[serde(rename = "itemName")]
    pub item_name: String,
    pub price: Price,
    #[serde(rename = "stockQuantity", deserialize_with = "lenient_i64")]
    pub stock_quantity: i64,
    pub color: String,
    #[serde(rename = "itemSize")]
    pub item_size: String,
    pub description: String,
    pub material: String,
    pub dimension: String,
    pub status: ProductStatus,
    #[serde(rename = "SKU")]
    pub sku: String,
    #[serde(rename = "categoryID")]
    pub category_id: String,
    #[serde(rename = "subCategoryID")]
    pub sub_category_id: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub discount: f64,
    #[serde(rename = "isOnSale")]
    pub is_on_sale: bool,
    #[serde(rename = "averageRating")]
    pub average_rating: Metric,
    #[serde(rename = "reviewCount")]
    pub review_count: Metric,
    #[serde(rename = "imgURL1", skip_serializing_if = "Option::is_none")]
    pub img_url1: Option<String>,
    #[serde(rename = "imgURL2", skip_serializing_if = "Option::is_none")]
    pub img_url2: Option<String>,
    #[serde(rename = "imgURL3", skip_serializing_if = "Option::is_none")]
    pub img_url3: Option<String>,
    #[serde(rename = "saleStartDate")]
    pub sale_start_date: Option<serde_json::Value>,
    #[serde(rename = "saleEndDate")]
    pub sale_end_date: Option<serde_json::Value>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<serde_json::Value>,
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<serde_json::Value>,
}

impl Product {
    /// Whether the record has a name, a non-zero price, a colour and a size.
    ///
    /// Records missing any of these cannot be listed or recommended.
    #[must_use]
    pub fn has_required_fields(&self) -> bool {
        !self.item_name.trim().is_empty()
            && !self.price.is_zero()
            && !self.color.trim().is_empty()
            && !self.item_size.trim().is_empty()
    }
}

/// A partial product record for admin updates.
///
/// Only the fields that are `Some` are sent to the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductPatch {
    #[serde(rename = "itemName", skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    #[serde(rename = "stockQuantity", skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "itemSize", skip_serializing_if = "Option::is_none")]
    pub item_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProductStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<f64>,
    #[serde(rename = "isOnSale", skip_serializing_if = "Option::is_none")]
    pub is_on_sale: Option<bool>,
    #[serde(rename = "SKU", skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
}

impl ProductPatch {
    /// Whether the patch would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Int(i64),
    Float(f64),
    Text(String),
    Null(()),
}

impl NumberOrText {
    fn into_f64(self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)] // Stock counts and ids stay far below 2^52
            Self::Int(i) => Some(i as f64),
            Self::Float(f) => Some(f),
            Self::Text(s) if s.trim().is_empty() => Some(0.0),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null(()) => Some(0.0),
        }
    }

    fn into_i64(self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(i),
            #[allow(clippy::cast_possible_truncation)] // Whole numbers sent as floats
            Self::Float(f) if f.fract() == 0.0 => Some(f as i64),
            Self::Float(_) => None,
            Self::Text(s) if s.trim().is_empty() => Some(0),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null(()) => Some(0),
        }
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    NumberOrText::deserialize(deserializer)?
        .into_i64()
        .ok_or_else(|| serde::de::Error::custom("expected a whole number"))
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    NumberOrText::deserialize(deserializer)?
        .into_f64()
        .ok_or_else(|| serde::de::Error::custom("expected a number"))
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ItemId, D::Error> {
    lenient_i64(deserializer).map(ItemId::new)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_firestore_record() {
        let json = serde_json::json!({
            "itemID": 3,
            "itemName": "Slim Fit Shirt",
            "price": 29.99,
            "stockQuantity": 12,
            "color": "Red",
            "itemSize": "S",
            "averageRating": 4.5,
            "reviewCount": "N/A",
            "SKU": "SKU-SHIRT-RED-S",
            "isOnSale": true,
            "saleStartDate": null
        });
        let product: Product = serde_json::from_value(json).unwrap();
        assert_eq!(product.item_id, ItemId::new(3));
        assert_eq!(product.price, Price::from_cents(2999));
        assert_eq!(product.stock_quantity, 12);
        assert_eq!(product.average_rating, Metric::Number(4.5));
        assert_eq!(product.review_count, Metric::Text("N/A".to_string()));
        assert_eq!(product.status, ProductStatus::Active);
        assert!(product.is_on_sale);
        assert!(product.id.is_none());
    }

    #[test]
    fn test_deserialize_baserow_row_with_string_numbers() {
        let json = serde_json::json!({
            "id": 17,
            "itemID": "1717",
            "itemName": "Classic Jeans",
            "price": "39.99",
            "stockQuantity": "4",
            "discount": "",
            "color": "Blue",
            "itemSize": "M"
        });
        let product: Product = serde_json::from_value(json).unwrap();
        assert_eq!(product.id, Some(RowId::new(17)));
        assert_eq!(product.item_id, ItemId::new(1717));
        assert_eq!(product.stock_quantity, 4);
        assert!(product.discount.abs() < f64::EPSILON);
    }

    #[test]
    fn test_serialize_uses_store_casing() {
        let product = Product {
            item_id: ItemId::new(9),
            item_name: "Socks".to_string(),
            sku: "SKU-9".to_string(),
            img_url1: Some("https://img/1.png".to_string()),
            ..Product::default()
        };
        let value = serde_json::to_value(&product).unwrap();
        assert_eq!(value["itemID"], 9);
        assert_eq!(value["itemName"], "Socks");
        assert_eq!(value["SKU"], "SKU-9");
        assert_eq!(value["imgURL1"], "https://img/1.png");
        assert!(value.get("imgURL2").is_none());
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_has_required_fields() {
        let mut product = Product {
            item_name: "Shirt".to_string(),
            price: Price::from_cents(1000),
            color: "Red".to_string(),
            item_size: "M".to_string(),
            ..Product::default()
        };
        assert!(product.has_required_fields());
        product.price = Price::default();
        assert!(!product.has_required_fields());
    }

    #[test]
    fn test_patch_only_sends_set_fields() {
        let patch = ProductPatch {
            price: Some(Price::from_cents(1499)),
            is_on_sale: Some(false),
            ..ProductPatch::default()
        };
        assert!(!patch.is_empty());
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, serde_json::json!({ "price": 14.99, "isOnSale": false }));
        assert!(ProductPatch::default().is_empty());
    }
}

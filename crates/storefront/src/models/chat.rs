//! Chat transcript types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ltrq_core::{ChatRole, Price, Product};

/// One message in the assistant transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub text: String,
    pub is_user: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// A message typed by the shopper.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: true,
            created_at: Utc::now(),
        }
    }

    /// A message produced by the assistant.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: false,
            created_at: Utc::now(),
        }
    }

    /// Role of this message on the completion wire format.
    #[must_use]
    pub const fn role(&self) -> ChatRole {
        if self.is_user {
            ChatRole::User
        } else {
            ChatRole::Assistant
        }
    }
}

/// The catalog fields the assistant describes to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantProduct {
    #[serde(rename = "itemName")]
    pub item_name: String,
    #[serde(rename = "Price")]
    pub price: Price,
    #[serde(rename = "Color")]
    pub color: String,
    #[serde(rename = "ItemSize")]
    pub item_size: String,
}

impl AssistantProduct {
    /// Used when the catalog cannot be loaded.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            item_name: "Slim Fit Shirt".to_string(),
            price: Price::from_cents(2999),
            color: "Red".to_string(),
            item_size: "S".to_string(),
        }
    }
}

impl From<&Product> for AssistantProduct {
    fn from(product: &Product) -> Self {
        Self {
            item_name: product.item_name.clone(),
            price: product.price,
            color: product.color.clone(),
            item_size: product.item_size.clone(),
        }
    }
}

/// Assistant state returned by the chat API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub messages: Vec<ChatMessage>,
    pub is_expanded: bool,
    pub is_loading: bool,
    pub show_popup: bool,
    pub is_products_loading: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_message_roles() {
        assert_eq!(ChatMessage::user("hi").role(), ChatRole::User);
        assert_eq!(ChatMessage::assistant("hello").role(), ChatRole::Assistant);
    }

    #[test]
    fn test_assistant_product_wire_shape() {
        let json = serde_json::to_string(&AssistantProduct::fallback()).unwrap();
        assert_eq!(
            json,
            r#"{"itemName":"Slim Fit Shirt","Price":29.99,"Color":"Red","ItemSize":"S"}"#
        );
    }

    #[test]
    fn test_message_serializes_camel_case() {
        let value = serde_json::to_value(ChatMessage::user("track my order")).unwrap();
        assert_eq!(value["isUser"], true);
        assert!(value.get("createdAt").is_some());
    }
}

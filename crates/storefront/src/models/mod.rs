//! Domain models for storefront.

pub mod cart;
pub mod chat;
pub mod session;

pub use cart::{CartLine, CartView, ExternalCartItem};
pub use chat::{AssistantProduct, ChatMessage, ChatView};
pub use session::{CurrentUser, ShopperId, keys as session_keys};

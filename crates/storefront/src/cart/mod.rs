//! Shopper cart with optimistic local state and a debounced remote mirror.
//!
//! The local line list is authoritative for everything the shopper sees.
//! Mutations apply immediately and then hand the full snapshot to the sync
//! task (see [`sync`]), which writes it to the [`CartStore`] once the
//! debounce window passes quietly. Remote failures only set
//! [`CartManager::error`]; they never roll local state back.
//!
//! At sign-in the remote cart replaces local state wholesale. After that
//! the local copy wins.

pub mod store;
pub mod sync;

pub use store::{CartStore, CartStoreError, CartStoreFuture, CartSyncPayload, HttpCartStore};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, instrument, warn};

use ltrq_core::{Email, ItemId, Product, UserId};

use crate::models::{CartLine, CartView, ExternalCartItem};
use crate::services::auth::TokenSource;
use sync::{PendingWrite, SyncHandle, SyncStatus};

/// Quantity used when the caller does not pick one.
pub const DEFAULT_QUANTITY: i64 = 1;

/// Errors from local cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Requested more than the catalog record has in stock.
    #[error("Insufficient stock")]
    InsufficientStock { requested: i64, available: i64 },

    /// A new line must start with at least one unit.
    #[error("Quantity must be at least 1")]
    InvalidQuantity(i64),

    /// The merged line quantity does not fit.
    #[error("Quantity too large")]
    QuantityTooLarge,
}

/// The signed-in shopper a cart belongs to.
#[derive(Clone)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub email: Email,
    pub tokens: Arc<dyn TokenSource>,
}

impl std::fmt::Debug for UserIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserIdentity")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Owns one shopper's cart.
///
/// Must be created inside a tokio runtime; it spawns its sync task.
pub struct CartManager {
    lines: Vec<CartLine>,
    identity: Option<UserIdentity>,
    store: Arc<dyn CartStore>,
    status: Arc<SyncStatus>,
    sync: SyncHandle,
}

impl CartManager {
    /// Create an empty guest cart.
    #[must_use]
    pub fn new(store: Arc<dyn CartStore>, debounce: Duration) -> Self {
        let status = Arc::new(SyncStatus::default());
        let sync = SyncHandle::spawn(Arc::clone(&store), Arc::clone(&status), debounce);

        Self {
            lines: Vec::new(),
            identity: None,
            store,
            status,
            sync,
        }
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// The signed-in shopper, if any.
    #[must_use]
    pub const fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    /// Last user-visible sync or fetch error.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.status.error()
    }

    /// True while the sign-in fetch is running.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status.is_loading()
    }

    /// Sum of line quantities.
    #[must_use]
    pub fn total_quantity(&self) -> i64 {
        self.lines
            .iter()
            .fold(0, |total: i64, line| total.saturating_add(line.quantity))
    }

    /// Add `quantity` units of `product` in the given size and colour.
    ///
    /// Merges into an existing line with the same key; a merged total below
    /// one removes the line. A negative quantity therefore decrements.
    ///
    /// # Errors
    ///
    /// - `CartError::InsufficientStock` when `quantity` exceeds the
    ///   record's stock; the cart is left unchanged.
    /// - `CartError::InvalidQuantity` when a new line would start below one.
    /// - `CartError::QuantityTooLarge` when the merged quantity overflows.
    pub fn add_line(
        &mut self,
        product: Product,
        size: impl Into<String>,
        color: impl Into<String>,
        quantity: i64,
    ) -> Result<(), CartError> {
        self.status.set_error(None);

        if quantity > product.stock_quantity {
            let err = CartError::InsufficientStock {
                requested: quantity,
                available: product.stock_quantity,
            };
            self.status.set_error(Some(err.to_string()));
            return Err(err);
        }

        self.merge(product, size.into(), color.into(), quantity)?;
        self.schedule_sync();
        Ok(())
    }

    /// Remove the line with the given key. Absent lines are ignored.
    pub fn remove_line(&mut self, item_id: ItemId, size: &str, color: &str) {
        self.lines.retain(|line| !line.matches(item_id, size, color));
        self.schedule_sync();
    }

    /// Add one unit to an existing line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InsufficientStock` when the line's product
    /// snapshot has no stock for one more unit.
    pub fn increase_quantity(
        &mut self,
        item_id: ItemId,
        size: &str,
        color: &str,
    ) -> Result<(), CartError> {
        match self.find(item_id, size, color) {
            Some(line) => {
                let product = line.product.clone();
                self.add_line(product, size, color, 1)
            }
            None => Ok(()),
        }
    }

    /// Take one unit off an existing line, removing it at quantity one.
    pub fn decrease_quantity(&mut self, item_id: ItemId, size: &str, color: &str) {
        match self.find(item_id, size, color) {
            Some(line) if line.quantity > 1 => {
                let product = line.product.clone();
                // Taking a unit away never needs stock.
                if self.merge(product, size.to_string(), color.to_string(), -1).is_ok() {
                    self.schedule_sync();
                }
            }
            Some(_) => self.remove_line(item_id, size, color),
            None => {}
        }
    }

    /// Empty the cart and sync the empty snapshot.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.schedule_sync();
    }

    /// Lines in the shape the shopping assistant reads.
    #[must_use]
    pub fn to_external(&self) -> Vec<ExternalCartItem> {
        self.lines.iter().map(ExternalCartItem::from).collect()
    }

    /// [`Self::to_external`] as a JSON string.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_external_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_external())
    }

    /// Snapshot for the cart API.
    #[must_use]
    pub fn view(&self) -> CartView {
        CartView {
            lines: self.lines.clone(),
            total_quantity: self.total_quantity(),
            error: self.error(),
            is_loading: self.is_loading(),
        }
    }

    /// Attach a shopper and load their stored cart.
    ///
    /// The remote cart replaces local lines. On failure the cart is emptied
    /// and the error is recorded.
    #[instrument(skip_all, fields(user_id = %identity.user_id))]
    pub async fn login(&mut self, identity: UserIdentity) {
        self.sync.discard();
        self.status.set_loading(true);

        let fetched = match identity.tokens.id_token().await {
            Ok(token) => self.store.fetch(&token).await,
            Err(e) => Err(CartStoreError::Token(e.to_string())),
        };

        match fetched {
            Ok(lines) => {
                info!(lines = lines.len(), "Loaded remote cart");
                self.lines = lines;
                self.status.set_error(None);
            }
            Err(e) => {
                warn!(error = %e, "Failed to load remote cart");
                self.lines.clear();
                self.status.set_error(Some(e.fetch_message()));
            }
        }

        self.identity = Some(identity);
        self.status.set_loading(false);
    }

    /// Detach the shopper, dropping any unsent write and the local lines.
    pub fn logout(&mut self) {
        self.sync.discard();
        self.identity = None;
        self.lines.clear();
        self.status.set_error(None);
    }

    fn find(&self, item_id: ItemId, size: &str, color: &str) -> Option<&CartLine> {
        self.lines
            .iter()
            .find(|line| line.matches(item_id, size, color))
    }

    fn merge(
        &mut self,
        product: Product,
        size: String,
        color: String,
        quantity: i64,
    ) -> Result<(), CartError> {
        let item_id = product.item_id;
        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|line| line.matches(item_id, &size, &color))
        {
            line.quantity = line
                .quantity
                .checked_add(quantity)
                .ok_or(CartError::QuantityTooLarge)?;
        } else {
            if quantity < 1 {
                return Err(CartError::InvalidQuantity(quantity));
            }
            self.lines.push(CartLine {
                product,
                quantity,
                size,
                color,
            });
        }

        self.lines.retain(|line| line.quantity >= 1);
        Ok(())
    }

    fn schedule_sync(&self) {
        // Guests keep their cart locally only.
        if let Some(identity) = &self.identity {
            self.sync.push(PendingWrite {
                identity: identity.clone(),
                lines: self.lines.clone(),
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use ltrq_core::Price;
    use secrecy::{ExposeSecret, SecretString};

    use super::*;
    use crate::services::auth::StaticTokenSource;

    const WINDOW: Duration = Duration::from_millis(500);

    #[derive(Default)]
    struct FakeStore {
        pushes: Mutex<Vec<CartSyncPayload>>,
        tokens: Mutex<Vec<String>>,
        remote: Mutex<Option<Vec<CartLine>>>,
        reject_pushes: Mutex<bool>,
    }

    impl FakeStore {
        fn pushes(&self) -> Vec<CartSyncPayload> {
            self.pushes.lock().unwrap().clone()
        }
    }

    impl CartStore for FakeStore {
        fn fetch<'a>(&'a self, token: &'a SecretString) -> CartStoreFuture<'a, Vec<CartLine>> {
            Box::pin(async move {
                self.tokens
                    .lock()
                    .unwrap()
                    .push(token.expose_secret().to_string());
                self.remote
                    .lock()
                    .unwrap()
                    .clone()
                    .ok_or_else(|| CartStoreError::Rejected {
                        status: 500,
                        message: "Cart not readable".to_string(),
                    })
            })
        }

        fn push<'a>(
            &'a self,
            _token: &'a SecretString,
            payload: &'a CartSyncPayload,
        ) -> CartStoreFuture<'a, ()> {
            Box::pin(async move {
                if *self.reject_pushes.lock().unwrap() {
                    return Err(CartStoreError::Rejected {
                        status: 500,
                        message: "Write failed".to_string(),
                    });
                }
                self.pushes.lock().unwrap().push(payload.clone());
                Ok(())
            })
        }
    }

    fn product(id: i64, stock: i64) -> Product {
        Product {
            item_id: ItemId::new(id),
            item_name: format!("Item {id}"),
            price: Price::from_cents(2999),
            stock_quantity: stock,
            color: "Red".to_string(),
            item_size: "S".to_string(),
            ..Product::default()
        }
    }

    fn identity() -> UserIdentity {
        UserIdentity {
            user_id: UserId::new("uid-1"),
            email: Email::parse("shopper@ltrq.shop").unwrap(),
            tokens: Arc::new(StaticTokenSource::new("id-token")),
        }
    }

    async fn signed_in(store: &Arc<FakeStore>) -> CartManager {
        *store.remote.lock().unwrap() = Some(Vec::new());
        let mut cart = CartManager::new(Arc::clone(store) as Arc<dyn CartStore>, WINDOW);
        cart.login(identity()).await;
        cart
    }

    #[tokio::test]
    async fn test_same_key_merges() {
        let mut cart = CartManager::new(Arc::new(FakeStore::default()), WINDOW);
        cart.add_line(product(1, 10), "M", "Blue", 2).unwrap();
        cart.add_line(product(1, 10), "M", "Blue", 3).unwrap();

        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 5);
    }

    #[tokio::test]
    async fn test_different_size_is_a_new_line() {
        let mut cart = CartManager::new(Arc::new(FakeStore::default()), WINDOW);
        cart.add_line(product(1, 10), "M", "Blue", 1).unwrap();
        cart.add_line(product(1, 10), "L", "Blue", 1).unwrap();
        assert_eq!(cart.lines().len(), 2);
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_cart_unchanged() {
        let mut cart = CartManager::new(Arc::new(FakeStore::default()), WINDOW);
        cart.add_line(product(1, 3), "M", "Blue", 2).unwrap();

        let err = cart.add_line(product(1, 3), "M", "Blue", 4).unwrap_err();
        assert_eq!(
            err,
            CartError::InsufficientStock {
                requested: 4,
                available: 3
            }
        );
        assert_eq!(cart.lines()[0].quantity, 2);
        assert_eq!(cart.error().as_deref(), Some("Insufficient stock"));

        cart.add_line(product(1, 3), "M", "Blue", 1).unwrap();
        assert!(cart.error().is_none());
    }

    #[tokio::test]
    async fn test_new_line_below_one_is_rejected() {
        let mut cart = CartManager::new(Arc::new(FakeStore::default()), WINDOW);
        let err = cart.add_line(product(1, 3), "M", "Blue", 0).unwrap_err();
        assert_eq!(err, CartError::InvalidQuantity(0));
        assert!(cart.lines().is_empty());
    }

    #[tokio::test]
    async fn test_overflowing_merge_is_rejected() {
        let mut cart = CartManager::new(Arc::new(FakeStore::default()), WINDOW);
        cart.add_line(product(1, i64::MAX), "M", "Blue", i64::MAX).unwrap();

        let err = cart.add_line(product(1, i64::MAX), "M", "Blue", 1).unwrap_err();
        assert_eq!(err, CartError::QuantityTooLarge);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, i64::MAX);

        cart.add_line(product(1, i64::MAX), "L", "Blue", i64::MAX).unwrap();
        assert_eq!(cart.total_quantity(), i64::MAX);
    }

    #[tokio::test]
    async fn test_negative_merge_below_one_removes_line() {
        let mut cart = CartManager::new(Arc::new(FakeStore::default()), WINDOW);
        cart.add_line(product(1, 5), "M", "Blue", 2).unwrap();
        cart.add_line(product(1, 5), "M", "Blue", -3).unwrap();
        assert!(cart.lines().is_empty());
    }

    #[tokio::test]
    async fn test_decrease_quantity() {
        let mut cart = CartManager::new(Arc::new(FakeStore::default()), WINDOW);
        cart.add_line(product(1, 5), "M", "Blue", 2).unwrap();

        cart.decrease_quantity(ItemId::new(1), "M", "Blue");
        assert_eq!(cart.lines()[0].quantity, 1);

        cart.decrease_quantity(ItemId::new(1), "M", "Blue");
        assert!(cart.lines().is_empty());

        // Absent line: nothing happens.
        cart.decrease_quantity(ItemId::new(1), "M", "Blue");
        assert!(cart.lines().is_empty());
    }

    #[tokio::test]
    async fn test_increase_quantity_uses_stored_stock() {
        let mut cart = CartManager::new(Arc::new(FakeStore::default()), WINDOW);
        cart.add_line(product(1, 1), "M", "Blue", 1).unwrap();

        assert!(matches!(
            cart.increase_quantity(ItemId::new(1), "M", "Blue"),
            Ok(())
        ));
        assert_eq!(cart.lines()[0].quantity, 2);

        // Only acts on existing lines.
        cart.increase_quantity(ItemId::new(2), "M", "Blue").unwrap();
        assert_eq!(cart.lines().len(), 1);
    }

    #[tokio::test]
    async fn test_increase_quantity_respects_stock() {
        let mut cart = CartManager::new(Arc::new(FakeStore::default()), WINDOW);
        cart.add_line(product(2, 1), "M", "Blue", 1).unwrap();
        // The line keeps the snapshot it was added with.
        cart.lines[0].product = product(2, 0);

        let err = cart.increase_quantity(ItemId::new(2), "M", "Blue").unwrap_err();
        assert!(matches!(err, CartError::InsufficientStock { .. }));
        assert_eq!(cart.lines()[0].quantity, 1);
    }

    #[tokio::test]
    async fn test_remove_line_and_total_quantity() {
        let mut cart = CartManager::new(Arc::new(FakeStore::default()), WINDOW);
        cart.add_line(product(1, 10), "M", "Blue", 2).unwrap();
        cart.add_line(product(2, 10), "S", "Red", 3).unwrap();
        cart.add_line(product(3, 10), "L", "Black", 4).unwrap();
        assert_eq!(cart.total_quantity(), 9);

        cart.remove_line(ItemId::new(2), "S", "Red");
        assert_eq!(cart.total_quantity(), 6);

        cart.remove_line(ItemId::new(9), "S", "Red");
        assert_eq!(cart.total_quantity(), 6);
        assert_eq!(
            cart.total_quantity(),
            cart.lines().iter().map(|l| l.quantity).sum::<i64>()
        );
    }

    #[tokio::test]
    async fn test_external_json() {
        let mut cart = CartManager::new(Arc::new(FakeStore::default()), WINDOW);
        cart.add_line(product(1, 10), "M", "Blue", 2).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&cart.to_external_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "itemName": "Item 1",
                "Price": 29.99,
                "Color": "Red",
                "ItemSize": "M",
                "Quantity": 2
            }])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_guest_mutations_stay_local() {
        let store = Arc::new(FakeStore::default());
        let mut cart = CartManager::new(Arc::clone(&store) as Arc<dyn CartStore>, WINDOW);
        cart.add_line(product(1, 10), "M", "Blue", 1).unwrap();

        tokio::time::sleep(WINDOW * 4).await;
        assert!(store.pushes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_mutations_write_once_with_last_snapshot() {
        let store = Arc::new(FakeStore::default());
        let mut cart = signed_in(&store).await;

        cart.add_line(product(1, 10), "M", "Blue", 1).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        cart.add_line(product(1, 10), "M", "Blue", 1).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        cart.add_line(product(2, 10), "S", "Red", 1).unwrap();

        // Window restarted by each mutation, nothing written yet.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(store.pushes().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let pushes = store.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].cart, cart.lines());
        assert_eq!(pushes[0].user_id, UserId::new("uid-1"));
        assert_eq!(pushes[0].email.as_str(), "shopper@ltrq.shop");
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_syncs_empty_snapshot() {
        let store = Arc::new(FakeStore::default());
        let mut cart = signed_in(&store).await;
        cart.add_line(product(1, 10), "M", "Blue", 3).unwrap();
        tokio::time::sleep(WINDOW * 2).await;

        cart.clear();
        assert_eq!(cart.total_quantity(), 0);

        tokio::time::sleep(WINDOW * 2).await;
        let pushes = store.pushes();
        assert_eq!(pushes.len(), 2);
        assert!(pushes[1].cart.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_discards_pending_write() {
        let store = Arc::new(FakeStore::default());
        let mut cart = signed_in(&store).await;
        cart.add_line(product(1, 10), "M", "Blue", 1).unwrap();

        cart.logout();
        assert!(cart.lines().is_empty());
        assert!(cart.identity().is_none());

        tokio::time::sleep(WINDOW * 4).await;
        assert!(store.pushes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_failure_keeps_local_state() {
        let store = Arc::new(FakeStore::default());
        let mut cart = signed_in(&store).await;
        *store.reject_pushes.lock().unwrap() = true;

        cart.add_line(product(1, 10), "M", "Blue", 2).unwrap();
        tokio::time::sleep(WINDOW * 2).await;

        assert_eq!(cart.error().as_deref(), Some("Backend error: Write failed"));
        assert_eq!(cart.total_quantity(), 2);

        *store.reject_pushes.lock().unwrap() = false;
        cart.increase_quantity(ItemId::new(1), "M", "Blue").unwrap();
        tokio::time::sleep(WINDOW * 2).await;
        assert!(cart.error().is_none());
        assert_eq!(store.pushes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_flushes_pending_write() {
        let store = Arc::new(FakeStore::default());
        let mut cart = signed_in(&store).await;
        cart.add_line(product(1, 10), "M", "Blue", 1).unwrap();
        drop(cart);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.pushes().len(), 1);
    }

    #[tokio::test]
    async fn test_login_replaces_local_lines() {
        let store = Arc::new(FakeStore::default());
        let remote = vec![CartLine {
            product: product(7, 4),
            quantity: 2,
            size: "L".to_string(),
            color: "Green".to_string(),
        }];
        *store.remote.lock().unwrap() = Some(remote.clone());

        let mut cart = CartManager::new(Arc::clone(&store) as Arc<dyn CartStore>, WINDOW);
        cart.add_line(product(1, 10), "M", "Blue", 1).unwrap();
        cart.login(identity()).await;

        assert_eq!(cart.lines(), remote.as_slice());
        assert!(!cart.is_loading());
        assert!(cart.error().is_none());
        assert_eq!(*store.tokens.lock().unwrap(), vec!["id-token".to_string()]);
    }

    #[tokio::test]
    async fn test_login_failure_empties_cart() {
        let store = Arc::new(FakeStore::default());
        let mut cart = CartManager::new(Arc::clone(&store) as Arc<dyn CartStore>, WINDOW);
        cart.add_line(product(1, 10), "M", "Blue", 1).unwrap();

        cart.login(identity()).await;

        assert!(cart.lines().is_empty());
        assert!(!cart.is_loading());
        assert_eq!(
            cart.error().as_deref(),
            Some("Failed to fetch cart: Cart not readable")
        );
        assert!(cart.identity().is_some());
    }
}

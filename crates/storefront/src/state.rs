//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::sync::Mutex;
use tracing::info;

use crate::assistant::{
    ChatAssistant, CompletionError, CompletionGateway, CompletionSettings, OpenAiClient,
    SharedChat,
};
use crate::cart::{CartManager, CartStore, CartStoreError, HttpCartStore};
use crate::catalog::{AdminCatalog, CatalogClient, CatalogError, CatalogStore};
use crate::config::StorefrontConfig;
use crate::models::ShopperId;
use crate::services::auth::{AuthError, IdentityClient};

/// Shopper sessions idle for this long are dropped, flushing any pending
/// cart write.
const SHOPPER_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const MAX_SHOPPERS: u64 = 10_000;

/// Error building the upstream clients.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("cart store client: {0}")]
    CartStore(#[from] CartStoreError),
    #[error("catalog client: {0}")]
    Catalog(#[from] CatalogError),
    #[error("completion client: {0}")]
    Completion(#[from] CompletionError),
    #[error("identity client: {0}")]
    Identity(#[from] AuthError),
}

/// Upstream services the storefront talks to.
#[derive(Clone)]
pub struct Backends {
    pub cart_store: Arc<dyn CartStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub completions: Arc<dyn CompletionGateway>,
    pub identity: IdentityClient,
}

impl Backends {
    /// Build the HTTP clients described by `config`.
    ///
    /// # Errors
    ///
    /// Returns error if any client fails to build.
    pub fn from_config(config: &StorefrontConfig) -> Result<Self, StateError> {
        let timeout = config.http_timeout;
        Ok(Self {
            cart_store: Arc::new(HttpCartStore::new(&config.cart, timeout)?),
            catalog: Arc::new(CatalogClient::new(&config.catalog, timeout)?),
            completions: Arc::new(OpenAiClient::new(&config.assistant, timeout)?),
            identity: IdentityClient::new(&config.identity, timeout)?,
        })
    }
}

/// One browser session's cart and assistant.
pub struct ShopperSession {
    pub cart: Mutex<CartManager>,
    pub chat: SharedChat,
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the upstream clients and per-shopper sessions.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    backends: Backends,
    admin: AdminCatalog,
    shoppers: Cache<ShopperId, Arc<ShopperSession>>,
}

impl AppState {
    /// Create application state with HTTP clients built from `config`.
    ///
    /// # Errors
    ///
    /// Returns error if any client fails to build.
    pub fn new(config: StorefrontConfig) -> Result<Self, StateError> {
        let backends = Backends::from_config(&config)?;
        Ok(Self::with_backends(config, backends))
    }

    /// Create application state over the given upstream services.
    #[must_use]
    pub fn with_backends(config: StorefrontConfig, backends: Backends) -> Self {
        let admin = AdminCatalog::new(Arc::clone(&backends.catalog));
        let shoppers = Cache::builder()
            .max_capacity(MAX_SHOPPERS)
            .time_to_idle(SHOPPER_IDLE_TIMEOUT)
            .build();

        Self {
            inner: Arc::new(AppStateInner {
                config,
                backends,
                admin,
                shoppers,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Catalog store used by the product and admin routes.
    #[must_use]
    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.inner.backends.catalog
    }

    #[must_use]
    pub fn admin(&self) -> &AdminCatalog {
        &self.inner.admin
    }

    #[must_use]
    pub fn identity(&self) -> &IdentityClient {
        &self.inner.backends.identity
    }

    /// End every shopper session, as if each had gone idle.
    ///
    /// Each cart flushes its pending write as it is dropped. Signed-in
    /// users are signed out on their next request.
    pub async fn expire_shoppers(&self) {
        self.inner.shoppers.invalidate_all();
        self.inner.shoppers.run_pending_tasks().await;
        info!("Shopper sessions expired");
    }

    /// Get or create the session for `id`.
    ///
    /// A new session starts with an empty guest cart and a collapsed
    /// assistant whose catalog snapshot is loaded before it is returned.
    pub async fn shopper(&self, id: ShopperId) -> Arc<ShopperSession> {
        let backends = &self.inner.backends;
        let config = &self.inner.config;

        self.inner
            .shoppers
            .get_with(id, async {
                let cart = CartManager::new(Arc::clone(&backends.cart_store), config.cart.debounce);

                let mut chat = ChatAssistant::new(
                    Arc::clone(&backends.completions),
                    CompletionSettings {
                        model: config.assistant.model.clone(),
                        max_tokens: config.assistant.max_tokens,
                    },
                );
                chat.load_products(backends.catalog.as_ref()).await;

                info!(shopper_id = %id, "Shopper session created");
                Arc::new(ShopperSession {
                    cart: Mutex::new(cart),
                    chat: Arc::new(Mutex::new(chat)),
                })
            })
            .await
    }
}

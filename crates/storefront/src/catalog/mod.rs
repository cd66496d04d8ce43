//! Product catalog store client.
//!
//! The catalog lives in a Baserow-style table exposed over REST with
//! `Authorization: Token ...`. Reads are cached for a minute; any write
//! through this client invalidates the cache so admin edits show up on the
//! next read.

pub mod admin;

pub use admin::{AdminAction, AdminCatalog, AdminError, added_message, updated_message};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use ltrq_core::{ItemId, Product, ProductPatch, RowId};

use crate::config::CatalogConfig;

const CACHE_KEY_ALL: &str = "products:all";
const CACHE_TTL: Duration = Duration::from_secs(60);

/// Errors from the catalog store.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed.
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("catalog store error ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// No row with this id.
    #[error("Product not found")]
    ProductNotFound(RowId),

    /// Failed to parse the store's response.
    #[error("failed to parse catalog response: {0}")]
    Parse(String),
}

pub type CatalogFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CatalogError>> + Send + 'a>>;

/// Read and write access to the product table.
pub trait CatalogStore: Send + Sync {
    /// Every product record.
    fn fetch_all(&self) -> CatalogFuture<'_, Vec<Product>>;

    /// Create a row; returns it with its assigned row id.
    fn add_product<'a>(&'a self, product: &'a Product) -> CatalogFuture<'a, Product>;

    /// Apply a partial record to an existing row.
    fn update_product<'a>(&'a self, id: RowId, patch: &'a ProductPatch)
    -> CatalogFuture<'a, Product>;
}

/// Look up the first record with the given `itemID`.
///
/// # Errors
///
/// Returns error if the catalog cannot be read.
pub async fn find_by_item_id(
    store: &dyn CatalogStore,
    item_id: ItemId,
) -> Result<Option<Product>, CatalogError> {
    Ok(store
        .fetch_all()
        .await?
        .into_iter()
        .find(|product| product.item_id == item_id))
}

#[derive(Deserialize)]
struct RowsResponse {
    #[serde(default)]
    results: Option<Vec<Product>>,
}

// =============================================================================
// CatalogClient
// =============================================================================

/// HTTP client for the product table.
#[derive(Clone)]
pub struct CatalogClient {
    inner: Arc<CatalogClientInner>,
}

struct CatalogClientInner {
    client: reqwest::Client,
    rows_url: String,
    api_token: SecretString,
    cache: Cache<String, Arc<Vec<Product>>>,
}

impl CatalogClient {
    /// Create a new catalog client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &CatalogConfig, timeout: Duration) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        let cache = Cache::builder()
            .max_capacity(16)
            .time_to_live(CACHE_TTL)
            .build();

        let mut rows_url = config.rows_url.clone();
        rows_url.set_query(None);
        let mut rows_url = rows_url.to_string();
        if !rows_url.ends_with('/') {
            rows_url.push('/');
        }

        Ok(Self {
            inner: Arc::new(CatalogClientInner {
                client,
                rows_url,
                api_token: config.api_token.clone(),
                cache,
            }),
        })
    }

    /// Drop cached reads.
    pub async fn invalidate(&self) {
        self.inner.cache.invalidate(CACHE_KEY_ALL).await;
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.inner.api_token.expose_secret())
    }

    #[instrument(skip(self))]
    async fn load_all(&self) -> Result<Vec<Product>, CatalogError> {
        if let Some(cached) = self.inner.cache.get(CACHE_KEY_ALL).await {
            debug!(products = cached.len(), "Catalog cache hit");
            return Ok(cached.as_ref().clone());
        }

        let response = self
            .inner
            .client
            .get(format!("{}?user_field_names=true", self.inner.rows_url))
            .header("Authorization", self.authorization())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(rejection(status, response).await);
        }

        let body: RowsResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;
        let products = body.results.unwrap_or_default();

        debug!(products = products.len(), "Fetched catalog");
        self.inner
            .cache
            .insert(CACHE_KEY_ALL.to_string(), Arc::new(products.clone()))
            .await;

        Ok(products)
    }

    #[instrument(skip_all, fields(item_id = %product.item_id))]
    async fn create(&self, product: &Product) -> Result<Product, CatalogError> {
        let response = self
            .inner
            .client
            .post(format!("{}?user_field_names=true", self.inner.rows_url))
            .header("Authorization", self.authorization())
            .json(product)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(rejection(status, response).await);
        }

        let created: Product = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;

        self.invalidate().await;
        Ok(created)
    }

    #[instrument(skip(self, patch))]
    async fn patch(&self, id: RowId, patch: &ProductPatch) -> Result<Product, CatalogError> {
        let response = self
            .inner
            .client
            .patch(format!("{}{id}/?user_field_names=true", self.inner.rows_url))
            .header("Authorization", self.authorization())
            .json(patch)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::ProductNotFound(id));
        }
        if !status.is_success() {
            return Err(rejection(status, response).await);
        }

        let updated: Product = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;

        self.invalidate().await;
        Ok(updated)
    }
}

impl CatalogStore for CatalogClient {
    fn fetch_all(&self) -> CatalogFuture<'_, Vec<Product>> {
        Box::pin(self.load_all())
    }

    fn add_product<'a>(&'a self, product: &'a Product) -> CatalogFuture<'a, Product> {
        Box::pin(self.create(product))
    }

    fn update_product<'a>(
        &'a self,
        id: RowId,
        patch: &'a ProductPatch,
    ) -> CatalogFuture<'a, Product> {
        Box::pin(self.patch(id, patch))
    }
}

async fn rejection(status: reqwest::StatusCode, response: reqwest::Response) -> CatalogError {
    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("unreadable body: {e}"));
    CatalogError::Rejected {
        status: status.as_u16(),
        message,
    }
}

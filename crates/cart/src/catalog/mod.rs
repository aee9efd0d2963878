//! Catalog service access.
//!
//! # Architecture
//!
//! - [`Catalog`] is the seam the reconciler depends on: one async lookup per
//!   product ID, which may fail
//! - [`HttpCatalog`] talks to the catalog REST API with `reqwest`
//! - In-memory caching via `moka` for product details (configurable TTL)
//! - No retries; a failed lookup is reported to the caller as-is

mod http;

pub use http::HttpCatalog;

use std::sync::Arc;

use async_trait::async_trait;
use cart_sync_core::{ProductDetails, ProductId};
use thiserror::Error;

/// Errors that can occur when looking up a product.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Catalog answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Product does not exist.
    #[error("Not found: {0}")]
    NotFound(ProductId),

    /// Rate limited by the catalog.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Catalog returned a different product than the one requested.
    #[error("Requested product {requested} but catalog returned {returned}")]
    Mismatch {
        requested: ProductId,
        returned: ProductId,
    },

    /// The configured base URL cannot take path segments.
    #[error("Invalid catalog URL: {0}")]
    InvalidUrl(String),
}

/// Source of product details.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetch a single product by ID.
    async fn fetch_product(&self, id: &ProductId) -> Result<ProductDetails, CatalogError>;
}

#[async_trait]
impl<T: Catalog + ?Sized> Catalog for Arc<T> {
    async fn fetch_product(&self, id: &ProductId) -> Result<ProductDetails, CatalogError> {
        (**self).fetch_product(id).await
    }
}

//! Catalog REST client.
//!
//! Fetches `GET {base_url}/product/{id}` with `reqwest`, attaching the bearer
//! token when one is configured. Product details are cached with `moka`.

use std::sync::Arc;

use async_trait::async_trait;
use cart_sync_core::{ProductDetails, ProductId};
use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};
use url::Url;

use super::{Catalog, CatalogError};
use crate::config::CatalogConfig;

/// Upper bound on cached products.
const CACHE_CAPACITY: u64 = 1000;

/// Client for the catalog REST API.
///
/// Cheap to clone; clones share the connection pool and cache.
#[derive(Clone)]
pub struct HttpCatalog {
    inner: Arc<HttpCatalogInner>,
}

struct HttpCatalogInner {
    client: reqwest::Client,
    base_url: Url,
    api_token: Option<SecretString>,
    cache: Option<Cache<ProductId, ProductDetails>>,
}

impl HttpCatalog {
    /// Create a new catalog client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the base URL
    /// cannot take path segments.
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        if config.base_url.cannot_be_a_base() {
            return Err(CatalogError::InvalidUrl(config.base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        let cache = (!config.cache_ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(config.cache_ttl)
                .build()
        });

        Ok(Self {
            inner: Arc::new(HttpCatalogInner {
                client,
                base_url: config.base_url.clone(),
                api_token: config.api_token.clone(),
                cache,
            }),
        })
    }

    /// URL of a single product resource.
    fn product_url(&self, id: &ProductId) -> Result<Url, CatalogError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| CatalogError::InvalidUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .push("product")
            .push(id.as_str());
        Ok(url)
    }

    /// Drop a cached product, forcing the next lookup to hit the API.
    pub async fn invalidate(&self, id: &ProductId) {
        if let Some(cache) = &self.inner.cache {
            cache.invalidate(id).await;
        }
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    #[instrument(skip(self), fields(product_id = %id))]
    async fn fetch_product(&self, id: &ProductId) -> Result<ProductDetails, CatalogError> {
        if let Some(cache) = &self.inner.cache
            && let Some(product) = cache.get(id).await
        {
            debug!("Cache hit for product");
            return Ok(product);
        }

        let url = self.product_url(id)?;

        let mut request = self
            .inner
            .client
            .get(url)
            .header("Accept", "application/json");
        if let Some(token) = &self.inner.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(CatalogError::RateLimited(retry_after));
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(id.clone()));
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "Catalog API returned non-success status"
            );
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body: response_text.chars().take(200).collect(),
            });
        }

        let product: ProductDetails = serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %response_text.chars().take(500).collect::<String>(),
                "Failed to parse catalog product response"
            );
            CatalogError::Parse(e)
        })?;

        if product.id != *id {
            return Err(CatalogError::Mismatch {
                requested: id.clone(),
                returned: product.id,
            });
        }

        if let Some(cache) = &self.inner.cache {
            cache.insert(id.clone(), product.clone()).await;
        }

        Ok(product)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config(base: &str) -> CatalogConfig {
        CatalogConfig {
            base_url: Url::parse(base).unwrap(),
            api_token: None,
            cache_ttl: Duration::from_secs(300),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_product_url_appends_segments() {
        let catalog = HttpCatalog::new(&config("http://localhost:3000/api")).unwrap();
        let url = catalog
            .product_url(&ProductId::parse("p1").unwrap())
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/product/p1");
    }

    #[test]
    fn test_product_url_handles_trailing_slash() {
        let catalog = HttpCatalog::new(&config("http://localhost:3000/api/")).unwrap();
        let url = catalog
            .product_url(&ProductId::parse("p1").unwrap())
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/product/p1");
    }

    #[test]
    fn test_product_url_escapes_id() {
        let catalog = HttpCatalog::new(&config("http://localhost:3000/api")).unwrap();
        let url = catalog
            .product_url(&ProductId::parse("a/b?c").unwrap())
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/product/a%2Fb%3Fc");
    }

    #[test]
    fn test_rejects_non_base_url() {
        let result = HttpCatalog::new(&config("mailto:catalog@example.com"));
        assert!(matches!(result, Err(CatalogError::InvalidUrl(_))));
    }
}

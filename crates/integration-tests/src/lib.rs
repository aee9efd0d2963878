//! Integration tests for Cart Sync.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cart-sync-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_scenarios` - Reconciler behavior against an in-process catalog
//! - `http_catalog` - The REST catalog client against a local axum server
//!
//! Shared fixtures live here so each test file stays focused on behavior.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cart_sync::{
    CartReconciler, Catalog, CatalogError, MemoryCookieStorage, PersistedReferenceStore,
};
use cart_sync_core::{Price, ProductDetails, ProductId};
use rust_decimal::Decimal;
use tokio::sync::Semaphore;

/// Parse a product ID, panicking on invalid input.
pub fn id(s: &str) -> ProductId {
    ProductId::parse(s).unwrap()
}

/// Build catalog details for `s` priced at `cents / 100`.
pub fn product(s: &str, cents: i64) -> ProductDetails {
    ProductDetails {
        id: id(s),
        name: format!("Product {s}"),
        price: Price::new(Decimal::new(cents, 2)).unwrap(),
        description: format!("Description of {s}"),
        thumbnail: format!("/images/{s}.webp"),
    }
}

/// In-process catalog that records every lookup.
///
/// Unknown IDs fail with [`CatalogError::NotFound`]; IDs registered with
/// [`failing`](Self::failing) fail with a 500. Lookups of held IDs block
/// until [`release`](Self::release) is called.
#[derive(Default)]
pub struct RecordingCatalog {
    products: HashMap<ProductId, ProductDetails>,
    failing: Vec<ProductId>,
    held: HashMap<ProductId, Arc<Semaphore>>,
    calls: Mutex<Vec<ProductId>>,
}

impl RecordingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product priced at 10.00.
    #[must_use]
    pub fn with(mut self, s: &str) -> Self {
        self.products.insert(id(s), product(s, 1000));
        self
    }

    /// Make lookups of `s` fail with a server error.
    #[must_use]
    pub fn failing(mut self, s: &str) -> Self {
        self.failing.push(id(s));
        self
    }

    /// Block lookups of `s` until released.
    #[must_use]
    pub fn holding(mut self, s: &str) -> Self {
        self.held.insert(id(s), Arc::new(Semaphore::new(0)));
        self
    }

    /// Let every blocked lookup of `s` complete.
    pub fn release(&self, s: &str) {
        if let Some(gate) = self.held.get(&id(s)) {
            gate.add_permits(Semaphore::MAX_PERMITS);
        }
    }

    /// Every lookup so far, in call order.
    pub fn calls(&self) -> Vec<ProductId> {
        self.calls.lock().unwrap().clone()
    }

    /// How many times `s` was looked up.
    pub fn fetches(&self, s: &str) -> usize {
        let target = id(s);
        self.calls.lock().unwrap().iter().filter(|c| **c == target).count()
    }
}

#[async_trait]
impl Catalog for RecordingCatalog {
    async fn fetch_product(&self, pid: &ProductId) -> Result<ProductDetails, CatalogError> {
        self.calls.lock().unwrap().push(pid.clone());

        if let Some(gate) = self.held.get(pid) {
            let _permit = gate.acquire().await.unwrap();
        }
        if self.failing.contains(pid) {
            return Err(CatalogError::Status {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        self.products
            .get(pid)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(pid.clone()))
    }
}

/// Cart over `catalog` with an in-memory cookie holding `raw`, if any.
pub fn cart_with_cookie(
    catalog: RecordingCatalog,
    raw: Option<&str>,
) -> CartReconciler<RecordingCatalog, MemoryCookieStorage> {
    let storage = raw.map_or_else(MemoryCookieStorage::new, MemoryCookieStorage::with_value);
    CartReconciler::new(catalog, PersistedReferenceStore::new(storage))
}

/// Cart over `catalog` with an empty cookie.
pub fn cart(catalog: RecordingCatalog) -> CartReconciler<RecordingCatalog, MemoryCookieStorage> {
    cart_with_cookie(catalog, None)
}

//! Cart Sync - cookie-backed cart reconciliation.
//!
//! Keeps a shopping cart as an ordered list of product IDs in a single cookie
//! value and hydrates it into product details and quantities from the catalog.
//!
//! # Architecture
//!
//! - [`persisted`] - Encodes the reference list to a cookie value and back
//!   (fail-soft on corrupt values)
//! - [`catalog`] - The product lookup seam and its REST implementation
//! - [`reconciler`] - Mutations, persistence, and generation-ordered
//!   reconciliation into [`CartState`](cart_sync_core::CartState)
//! - [`config`] - Environment configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use cart_sync::{CartConfig, CartReconciler, FileCookieStorage, HttpCatalog, PersistedReferenceStore};
//!
//! let config = CartConfig::from_env()?;
//! let catalog = HttpCatalog::new(&config.catalog)?;
//! let store = PersistedReferenceStore::new(FileCookieStorage::new(&config.cookie_file))
//!     .with_format(config.cookie_format);
//!
//! let cart = CartReconciler::open(catalog, store).await;
//! cart.add(ProductId::parse("p1")?).await;
//! println!("{} items", cart.state().item_count());
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod config;
pub mod error;
pub mod persisted;
pub mod reconciler;

pub use catalog::{Catalog, CatalogError, HttpCatalog};
pub use config::{CartConfig, CatalogConfig, ConfigError};
pub use error::{Error, Result};
pub use persisted::{
    CookieOptions, CookieStorage, FileCookieStorage, MemoryCookieStorage, PersistedFormat,
    PersistedReferenceStore, PersistedStateCorrupt, StorageError,
};
pub use reconciler::{CartReconciler, Direction, Reconciliation};

//! Core types for cart-sync.
//!
//! Type-safe wrappers for catalog products and the cart derived from them.

pub mod cart;
pub mod id;
pub mod price;
pub mod product;
pub mod reference;

pub use cart::{CartEntry, CartState, FailedLookup, ReconcileFailure};
pub use id::{ProductId, ProductIdError};
pub use price::{Price, PriceError};
pub use product::ProductDetails;
pub use reference::ReferenceList;

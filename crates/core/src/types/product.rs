//! Product details as served by the catalog.

use serde::{Deserialize, Serialize};

use super::{Price, ProductId};

/// A catalog product.
///
/// Owned by the catalog service; the cart treats it as read-only. The wire
/// field for the description is `explanation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    #[serde(rename = "explanation", alias = "description", default)]
    pub description: String,
    /// Path of the thumbnail image, relative to the catalog's asset root.
    #[serde(default)]
    pub thumbnail: String,
}

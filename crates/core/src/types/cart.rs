//! Hydrated cart state derived from a [`ReferenceList`](super::ReferenceList).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Price, ProductDetails, ProductId};

/// A product in the cart together with its quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEntry {
    #[serde(flatten)]
    pub product: ProductDetails,
    /// Always at least 1; a product with zero references has no entry.
    pub count: u32,
}

impl CartEntry {
    /// Unit price multiplied by quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.count)
    }
}

/// A product lookup that failed during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedLookup {
    pub id: ProductId,
    pub reason: String,
}

/// Non-fatal summary of the lookups a reconciliation pass had to drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileFailure {
    pub failed: Vec<FailedLookup>,
}

impl fmt::Display for ReconcileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to load {} product(s)", self.failed.len())?;
        for (i, lookup) in self.failed.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{} ({})", lookup.id, lookup.reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for ReconcileFailure {}

/// Cart contents as last reconciled against the catalog.
///
/// Replaced wholesale on every reconciliation; never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartState {
    pub entries: BTreeMap<ProductId, CartEntry>,
    pub loading: bool,
    pub error: Option<ReconcileFailure>,
}

impl CartState {
    /// An empty, settled cart.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&CartEntry> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total quantity across all entries.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.entries.values().map(|e| u64::from(e.count)).sum()
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.entries.values().map(CartEntry::line_total).sum()
    }
}

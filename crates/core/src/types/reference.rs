//! The ordered list of product references that backs a cart.
//!
//! Quantity is encoded by repetition: an ID that appears three times is a line
//! item with a count of three. Order is kept stable so the persisted encoding
//! round-trips exactly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ProductId;

/// Ordered product references, with repetition representing quantity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceList(Vec<ProductId>);

impl ReferenceList {
    /// Create an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of references, counting repeats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProductId> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[ProductId] {
        &self.0
    }

    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.0.contains(id)
    }

    /// Number of times `id` appears.
    #[must_use]
    pub fn occurrences(&self, id: &ProductId) -> usize {
        self.0.iter().filter(|r| *r == id).count()
    }

    /// Append one occurrence of `id`.
    pub fn push(&mut self, id: ProductId) {
        self.0.push(id);
    }

    /// Remove the first occurrence of `id`.
    ///
    /// Returns `false` (and leaves the list untouched) if `id` is absent.
    pub fn remove_first(&mut self, id: &ProductId) -> bool {
        match self.0.iter().position(|r| r == id) {
            Some(index) => {
                self.0.remove(index);
                true
            }
            None => false,
        }
    }

    /// Unique IDs paired with their multiplicity, in order of first appearance.
    #[must_use]
    pub fn multiplicities(&self) -> Vec<(ProductId, u32)> {
        let mut index: HashMap<&ProductId, usize> = HashMap::new();
        let mut counts: Vec<(ProductId, u32)> = Vec::new();

        for id in &self.0 {
            if let Some(&slot) = index.get(id) {
                if let Some((_, count)) = counts.get_mut(slot) {
                    *count = count.saturating_add(1);
                }
            } else {
                index.insert(id, counts.len());
                counts.push((id.clone(), 1));
            }
        }

        counts
    }

    /// Expand `(id, count)` pairs back into a list, grouping repeats.
    #[must_use]
    pub fn from_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (ProductId, u32)>,
    {
        let mut ids = Vec::new();
        for (id, count) in counts {
            for _ in 0..count {
                ids.push(id.clone());
            }
        }
        Self(ids)
    }
}

impl From<Vec<ProductId>> for ReferenceList {
    fn from(ids: Vec<ProductId>) -> Self {
        Self(ids)
    }
}

impl FromIterator<ProductId> for ReferenceList {
    fn from_iter<T: IntoIterator<Item = ProductId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ReferenceList {
    type Item = &'a ProductId;
    type IntoIter = std::slice::Iter<'a, ProductId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

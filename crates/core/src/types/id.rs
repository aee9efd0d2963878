//! Catalog product identifier.
//!
//! Product IDs are opaque strings issued by the catalog service. The cart only
//! checks that an ID is syntactically usable as a cookie payload and as a URL
//! path segment; it never interprets the contents.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`ProductId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProductIdError {
    /// The input string is empty.
    #[error("product id cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("product id must be at most {max} bytes")]
    TooLong {
        /// Maximum allowed length in bytes.
        max: usize,
    },
    /// The input contains whitespace or a control character.
    #[error("product id contains invalid character {ch:?}")]
    InvalidCharacter {
        /// The offending character.
        ch: char,
    },
}

/// A catalog product identifier.
///
/// ## Constraints
///
/// - Length: 1-128 bytes
/// - No whitespace
/// - No control characters
///
/// ## Examples
///
/// ```
/// use cart_sync_core::ProductId;
///
/// assert!(ProductId::parse("66f1c0de8a1b2c3d4e5f6789").is_ok());
/// assert!(ProductId::parse("p1").is_ok());
///
/// assert!(ProductId::parse("").is_err());
/// assert!(ProductId::parse("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    /// Maximum length of a product ID in bytes.
    pub const MAX_LENGTH: usize = 128;

    /// Parse a `ProductId` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, longer than
    /// [`ProductId::MAX_LENGTH`] bytes, or contains whitespace or control
    /// characters.
    pub fn parse(s: &str) -> Result<Self, ProductIdError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    fn validate(s: &str) -> Result<(), ProductIdError> {
        if s.is_empty() {
            return Err(ProductIdError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(ProductIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if let Some(ch) = s.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(ProductIdError::InvalidCharacter { ch });
        }

        Ok(())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `ProductId` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ProductId {
    type Err = ProductIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProductId {
    type Error = ProductIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(&value)?;
        Ok(Self(value))
    }
}

impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

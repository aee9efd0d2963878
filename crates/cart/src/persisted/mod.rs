//! Persisted reference store.
//!
//! Encodes the cart's [`ReferenceList`] into a single percent-encoded JSON
//! cookie value and decodes it back. Decoding is fail-soft: a value that cannot
//! be decoded is logged and treated as an empty cart, so a corrupted cookie
//! never takes the cart down with it.
//!
//! # Wire formats
//!
//! - Id list (default): `["p1","p1","p2"]`. Repetition is quantity.
//! - Counted: `[["p1",2],["p2",1]]`. Smaller for carts with repeats.
//!
//! Both formats are always accepted on decode, so switching the write format
//! migrates existing cookies on their next write.
//!
//! # Size
//!
//! Browsers cap a cookie at roughly [`COOKIE_SIZE_LIMIT`] bytes. The store does
//! not enforce this, but logs a warning when an encoded value exceeds it.

mod storage;

pub use storage::{
    CookieOptions, CookieStorage, FileCookieStorage, MemoryCookieStorage, StorageError,
};

use std::str::FromStr;

use cart_sync_core::{ProductId, ReferenceList};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Cookie name the cart is stored under.
pub const COOKIE_KEY: &str = "cart";

/// Practical upper bound on a browser cookie value, in bytes.
pub const COOKIE_SIZE_LIMIT: usize = 4096;

/// Most references a decoded cookie may expand to.
///
/// An id-list cookie within [`COOKIE_SIZE_LIMIT`] holds at most about a third
/// as many references, so anything larger did not come from this store.
pub const MAX_PERSISTED_REFERENCES: usize = COOKIE_SIZE_LIMIT;

/// Reasons a persisted value could not be decoded.
///
/// Never returned from [`decode`]; exposed through [`try_decode`] for callers
/// that want the diagnostic.
#[derive(Debug, Error)]
pub enum PersistedStateCorrupt {
    /// Percent-decoding produced invalid UTF-8.
    #[error("invalid percent-encoding: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    /// The decoded text is not a recognized cart payload.
    #[error("invalid cart payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// A counted entry had a quantity of zero.
    #[error("zero quantity recorded for product {0}")]
    ZeroCount(ProductId),

    /// Counted entries add up to more references than a cookie can hold.
    #[error("counted entries exceed {limit} references")]
    TooManyReferences { limit: usize },
}

/// Encoding used when writing the cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistedFormat {
    /// One array element per unit of quantity.
    #[default]
    IdList,
    /// One `[id, count]` pair per product, in order of first appearance.
    Counted,
}

/// Error parsing a [`PersistedFormat`] name.
#[derive(Debug, Error)]
#[error("unknown cookie format {0:?}, expected \"ids\" or \"counted\"")]
pub struct UnknownFormat(String);

impl FromStr for PersistedFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ids" | "id_list" | "list" => Ok(Self::IdList),
            "counted" | "counts" => Ok(Self::Counted),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Ids(Vec<ProductId>),
    Counted(Vec<(ProductId, u32)>),
}

/// Decode a raw cookie value, returning the diagnostic on failure.
///
/// # Errors
///
/// Returns [`PersistedStateCorrupt`] if the value is not valid percent-encoded
/// UTF-8, is not a JSON array in either wire format, contains an invalid
/// product ID, records a zero quantity, or counts more than
/// [`MAX_PERSISTED_REFERENCES`] references.
pub fn try_decode(raw: &str) -> Result<ReferenceList, PersistedStateCorrupt> {
    let decoded = urlencoding::decode(raw)?;

    match serde_json::from_str::<Payload>(&decoded)? {
        Payload::Ids(ids) => Ok(ReferenceList::from(ids)),
        Payload::Counted(pairs) => {
            if let Some((id, _)) = pairs.iter().find(|(_, count)| *count == 0) {
                return Err(PersistedStateCorrupt::ZeroCount(id.clone()));
            }

            let total = pairs.iter().try_fold(0usize, |total, (_, count)| {
                usize::try_from(*count)
                    .ok()
                    .and_then(|count| total.checked_add(count))
            });
            if !total.is_some_and(|total| total <= MAX_PERSISTED_REFERENCES) {
                return Err(PersistedStateCorrupt::TooManyReferences {
                    limit: MAX_PERSISTED_REFERENCES,
                });
            }

            Ok(ReferenceList::from_counts(pairs))
        }
    }
}

/// Decode a raw cookie value.
///
/// An absent value is an empty cart. A corrupt value is logged and also
/// treated as an empty cart.
#[must_use]
pub fn decode(raw: Option<&str>) -> ReferenceList {
    let Some(raw) = raw else {
        return ReferenceList::new();
    };

    match try_decode(raw) {
        Ok(list) => list,
        Err(e) => {
            warn!(
                error = %e,
                raw = %raw.chars().take(200).collect::<String>(),
                "Persisted cart state is corrupt; starting with an empty cart"
            );
            ReferenceList::new()
        }
    }
}

/// Encode a list in the default id-list format.
///
/// `decode(Some(&encode(list)))` always returns `list` unchanged.
#[must_use]
pub fn encode(list: &ReferenceList) -> String {
    encode_as(list, PersistedFormat::IdList)
}

/// Encode a list in the given format.
#[must_use]
pub fn encode_as(list: &ReferenceList, format: PersistedFormat) -> String {
    let json = match format {
        PersistedFormat::IdList => serde_json::to_string(list.as_slice()),
        PersistedFormat::Counted => serde_json::to_string(&list.multiplicities()),
    };

    // Serializing strings and integers cannot fail.
    let json = json.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to serialize cart references");
        String::from("[]")
    });

    urlencoding::encode(&json).into_owned()
}

/// Reads and writes the cart's reference list through a [`CookieStorage`].
#[derive(Debug)]
pub struct PersistedReferenceStore<S> {
    storage: S,
    format: PersistedFormat,
    options: CookieOptions,
}

impl<S: CookieStorage> PersistedReferenceStore<S> {
    /// Create a store writing the default id-list format.
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            format: PersistedFormat::default(),
            options: CookieOptions::default(),
        }
    }

    /// Set the format used for writes.
    #[must_use]
    pub fn with_format(mut self, format: PersistedFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the cookie attributes used for writes.
    #[must_use]
    pub fn with_options(mut self, options: CookieOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub const fn format(&self) -> PersistedFormat {
        self.format
    }

    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Read and decode the current list. Never fails.
    pub fn load(&self) -> ReferenceList {
        decode(self.storage.read().as_deref())
    }

    /// Encode and write `list`.
    ///
    /// A failed write is logged; the caller's in-memory list stays
    /// authoritative.
    pub fn save(&self, list: &ReferenceList) {
        let raw = encode_as(list, self.format);

        if raw.len() > COOKIE_SIZE_LIMIT {
            warn!(
                bytes = raw.len(),
                limit = COOKIE_SIZE_LIMIT,
                references = list.len(),
                "Encoded cart exceeds typical cookie size limit"
            );
        }
        if list.len() > MAX_PERSISTED_REFERENCES {
            warn!(
                references = list.len(),
                limit = MAX_PERSISTED_REFERENCES,
                "Cart holds more references than can be read back"
            );
        }

        match self.storage.write(&raw, &self.options) {
            Ok(()) => debug!(bytes = raw.len(), references = list.len(), "Cart persisted"),
            Err(e) => warn!(error = %e, "Failed to persist cart; keeping in-memory state"),
        }
    }
}

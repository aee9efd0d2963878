//! Raw cookie storage backends.
//!
//! A backend stores one opaque string. Size limits and expiry belong to the
//! backend; the reference store never enforces them.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

/// Errors a storage backend can report on write.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Attributes written alongside the cookie value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub name: String,
    /// Cookie path; the cart cookie is always site-wide.
    pub path: String,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: super::COOKIE_KEY.to_string(),
            path: "/".to_string(),
        }
    }
}

/// A single-value cookie store.
pub trait CookieStorage: Send + Sync {
    /// Read the current raw value, if any.
    fn read(&self) -> Option<String>;

    /// Replace the stored value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not persist the value.
    fn write(&self, value: &str, options: &CookieOptions) -> Result<(), StorageError>;
}

impl<T: CookieStorage + ?Sized> CookieStorage for Arc<T> {
    fn read(&self) -> Option<String> {
        (**self).read()
    }

    fn write(&self, value: &str, options: &CookieOptions) -> Result<(), StorageError> {
        (**self).write(value, options)
    }
}

// =============================================================================
// In-memory backend
// =============================================================================

/// In-memory cookie jar.
///
/// Counts writes so callers can assert on persistence behavior.
#[derive(Debug, Default)]
pub struct MemoryCookieStorage {
    value: Mutex<Option<String>>,
    last_options: Mutex<Option<CookieOptions>>,
    writes: AtomicUsize,
}

impl MemoryCookieStorage {
    /// Create an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a jar that already holds `raw`.
    #[must_use]
    pub fn with_value(raw: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(raw.into())),
            ..Self::default()
        }
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Options passed to the most recent write.
    #[must_use]
    pub fn last_options(&self) -> Option<CookieOptions> {
        self.last_options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Overwrite the value without counting a write, as another tab would.
    pub fn set_external(&self, raw: Option<String>) {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = raw;
    }
}

impl CookieStorage for MemoryCookieStorage {
    fn read(&self) -> Option<String> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write(&self, value: &str, options: &CookieOptions) -> Result<(), StorageError> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value.to_string());
        *self
            .last_options
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(options.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// File backend
// =============================================================================

/// Cookie jar backed by a single file holding the raw value.
///
/// A missing file reads as an absent cookie. The file holds only the value;
/// cookie attributes have no file equivalent and are not written.
#[derive(Debug, Clone)]
pub struct FileCookieStorage {
    path: PathBuf,
}

impl FileCookieStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CookieStorage for FileCookieStorage {
    fn read(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Some(contents.trim_end_matches(['\r', '\n']).to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read cart cookie file"
                );
                None
            }
        }
    }

    fn write(&self, value: &str, _options: &CookieOptions) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        std::fs::write(&self.path, value).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

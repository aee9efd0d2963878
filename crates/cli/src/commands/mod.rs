//! CLI command implementations.

mod cart;

pub use cart::{add, clear, decrease, ids, increase, open_cart, show};

use cart_sync_core::ProductIdError;
use thiserror::Error;

/// Errors that can end a CLI command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration or client setup failed.
    #[error(transparent)]
    Setup(#[from] cart_sync::Error),

    /// The product ID argument is not a valid identifier.
    #[error("Invalid product id: {0}")]
    InvalidProductId(#[from] ProductIdError),
}

//! Cart commands.
//!
//! Every command opens the cart from the cookie file, applies its change,
//! and prints the reconciled result.

use std::fmt::Write as _;

use cart_sync::{
    CartConfig, CartReconciler, FileCookieStorage, HttpCatalog, PersistedReferenceStore,
    Reconciliation,
};
use cart_sync_core::{CartState, ProductId};

use super::CliError;

type Cart = CartReconciler<HttpCatalog, FileCookieStorage>;

/// Build a cart over the configured cookie file and catalog.
///
/// Does not reconcile; each command decides whether it needs the catalog.
pub fn open_cart(config: &CartConfig) -> Result<Cart, CliError> {
    let catalog = HttpCatalog::new(&config.catalog).map_err(cart_sync::Error::from)?;
    let store = PersistedReferenceStore::new(FileCookieStorage::new(&config.cookie_file))
        .with_format(config.cookie_format);

    tracing::debug!(cookie_file = %config.cookie_file.display(), "Opened cart");
    Ok(CartReconciler::new(catalog, store))
}

/// Reconcile and print the cart.
pub async fn show(cart: &Cart) {
    cart.refresh().await;
    print_state(&cart.state());
}

/// Add one unit of `id`.
pub async fn add(cart: &Cart, id: &str) -> Result<(), CliError> {
    let id = ProductId::parse(id)?;
    cart.add(id).await;
    print_state(&cart.state());
    Ok(())
}

/// Add one unit of a product already in the cart.
pub async fn increase(cart: &Cart, id: &str) -> Result<(), CliError> {
    let id = ProductId::parse(id)?;
    report(cart, &id, cart.increment(&id).await).await;
    Ok(())
}

/// Remove one unit of a product already in the cart.
pub async fn decrease(cart: &Cart, id: &str) -> Result<(), CliError> {
    let id = ProductId::parse(id)?;
    report(cart, &id, cart.decrement(&id).await).await;
    Ok(())
}

/// Print the stored reference list, one ID per line.
#[allow(clippy::print_stdout)]
pub fn ids(cart: &Cart) {
    for id in &cart.references() {
        println!("{id}");
    }
}

/// Empty the cart.
pub async fn clear(cart: &Cart) {
    cart.clear().await;
    print_state(&cart.state());
}

async fn report(cart: &Cart, id: &ProductId, outcome: Reconciliation) {
    if outcome == Reconciliation::Unchanged {
        tracing::warn!(product_id = %id, "Product is not in the cart; nothing changed");
        // Still show the current contents
        cart.refresh().await;
    }
    print_state(&cart.state());
}

#[allow(clippy::print_stdout)]
fn print_state(state: &CartState) {
    print!("{}", render(state));
}

/// Render the cart as a plain-text table.
fn render(state: &CartState) -> String {
    let mut out = String::new();

    if state.is_empty() {
        out.push_str("Cart is empty\n");
    } else {
        for entry in state.entries.values() {
            let _ = writeln!(
                out,
                "{:>3} x {} ({}) @ {} = {}",
                entry.count,
                entry.product.name,
                entry.product.id,
                entry.product.price,
                entry.line_total()
            );
        }
        let _ = writeln!(
            out,
            "{} item(s), subtotal {}",
            state.item_count(),
            state.subtotal()
        );
    }

    if let Some(error) = &state.error {
        let _ = writeln!(out, "warning: {error}");
    }

    out
}

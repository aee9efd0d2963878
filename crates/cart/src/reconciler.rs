//! Cart reconciler.
//!
//! Owns the cart's [`ReferenceList`], persists every change through the
//! [`PersistedReferenceStore`], and turns the list into a hydrated
//! [`CartState`] by looking up each unique product in the [`Catalog`].
//!
//! # Ordering
//!
//! Every change to the list bumps a generation counter, and each
//! reconciliation batch carries the generation it was started for. A batch
//! commits only if its generation is still current when its lookups finish,
//! so a slow batch for an old list can never overwrite the state of a newer
//! one. Completion order does not matter.
//!
//! # Failure policy
//!
//! Lookups are independent: a failed lookup drops that product's entry and is
//! recorded in [`CartState::error`], but the rest of the cart still commits.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use cart_sync_core::{
    CartEntry, CartState, FailedLookup, ProductId, ReconcileFailure, ReferenceList,
};
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::catalog::Catalog;
use crate::error::add_breadcrumb;
use crate::persisted::{CookieStorage, PersistedReferenceStore};

/// Direction of a quantity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increase,
    Decrease,
}

/// Error parsing a [`Direction`].
#[derive(Debug, Error)]
#[error("unknown direction {0:?}, expected \"increase\" or \"decrease\"")]
pub struct UnknownDirection(String);

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "increase" => Ok(Self::Increase),
            "decrease" => Ok(Self::Decrease),
            _ => Err(UnknownDirection(s.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Increase => "increase",
            Self::Decrease => "decrease",
        })
    }
}

/// What happened to the reconciliation a call started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The result was published to [`CartReconciler::state`].
    Committed,
    /// A newer list replaced this one before the lookups finished; the
    /// result was discarded.
    Superseded,
    /// The call did not change the list, so nothing was reconciled.
    Unchanged,
}

struct Shared {
    references: ReferenceList,
    generation: u64,
}

/// The list a batch was started for.
struct Snapshot {
    generation: u64,
    references: ReferenceList,
}

/// Keeps a cookie-backed reference list and its hydrated cart in sync.
pub struct CartReconciler<C, S> {
    catalog: C,
    store: PersistedReferenceStore<S>,
    shared: Mutex<Shared>,
    state: watch::Sender<CartState>,
}

impl<C: Catalog, S: CookieStorage> CartReconciler<C, S> {
    /// Create a reconciler from the persisted list without reconciling.
    ///
    /// The initial state is `loading` if the persisted list is non-empty;
    /// call [`refresh`](Self::refresh) to hydrate it.
    pub fn new(catalog: C, store: PersistedReferenceStore<S>) -> Self {
        let references = store.load();
        let initial = CartState {
            loading: !references.is_empty(),
            ..CartState::empty()
        };
        let (state, _) = watch::channel(initial);

        Self {
            catalog,
            store,
            shared: Mutex::new(Shared {
                references,
                generation: 0,
            }),
            state,
        }
    }

    /// Create a reconciler and run the initial reconciliation.
    pub async fn open(catalog: C, store: PersistedReferenceStore<S>) -> Self {
        let cart = Self::new(catalog, store);
        cart.refresh().await;
        cart
    }

    /// The last committed cart state.
    pub fn state(&self) -> CartState {
        self.state.borrow().clone()
    }

    /// Watch every committed state change.
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.state.subscribe()
    }

    /// The current reference list.
    pub fn references(&self) -> ReferenceList {
        self.lock().references.clone()
    }

    pub const fn store(&self) -> &PersistedReferenceStore<S> {
        &self.store
    }

    pub const fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Add one unit of `id`. Duplicates are allowed and add quantity.
    #[instrument(skip_all, fields(product_id = %id))]
    pub async fn add(&self, id: ProductId) -> Reconciliation {
        add_breadcrumb("cart", "Added product", Some(&[("product_id", id.as_str())]));

        let snapshot = self.mutate(|refs| {
            refs.push(id.clone());
            true
        });
        self.run(snapshot).await
    }

    /// Change the quantity of a product already in the cart by one.
    ///
    /// A no-op if `id` is not in the cart. Decreasing the last unit removes
    /// the product. Increases are unbounded.
    #[instrument(skip_all, fields(product_id = %id, direction = %direction))]
    pub async fn change_count(&self, id: &ProductId, direction: Direction) -> Reconciliation {
        let snapshot = self.mutate(|refs| {
            if !refs.contains(id) {
                debug!("Ignoring count change for product not in cart");
                return false;
            }
            match direction {
                Direction::Increase => {
                    refs.push(id.clone());
                    true
                }
                Direction::Decrease => refs.remove_first(id),
            }
        });

        if snapshot.is_some() {
            let message = match direction {
                Direction::Increase => "Increased quantity",
                Direction::Decrease => "Decreased quantity",
            };
            add_breadcrumb("cart", message, Some(&[("product_id", id.as_str())]));
        }

        self.run(snapshot).await
    }

    /// Shorthand for [`change_count`](Self::change_count) with [`Direction::Increase`].
    pub async fn increment(&self, id: &ProductId) -> Reconciliation {
        self.change_count(id, Direction::Increase).await
    }

    /// Shorthand for [`change_count`](Self::change_count) with [`Direction::Decrease`].
    pub async fn decrement(&self, id: &ProductId) -> Reconciliation {
        self.change_count(id, Direction::Decrease).await
    }

    /// Remove everything from the cart.
    #[instrument(skip_all)]
    pub async fn clear(&self) -> Reconciliation {
        let snapshot = self.mutate(|refs| {
            if refs.is_empty() {
                return false;
            }
            *refs = ReferenceList::new();
            true
        });
        self.run(snapshot).await
    }

    /// Reconcile the current list again, e.g. after catalog data changed.
    #[instrument(skip_all)]
    pub async fn refresh(&self) -> Reconciliation {
        let snapshot = {
            let mut shared = self.lock();
            Self::begin(&mut shared)
        };
        self.reconcile(snapshot).await
    }

    /// Re-read the persisted cookie and reconcile if another writer changed it.
    #[instrument(skip_all)]
    pub async fn reload(&self) -> Reconciliation {
        let snapshot = {
            // Read under the lock; a mutation's write must not land between
            // the read and the comparison
            let mut shared = self.lock();
            let persisted = self.store.load();
            if persisted == shared.references {
                None
            } else {
                debug!(
                    references = persisted.len(),
                    "Persisted cart changed externally"
                );
                shared.references = persisted;
                Some(Self::begin(&mut shared))
            }
        };
        self.run(snapshot).await
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new generation for the current list.
    fn begin(shared: &mut Shared) -> Snapshot {
        shared.generation = shared.generation.wrapping_add(1);
        Snapshot {
            generation: shared.generation,
            references: shared.references.clone(),
        }
    }

    /// Apply `change` to a copy of the list; if it reports a change, persist
    /// the new list and start a generation for it.
    fn mutate<F>(&self, change: F) -> Option<Snapshot>
    where
        F: FnOnce(&mut ReferenceList) -> bool,
    {
        let mut shared = self.lock();
        let mut next = shared.references.clone();
        if !change(&mut next) {
            return None;
        }

        self.store.save(&next);
        shared.references = next;
        Some(Self::begin(&mut shared))
    }

    async fn run(&self, snapshot: Option<Snapshot>) -> Reconciliation {
        match snapshot {
            Some(snapshot) => self.reconcile(snapshot).await,
            None => Reconciliation::Unchanged,
        }
    }

    async fn reconcile(&self, snapshot: Snapshot) -> Reconciliation {
        if snapshot.references.is_empty() {
            return self.commit(snapshot.generation, CartState::empty());
        }

        self.mark_loading(snapshot.generation);

        let counts = snapshot.references.multiplicities();
        debug!(
            generation = snapshot.generation,
            references = snapshot.references.len(),
            unique = counts.len(),
            "Reconciling cart"
        );

        let lookups = counts.iter().map(|(id, _)| self.catalog.fetch_product(id));
        let results = join_all(lookups).await;

        let mut entries = BTreeMap::new();
        let mut failed = Vec::new();
        for ((id, count), result) in counts.into_iter().zip(results) {
            match result {
                Ok(product) => {
                    entries.insert(id, CartEntry { product, count });
                }
                Err(e) => {
                    warn!(product_id = %id, error = %e, "Product lookup failed; dropping cart entry");
                    failed.push(FailedLookup {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let state = CartState {
            entries,
            loading: false,
            error: (!failed.is_empty()).then_some(ReconcileFailure { failed }),
        };
        self.commit(snapshot.generation, state)
    }

    fn mark_loading(&self, generation: u64) {
        let shared = self.lock();
        if shared.generation == generation {
            self.state.send_if_modified(|state| {
                let changed = !state.loading;
                state.loading = true;
                changed
            });
        }
    }

    fn commit(&self, generation: u64, state: CartState) -> Reconciliation {
        let shared = self.lock();
        if shared.generation != generation {
            debug!(
                generation,
                current = shared.generation,
                "Discarding stale reconciliation"
            );
            return Reconciliation::Superseded;
        }

        self.state.send_replace(state);
        Reconciliation::Committed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, OnceLock, Weak};

    use async_trait::async_trait;
    use cart_sync_core::{Price, ProductDetails};
    use rust_decimal::Decimal;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::catalog::CatalogError;
    use crate::persisted::{CookieOptions, MemoryCookieStorage, StorageError};

    fn id(s: &str) -> ProductId {
        ProductId::parse(s).unwrap()
    }

    fn product(s: &str) -> ProductDetails {
        ProductDetails {
            id: id(s),
            name: format!("Product {s}"),
            price: Price::new(Decimal::new(1000, 0)).unwrap(),
            description: String::new(),
            thumbnail: String::new(),
        }
    }

    /// Catalog that knows every ID except the ones marked missing, and
    /// blocks lookups of gated IDs until a permit is released.
    struct TestCatalog {
        missing: HashSet<ProductId>,
        gated: HashSet<ProductId>,
        gate: Arc<Semaphore>,
        calls: Mutex<Vec<ProductId>>,
    }

    impl Default for TestCatalog {
        fn default() -> Self {
            Self {
                missing: HashSet::new(),
                gated: HashSet::new(),
                gate: Arc::new(Semaphore::new(0)),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl TestCatalog {
        fn calls(&self) -> Vec<ProductId> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Catalog for TestCatalog {
        async fn fetch_product(&self, pid: &ProductId) -> Result<ProductDetails, CatalogError> {
            self.calls.lock().unwrap().push(pid.clone());
            if self.gated.contains(pid) {
                let _permit = self.gate.acquire().await.unwrap();
            }
            if self.missing.contains(pid) {
                return Err(CatalogError::NotFound(pid.clone()));
            }
            Ok(product(pid.as_str()))
        }
    }

    fn cart(catalog: TestCatalog) -> CartReconciler<TestCatalog, MemoryCookieStorage> {
        CartReconciler::new(
            catalog,
            PersistedReferenceStore::new(MemoryCookieStorage::new()),
        )
    }

    #[tokio::test]
    async fn test_new_empty_cart_is_settled() {
        let cart = cart(TestCatalog::default());
        let state = cart.state();
        assert!(state.is_empty());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_new_with_persisted_list_starts_loading() {
        let storage = MemoryCookieStorage::with_value(r#"["p1"]"#);
        let cart = CartReconciler::new(
            TestCatalog::default(),
            PersistedReferenceStore::new(storage),
        );
        assert!(cart.state().loading);
        assert!(cart.catalog().calls().is_empty());

        assert_eq!(cart.refresh().await, Reconciliation::Committed);
        assert!(!cart.state().loading);
        assert_eq!(cart.state().get(&id("p1")).unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_add_persists_before_reconciling() {
        let cart = cart(TestCatalog::default());

        assert_eq!(cart.add(id("p1")).await, Reconciliation::Committed);
        assert_eq!(cart.store().storage().writes(), 1);
        assert_eq!(cart.store().load(), cart.references());
    }

    #[tokio::test]
    async fn test_noop_change_does_not_write() {
        let cart = cart(TestCatalog::default());

        assert_eq!(
            cart.increment(&id("ghost")).await,
            Reconciliation::Unchanged
        );
        assert_eq!(
            cart.decrement(&id("ghost")).await,
            Reconciliation::Unchanged
        );
        assert_eq!(cart.store().storage().writes(), 0);
        assert!(cart.catalog().calls().is_empty());
    }

    #[tokio::test]
    async fn test_decrement_to_zero_removes_entry() {
        let cart = cart(TestCatalog::default());
        cart.add(id("p1")).await;
        cart.add(id("p2")).await;

        cart.decrement(&id("p1")).await;

        let state = cart.state();
        assert!(state.get(&id("p1")).is_none());
        assert_eq!(state.get(&id("p2")).unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_clear_empties_without_lookups() {
        let cart = cart(TestCatalog::default());
        cart.add(id("p1")).await;
        let calls_before = cart.catalog().calls().len();

        assert_eq!(cart.clear().await, Reconciliation::Committed);
        assert!(cart.state().is_empty());
        assert!(cart.references().is_empty());
        assert_eq!(cart.catalog().calls().len(), calls_before);

        assert_eq!(cart.clear().await, Reconciliation::Unchanged);
    }

    #[tokio::test]
    async fn test_failed_lookup_recorded_in_error() {
        let catalog = TestCatalog {
            missing: HashSet::from([id("gone")]),
            ..TestCatalog::default()
        };
        let cart = cart(catalog);

        cart.add(id("p1")).await;
        cart.add(id("gone")).await;

        let state = cart.state();
        assert_eq!(state.entries.len(), 1);
        let failure = state.error.unwrap();
        assert_eq!(failure.failed.len(), 1);
        assert_eq!(failure.failed[0].id, id("gone"));
    }

    #[tokio::test]
    async fn test_stale_batch_is_discarded() {
        let gate = Arc::new(Semaphore::new(0));
        let catalog = TestCatalog {
            gated: HashSet::from([id("slow")]),
            gate: Arc::clone(&gate),
            ..TestCatalog::default()
        };
        let cart = cart(catalog);

        // The first batch blocks on "slow"; the second empties the list and
        // commits immediately, then releases the first.
        let (first, second) = tokio::join!(cart.add(id("slow")), async {
            tokio::task::yield_now().await;
            let outcome = cart.decrement(&id("slow")).await;
            gate.add_permits(1);
            outcome
        });

        assert_eq!(first, Reconciliation::Superseded);
        assert_eq!(second, Reconciliation::Committed);
        assert!(cart.state().is_empty());
        assert!(!cart.state().loading);
    }

    #[tokio::test]
    async fn test_reload_picks_up_external_change() {
        let cart = cart(TestCatalog::default());
        cart.add(id("p1")).await;

        assert_eq!(cart.reload().await, Reconciliation::Unchanged);

        cart.store()
            .storage()
            .set_external(Some(r#"["p2","p2"]"#.to_string()));
        assert_eq!(cart.reload().await, Reconciliation::Committed);

        let state = cart.state();
        assert!(state.get(&id("p1")).is_none());
        assert_eq!(state.get(&id("p2")).unwrap().count, 2);
    }

    /// Storage that records whether the cart's list was locked while the
    /// cookie was being read.
    #[derive(Default)]
    struct LockCheckingStorage {
        inner: MemoryCookieStorage,
        cart: OnceLock<Weak<CartReconciler<TestCatalog, LockCheckingStorage>>>,
        reads_while_locked: AtomicUsize,
        reads_while_unlocked: AtomicUsize,
    }

    impl CookieStorage for LockCheckingStorage {
        fn read(&self) -> Option<String> {
            if let Some(cart) = self.cart.get().and_then(Weak::upgrade) {
                let counter = if cart.shared.try_lock().is_err() {
                    &self.reads_while_locked
                } else {
                    &self.reads_while_unlocked
                };
                counter.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.read()
        }

        fn write(&self, value: &str, options: &CookieOptions) -> Result<(), StorageError> {
            self.inner.write(value, options)
        }
    }

    #[tokio::test]
    async fn test_reload_reads_cookie_under_lock() {
        let cart = Arc::new(CartReconciler::new(
            TestCatalog::default(),
            PersistedReferenceStore::new(LockCheckingStorage::default()),
        ));
        let storage = cart.store().storage();
        assert!(storage.cart.set(Arc::downgrade(&cart)).is_ok());

        storage.inner.set_external(Some(r#"["p1"]"#.to_string()));
        assert_eq!(cart.reload().await, Reconciliation::Committed);
        assert_eq!(cart.reload().await, Reconciliation::Unchanged);

        assert_eq!(storage.reads_while_locked.load(Ordering::SeqCst), 2);
        assert_eq!(storage.reads_while_unlocked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_subscribers_see_commits() {
        let cart = cart(TestCatalog::default());
        let mut rx = cart.subscribe();

        cart.add(id("p1")).await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().get(&id("p1")).unwrap().count, 1);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("increase".parse::<Direction>().unwrap(), Direction::Increase);
        assert_eq!("decrease".parse::<Direction>().unwrap(), Direction::Decrease);
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!(Direction::Decrease.to_string(), "decrease");
    }
}

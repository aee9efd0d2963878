//! End-to-end cart behavior against an in-process catalog.
//!
//! Every test drives the public `CartReconciler` API and checks both the
//! published `CartState` and what ended up in the cookie.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use cart_sync::persisted::{self, PersistedFormat};
use cart_sync::{CartReconciler, CookieStorage, MemoryCookieStorage, Reconciliation};
use cart_sync_core::ReferenceList;
use cart_sync_integration_tests::{RecordingCatalog, cart, cart_with_cookie, id};

type TestCart = CartReconciler<RecordingCatalog, MemoryCookieStorage>;

/// The list as it would be read back from the cookie.
fn stored(cart: &TestCart) -> ReferenceList {
    persisted::decode(cart.store().storage().read().as_deref())
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_adding_twice_counts_two() {
    let cart = cart(RecordingCatalog::new().with("p1"));

    cart.add(id("p1")).await;
    cart.add(id("p1")).await;

    let state = cart.state();
    assert_eq!(state.entries.len(), 1);
    assert_eq!(state.get(&id("p1")).unwrap().count, 2);
    assert!(!state.loading);

    // Each add reconciles once; neither pass fetched p1 per occurrence
    assert_eq!(cart.catalog().fetches("p1"), 2);
    assert_eq!(stored(&cart), vec![id("p1"), id("p1")].into());

    // A fresh page load of the same cookie costs a single lookup
    let raw = cart.store().storage().read();
    let reopened = cart_with_cookie(RecordingCatalog::new().with("p1"), raw.as_deref());
    reopened.refresh().await;
    assert_eq!(reopened.catalog().fetches("p1"), 1);
    assert_eq!(reopened.state(), cart.state());
}

#[tokio::test]
async fn test_decrease_removes_a_single_occurrence() {
    let catalog = RecordingCatalog::new().with("p1").with("p2");
    let cart = cart_with_cookie(catalog, Some(r#"["p1","p1","p2"]"#));

    assert_eq!(cart.decrement(&id("p1")).await, Reconciliation::Committed);

    assert_eq!(cart.references(), vec![id("p1"), id("p2")].into());
    assert_eq!(stored(&cart), cart.references());

    let state = cart.state();
    assert_eq!(state.get(&id("p1")).unwrap().count, 1);
    assert_eq!(state.get(&id("p2")).unwrap().count, 1);
}

#[tokio::test]
async fn test_corrupt_cookie_loads_empty_cart() {
    let cart = cart_with_cookie(RecordingCatalog::new(), Some("not-json"));

    assert!(cart.references().is_empty());
    let state = cart.state();
    assert!(state.is_empty());
    assert!(!state.loading);
    assert!(state.error.is_none());

    assert_eq!(cart.refresh().await, Reconciliation::Committed);
    assert!(cart.catalog().calls().is_empty());
}

#[tokio::test]
async fn test_failed_lookup_drops_only_that_entry() {
    let catalog = RecordingCatalog::new().with("p1").failing("p2");
    let cart = cart_with_cookie(catalog, Some(r#"["p1","p2"]"#));

    cart.refresh().await;

    let state = cart.state();
    assert!(state.get(&id("p1")).is_some());
    assert!(state.get(&id("p2")).is_none());
    assert!(!state.loading);

    let error = state.error.unwrap();
    assert_eq!(error.failed.len(), 1);
    assert_eq!(error.failed[0].id, id("p2"));

    // The failed product stays in the cookie for the next attempt
    assert_eq!(cart.references().occurrences(&id("p2")), 1);
}

// ============================================================================
// Invariants
// ============================================================================

#[tokio::test]
async fn test_fetches_once_per_unique_id() {
    let catalog = RecordingCatalog::new().with("p1").with("p2").with("p3");
    let cart = cart_with_cookie(catalog, Some(r#"["p1","p2","p1","p3","p1","p2"]"#));

    cart.refresh().await;

    assert_eq!(cart.catalog().calls().len(), 3);
    for s in ["p1", "p2", "p3"] {
        assert_eq!(cart.catalog().fetches(s), 1, "{s} fetched more than once");
    }
}

#[tokio::test]
async fn test_counts_match_occurrences_after_mixed_mutations() {
    let catalog = RecordingCatalog::new().with("p1").with("p2").with("p3");
    let cart = cart(catalog);

    cart.add(id("p1")).await;
    cart.add(id("p2")).await;
    cart.increment(&id("p1")).await;
    cart.add(id("p3")).await;
    cart.increment(&id("p1")).await;
    cart.decrement(&id("p2")).await;
    cart.add(id("p2")).await;
    cart.decrement(&id("p1")).await;

    let references = cart.references();
    let state = cart.state();
    assert_eq!(state.entries.len(), 3);
    for (pid, count) in references.multiplicities() {
        assert_eq!(state.get(&pid).unwrap().count, count);
    }
    assert_eq!(state.get(&id("p1")).unwrap().count, 2);
    assert_eq!(state.item_count(), 4);
}

#[tokio::test]
async fn test_change_count_for_unknown_id_is_noop() {
    let cart = cart(RecordingCatalog::new().with("p1"));
    cart.add(id("p1")).await;
    let before = cart.state();
    let writes = cart.store().storage().writes();

    assert_eq!(cart.increment(&id("p9")).await, Reconciliation::Unchanged);
    assert_eq!(cart.decrement(&id("p9")).await, Reconciliation::Unchanged);

    assert_eq!(cart.references(), vec![id("p1")].into());
    assert_eq!(cart.state(), before);
    assert_eq!(cart.store().storage().writes(), writes);
}

#[tokio::test]
async fn test_decrement_to_zero_removes_entry() {
    let catalog = RecordingCatalog::new().with("p1").with("p2");
    let cart = cart_with_cookie(catalog, Some(r#"["p1","p2"]"#));
    cart.refresh().await;

    cart.decrement(&id("p1")).await;

    assert!(cart.state().get(&id("p1")).is_none());
    assert!(!cart.references().contains(&id("p1")));
    assert_eq!(stored(&cart), vec![id("p2")].into());
}

#[tokio::test]
async fn test_counted_cookie_round_trips_through_cart() {
    let catalog = RecordingCatalog::new().with("p1").with("p2");
    let list: ReferenceList = vec![id("p2"), id("p1"), id("p2")].into();
    let raw = persisted::encode_as(&list, PersistedFormat::Counted);

    let cart = cart_with_cookie(catalog, Some(raw.as_str()));
    assert_eq!(cart.references().multiplicities(), list.multiplicities());

    cart.refresh().await;
    assert_eq!(cart.state().get(&id("p2")).unwrap().count, 2);
}

#[tokio::test]
async fn test_reload_picks_up_external_write() {
    let catalog = RecordingCatalog::new().with("p1").with("p2");
    let cart = cart(catalog);
    cart.add(id("p1")).await;

    let external: ReferenceList = vec![id("p2"), id("p2")].into();
    cart.store()
        .storage()
        .set_external(Some(persisted::encode(&external)));

    assert_eq!(cart.reload().await, Reconciliation::Committed);
    assert_eq!(cart.references(), external);
    assert!(cart.state().get(&id("p1")).is_none());
    assert_eq!(cart.state().get(&id("p2")).unwrap().count, 2);
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_stale_reconciliation_is_discarded() {
    let catalog = RecordingCatalog::new().with("p1").with("p2").holding("p1");
    let cart = cart(catalog);
    let mut updates = cart.subscribe();

    // The first batch blocks on p1; the second list no longer contains it
    let slow = cart.add(id("p1"));
    let fast = async {
        tokio::task::yield_now().await;
        let result = cart.clear().await;
        let result = (result, cart.add(id("p2")).await);
        cart.catalog().release("p1");
        result
    };
    let (slow, (cleared, added)) = tokio::join!(slow, fast);

    assert_eq!(slow, Reconciliation::Superseded);
    assert_eq!(cleared, Reconciliation::Committed);
    assert_eq!(added, Reconciliation::Committed);

    let state = updates.borrow_and_update().clone();
    assert!(state.get(&id("p1")).is_none());
    assert_eq!(state.get(&id("p2")).unwrap().count, 1);
    assert!(!state.loading);
}

//! Scenario: a buyer cancellation request is detected exactly once.
//!
//! The reconciler exposes the pre-overwrite flag; the import pipeline uses
//! the false→true edge to queue a cancel intent. Repeated polls after the
//! edge must not re-trigger, and redundant enqueues coalesce anyway.

use csx_fulfillment::{
    ChangeParams, FulfillmentAction, FulfillmentOutbox, Initiator, NewFulfillmentChange,
};
use csx_orders::{reconcile_item, IncomingOrderItem};
use csx_schemas::{Channel, Money};
use csx_testkit::{InMemoryOrderStore, InMemoryOutbox};

fn poll(cancel_requested: bool) -> IncomingOrderItem {
    IncomingOrderItem {
        channel_item_id: "wm-line-9".to_string(),
        sku: "GADGET-9".to_string(),
        qty_purchased: 1,
        price: Money::new(15_000_000, "USD"),
        buyer_cancellation_requested: cancel_requested,
        tracking: None,
    }
}

/// One import tick: reconcile the poll, enqueue a cancel intent on the
/// false→true edge. This is the caller-side contract the one-shot
/// `previous_buyer_cancellation_requested` read exists for.
fn import_tick(
    store: &mut InMemoryOrderStore,
    outbox: &mut InMemoryOutbox,
    incoming: &IncomingOrderItem,
) {
    let outcome = reconcile_item(store, 30, incoming).unwrap();
    let became_requested = !outcome.previous_buyer_cancellation_requested
        && outcome.item.buyer_cancellation_requested;
    if became_requested {
        outbox
            .enqueue(NewFulfillmentChange {
                order_id: 30,
                channel: Channel::Walmart,
                initiator: Initiator::Automatic,
                params: ChangeParams::CancelOrder,
            })
            .unwrap();
    }
}

#[test]
fn edge_fires_once_across_polls() {
    let mut store = InMemoryOrderStore::new();
    let mut outbox = InMemoryOutbox::new();

    import_tick(&mut store, &mut outbox, &poll(false));
    assert_eq!(outbox.unprocessed_count(), 0, "no request yet");

    import_tick(&mut store, &mut outbox, &poll(true));
    assert_eq!(outbox.unprocessed_count(), 1, "edge detected");

    // The channel keeps reporting the request on every poll.
    import_tick(&mut store, &mut outbox, &poll(true));
    import_tick(&mut store, &mut outbox, &poll(true));
    assert_eq!(outbox.unprocessed_count(), 1, "edge must not re-fire");

    let change = outbox
        .find_unprocessed(30, FulfillmentAction::CancelOrder)
        .unwrap()
        .unwrap();
    assert_eq!(change.params, ChangeParams::CancelOrder);
}

#[test]
fn stored_flag_reads_true_after_the_edge() {
    let mut store = InMemoryOrderStore::new();

    reconcile_item(&mut store, 30, &poll(false)).unwrap();
    let edge = reconcile_item(&mut store, 30, &poll(true)).unwrap();
    assert!(!edge.previous_buyer_cancellation_requested);
    assert!(edge.item.buyer_cancellation_requested);

    let after = reconcile_item(&mut store, 30, &poll(true)).unwrap();
    assert!(after.previous_buyer_cancellation_requested);
    assert!(!after.saved);
}

//! Scenario: a marketplace order flows end-to-end through reconciliation
//! and fulfillment.
//!
//! Poll payload → status normalization → item reconcile (repeated, must be
//! idempotent) → orchestrator sequence → one coalesced shipping intent.

use std::collections::BTreeSet;

use chrono::Utc;

use csx_fulfillment::{
    ChangeParams, FulfillmentAction, FulfillmentConfig, FulfillmentOrchestrator,
    FulfillmentOutbox, OrderStore, Step, StepResult,
};
use csx_orders::{
    normalize_status, reconcile_item, BuyerInfo, ExternalOrder, IncomingOrderItem,
    ReservationState,
};
use csx_schemas::{Channel, Money, OrderStatus, Tracking};
use csx_testkit::{InMemoryGateway, InMemoryOrderLog, InMemoryOrderStore, InMemoryOutbox};

fn shipped_order(id: i64) -> ExternalOrder {
    ExternalOrder {
        id,
        channel: Channel::Amazon,
        channel_order_id: format!("114-{id}"),
        store_id: 1,
        status: normalize_status(Channel::Amazon, "Shipped"),
        purchased_at: Utc::now(),
        subtotal: Money::new(49_990_000, "USD"),
        shipping_price: Money::new(4_990_000, "USD"),
        product_tax: Money::new(3_500_000, "USD"),
        shipping_tax: Money::zero("USD"),
        discount: Money::zero("USD"),
        buyer: BuyerInfo {
            name: "Pat Doe".to_string(),
            email: Some("pat@example.com".to_string()),
        },
        is_channel_fulfilled: false,
        magento_order_id: None,
        invoice_id: None,
        shipment_id: None,
        reservation: ReservationState::NotReserved,
    }
}

fn poll_item(tracking: Option<Tracking>) -> IncomingOrderItem {
    IncomingOrderItem {
        channel_item_id: "amz-item-1".to_string(),
        sku: "WIDGET-1".to_string(),
        qty_purchased: 2,
        price: Money::new(24_995_000, "USD"),
        buyer_cancellation_requested: false,
        tracking,
    }
}

#[test]
fn order_reaches_shipped_with_one_intent() {
    let mut store = InMemoryOrderStore::new().with_order(shipped_order(10));
    let mut gateway = InMemoryGateway::new();
    let mut outbox = InMemoryOutbox::new();
    let mut log = InMemoryOrderLog::new();

    // Two identical polls: the second must not write.
    let tracking = Tracking {
        carrier: "UPS".to_string(),
        number: "1Z-GREEN".to_string(),
    };
    let first = reconcile_item(&mut store, 10, &poll_item(Some(tracking.clone()))).unwrap();
    assert!(first.created);
    let second = reconcile_item(&mut store, 10, &poll_item(Some(tracking.clone()))).unwrap();
    assert!(!second.saved, "identical repoll must be a no-op");
    assert_eq!(store.item_saves, 1);

    let items = store.items().to_vec();

    // Two orchestrator passes: the second coalesces rather than duplicates.
    let mut orchestrator = FulfillmentOrchestrator::new(
        &mut store,
        &mut gateway,
        &mut outbox,
        &mut log,
        FulfillmentConfig::default(),
    );
    let report = orchestrator.process(10, &items).unwrap();
    for step in [
        Step::ReserveStock,
        Step::CreateMagentoOrder,
        Step::CreateInvoice,
        Step::CreateShipment,
        Step::PropagateShipping,
    ] {
        let result = &report.steps.iter().find(|(s, _)| *s == step).unwrap().1;
        assert_eq!(*result, StepResult::Done, "{step:?} must complete");
    }
    orchestrator.process(10, &items).unwrap();

    assert_eq!(gateway.orders_created, 1);
    assert_eq!(gateway.invoices_created, 1);
    assert_eq!(gateway.shipments_created, 1);
    assert_eq!(outbox.unprocessed_count(), 1, "intents must coalesce");

    let change = outbox
        .find_unprocessed(10, FulfillmentAction::UpdateShipping)
        .unwrap()
        .unwrap();
    let ChangeParams::UpdateShipping { tracking, items } = change.params else {
        panic!("wrong params kind");
    };
    assert_eq!(tracking.number, "1Z-GREEN");
    assert_eq!(items[0].qty, 2, "capped at qty_purchased");

    let persisted = store.load_order(10).unwrap().unwrap();
    assert!(persisted.magento_order_id.is_some());
    assert!(persisted.invoice_id.is_some());
    assert!(persisted.shipment_id.is_some());
    assert_eq!(persisted.reservation, ReservationState::Placed);
}

#[test]
fn re_keyed_item_keeps_tracking_target_current() {
    // The channel re-keys the line item between polls; the canonical id
    // must follow so tracking writes land on the id the channel now uses.
    let mut store = InMemoryOrderStore::new().with_order(shipped_order(11));

    reconcile_item(&mut store, 11, &poll_item(None)).unwrap();

    let mut rekeyed = poll_item(None);
    rekeyed.channel_item_id = "amz-item-1b".to_string();
    reconcile_item(&mut store, 11, &rekeyed).unwrap();
    // Second sighting of the new id: it was matched via the merged set and
    // becomes primary.
    let out = reconcile_item(&mut store, 11, &rekeyed).unwrap();

    assert_eq!(out.item.channel_item_id, "amz-item-1b");
    assert_eq!(
        out.item.merged_channel_item_ids,
        BTreeSet::from(["amz-item-1".to_string()])
    );
    assert_eq!(store.items().len(), 1, "still one canonical row");
}

#[test]
fn pending_then_unshipped_then_shipped_progression() {
    let mut order = shipped_order(12);
    order.status = normalize_status(Channel::Amazon, "Pending");
    assert_eq!(order.status, OrderStatus::Pending);

    order
        .apply_status(normalize_status(Channel::Amazon, "Unshipped"))
        .unwrap();
    order
        .apply_status(normalize_status(Channel::Amazon, "Shipped"))
        .unwrap();
    assert!(order.status.is_terminal());
}

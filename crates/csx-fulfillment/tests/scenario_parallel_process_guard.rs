//! Scenario: two workers race to create the Magento order for the same row.
//!
//! # Invariant under test
//! Exactly one invocation transitions `magento_order_id` from None to Some;
//! the other detects the persisted mismatch on its optimistic re-read and
//! no-ops without raising.

use std::collections::HashMap;

use chrono::Utc;

use csx_fulfillment::{
    EnqueueResult, FulfillmentAction, FulfillmentChange, FulfillmentConfig,
    FulfillmentOrchestrator, FulfillmentOutbox, LogLevel, MagentoGateway, NewFulfillmentChange,
    OrderLog, OrderStore, StepResult, StepSkip,
};
use csx_orders::{BuyerInfo, ExternalOrder, ReservationState, StoreError};
use csx_schemas::{Channel, Money, OrderId, OrderStatus, Tracking};

// ---------------------------------------------------------------------------
// In-file doubles
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemOrders(HashMap<OrderId, ExternalOrder>);

impl OrderStore for MemOrders {
    fn load_order(&self, id: OrderId) -> Result<Option<ExternalOrder>, StoreError> {
        Ok(self.0.get(&id).cloned())
    }
    fn save_order(&mut self, order: &ExternalOrder) -> Result<(), StoreError> {
        self.0.insert(order.id, order.clone());
        Ok(())
    }
}

#[derive(Default)]
struct CountingGateway {
    orders_created: usize,
    next_id: i64,
}

impl MagentoGateway for CountingGateway {
    fn reserve_stock(&mut self, _order: &ExternalOrder) -> Result<(), StoreError> {
        Ok(())
    }
    fn create_order(&mut self, _order: &ExternalOrder) -> Result<i64, StoreError> {
        self.orders_created += 1;
        self.next_id += 1;
        Ok(self.next_id)
    }
    fn order_has_invoice(&self, _id: i64) -> Result<bool, StoreError> {
        Ok(true)
    }
    fn is_invoiceable(&self, _id: i64) -> Result<bool, StoreError> {
        Ok(false)
    }
    fn create_invoice(&mut self, _id: i64) -> Result<i64, StoreError> {
        Err(StoreError::new("not expected in this scenario"))
    }
    fn order_has_shipment(&self, _id: i64) -> Result<bool, StoreError> {
        Ok(true)
    }
    fn is_shippable(&self, _id: i64) -> Result<bool, StoreError> {
        Ok(false)
    }
    fn create_shipment(&mut self, _id: i64, _t: &[Tracking]) -> Result<i64, StoreError> {
        Err(StoreError::new("not expected in this scenario"))
    }
}

#[derive(Default)]
struct NullOutbox;

impl FulfillmentOutbox for NullOutbox {
    fn enqueue(&mut self, _c: NewFulfillmentChange) -> Result<EnqueueResult, StoreError> {
        Ok(EnqueueResult::Inserted { id: 1 })
    }
    fn find_unprocessed(
        &self,
        _order_id: OrderId,
        _action: FulfillmentAction,
    ) -> Result<Option<FulfillmentChange>, StoreError> {
        Ok(None)
    }
}

#[derive(Default)]
struct MemLog(Vec<(OrderId, LogLevel, String)>);

impl OrderLog for MemLog {
    fn append(&mut self, order_id: OrderId, level: LogLevel, message: &str) {
        self.0.push((order_id, level, message.to_string()));
    }
}

fn unshipped_order(id: OrderId) -> ExternalOrder {
    ExternalOrder {
        id,
        channel: Channel::Amazon,
        channel_order_id: format!("111-{id}"),
        store_id: 1,
        status: OrderStatus::Unshipped,
        purchased_at: Utc::now(),
        subtotal: Money::new(10_000_000, "USD"),
        shipping_price: Money::zero("USD"),
        product_tax: Money::zero("USD"),
        shipping_tax: Money::zero("USD"),
        discount: Money::zero("USD"),
        buyer: BuyerInfo {
            name: "Buyer".to_string(),
            email: None,
        },
        is_channel_fulfilled: false,
        magento_order_id: None,
        invoice_id: None,
        shipment_id: None,
        reservation: ReservationState::Placed,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn second_worker_detects_peer_and_noops() {
    let mut store = MemOrders::default();
    store.save_order(&unshipped_order(42)).unwrap();

    let mut gateway = CountingGateway::default();
    let mut outbox = NullOutbox;
    let mut log = MemLog::default();

    // Both workers load their in-memory copy before either acts.
    let mut copy_a = store.load_order(42).unwrap().unwrap();
    let mut copy_b = store.load_order(42).unwrap().unwrap();

    let mut orchestrator = FulfillmentOrchestrator::new(
        &mut store,
        &mut gateway,
        &mut outbox,
        &mut log,
        FulfillmentConfig::default(),
    );

    // Worker A wins.
    let a = orchestrator.step_create_magento_order(&mut copy_a);
    assert_eq!(a, StepResult::Done);
    assert!(copy_a.magento_order_id.is_some());

    // Worker B held a stale copy; the re-read catches the advance.
    let b = orchestrator.step_create_magento_order(&mut copy_b);
    assert_eq!(b, StepResult::Skipped(StepSkip::AdvancedByParallelProcess));

    assert_eq!(gateway.orders_created, 1, "exactly one Magento order");
    assert_eq!(
        copy_b.magento_order_id, copy_a.magento_order_id,
        "the loser adopts the persisted row"
    );
}

#[test]
fn guard_reread_is_silent_in_order_log() {
    let mut store = MemOrders::default();
    store.save_order(&unshipped_order(7)).unwrap();

    let mut gateway = CountingGateway::default();
    let mut outbox = NullOutbox;
    let mut log = MemLog::default();

    let mut copy_a = store.load_order(7).unwrap().unwrap();
    let mut copy_b = store.load_order(7).unwrap().unwrap();

    {
        let mut orchestrator = FulfillmentOrchestrator::new(
            &mut store,
            &mut gateway,
            &mut outbox,
            &mut log,
            FulfillmentConfig::default(),
        );
        orchestrator.step_create_magento_order(&mut copy_a);
    }
    let before = log.0.len();

    let mut orchestrator = FulfillmentOrchestrator::new(
        &mut store,
        &mut gateway,
        &mut outbox,
        &mut log,
        FulfillmentConfig::default(),
    );
    orchestrator.step_create_magento_order(&mut copy_b);

    assert_eq!(
        log.0.len(),
        before,
        "the parallel-process skip must not write to the order log"
    );
}

#[test]
fn retry_after_win_skips_on_existing_id() {
    let mut store = MemOrders::default();
    store.save_order(&unshipped_order(9)).unwrap();

    let mut gateway = CountingGateway::default();
    let mut outbox = NullOutbox;
    let mut log = MemLog::default();

    let mut copy = store.load_order(9).unwrap().unwrap();

    let mut orchestrator = FulfillmentOrchestrator::new(
        &mut store,
        &mut gateway,
        &mut outbox,
        &mut log,
        FulfillmentConfig::default(),
    );

    assert_eq!(
        orchestrator.step_create_magento_order(&mut copy),
        StepResult::Done
    );
    // Re-running the same step with the fresh copy is an idempotent skip.
    assert_eq!(
        orchestrator.step_create_magento_order(&mut copy),
        StepResult::Skipped(StepSkip::MagentoOrderExists)
    );
    assert_eq!(gateway.orders_created, 1);
}

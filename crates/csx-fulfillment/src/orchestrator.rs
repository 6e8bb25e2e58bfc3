//! The per-order fulfillment state machine driver.
//!
//! Each step checks its own preconditions and either runs, skips with a
//! named reason, or fails. A failed step is logged against the order and
//! abandoned for this pass; later steps still run if their own
//! preconditions allow (a failed order-creation naturally no-ops the
//! invoice step, whose precondition requires the Magento order to exist).
//!
//! # Parallel-process guard
//!
//! Before creating a Magento order the persisted row is re-read; if its
//! `magento_order_id` differs from the in-memory copy, another process has
//! already advanced this order and the step aborts silently. This is a
//! best-effort optimistic check, not a transactional lock; callers must
//! not rely on it for mutual exclusion beyond duplicate-order prevention.

use serde::{Deserialize, Serialize};
use tracing::debug;

use csx_orders::{ExternalOrder, ExternalOrderItem, ReservationState, StoreError};
use csx_schemas::{OrderId, OrderStatus, Tracking};

use crate::outbox::{
    ChangeParams, FulfillmentOutbox, Initiator, ItemShipment, NewFulfillmentChange,
};

// ---------------------------------------------------------------------------
// Collaborator boundaries
// ---------------------------------------------------------------------------

/// Whole-row order persistence.
pub trait OrderStore {
    fn load_order(&self, id: OrderId) -> Result<Option<ExternalOrder>, StoreError>;
    fn save_order(&mut self, order: &ExternalOrder) -> Result<(), StoreError>;
}

/// The Magento sales subsystem, treated as an opaque storage + business
/// object API. Every call may fail; failures are step-local.
pub trait MagentoGateway {
    fn reserve_stock(&mut self, order: &ExternalOrder) -> Result<(), StoreError>;
    fn create_order(&mut self, order: &ExternalOrder) -> Result<i64, StoreError>;

    fn order_has_invoice(&self, magento_order_id: i64) -> Result<bool, StoreError>;
    fn is_invoiceable(&self, magento_order_id: i64) -> Result<bool, StoreError>;
    fn create_invoice(&mut self, magento_order_id: i64) -> Result<i64, StoreError>;

    fn order_has_shipment(&self, magento_order_id: i64) -> Result<bool, StoreError>;
    fn is_shippable(&self, magento_order_id: i64) -> Result<bool, StoreError>;
    fn create_shipment(
        &mut self,
        magento_order_id: i64,
        tracking: &[Tracking],
    ) -> Result<i64, StoreError>;
}

/// Severity for the per-order log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Append-only per-order message sink. This is the only user-visible
/// failure surface of the orchestrator.
pub trait OrderLog {
    fn append(&mut self, order_id: OrderId, level: LogLevel, message: &str);
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Account-level fulfillment switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentConfig {
    /// Create Magento invoices for imported orders.
    pub create_invoice: bool,
    /// Create Magento shipments and push tracking.
    pub create_shipment: bool,
    /// Import orders the channel fulfills from its own warehouse.
    pub channel_fulfilled_order_sync: bool,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            create_invoice: true,
            create_shipment: true,
            channel_fulfilled_order_sync: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Step outcomes
// ---------------------------------------------------------------------------

/// The five sequence slots, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    ReserveStock,
    CreateMagentoOrder,
    CreateInvoice,
    CreateShipment,
    PropagateShipping,
}

/// Why a step chose not to run. Expected outcomes, never errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepSkip {
    AlreadyReserved,
    ChannelFulfilledWithoutSync,
    OrderPending,
    OrderCanceled,
    OrderUnfulfillable,
    MagentoOrderExists,
    AdvancedByParallelProcess,
    MagentoOrderMissing,
    InvoicingDisabled,
    AlreadyInvoiced,
    NotInvoiceable,
    ShipmentSyncDisabled,
    NotYetShipped,
    AlreadyShipped,
    NotShippable,
    NoTrackingToPropagate,
}

/// Outcome of one step in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepResult {
    Done,
    Skipped(StepSkip),
    Failed { message: String },
}

impl StepResult {
    pub fn is_done(&self) -> bool {
        matches!(self, StepResult::Done)
    }
}

/// Everything that happened to one order in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessReport {
    pub order_id: OrderId,
    pub steps: Vec<(Step, StepResult)>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives the fulfillment sequence for one order at a time. Collaborators
/// are injected; the orchestrator holds no cross-order state.
pub struct FulfillmentOrchestrator<'a> {
    store: &'a mut dyn OrderStore,
    gateway: &'a mut dyn MagentoGateway,
    outbox: &'a mut dyn FulfillmentOutbox,
    log: &'a mut dyn OrderLog,
    config: FulfillmentConfig,
}

impl<'a> FulfillmentOrchestrator<'a> {
    pub fn new(
        store: &'a mut dyn OrderStore,
        gateway: &'a mut dyn MagentoGateway,
        outbox: &'a mut dyn FulfillmentOutbox,
        log: &'a mut dyn OrderLog,
        config: FulfillmentConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            outbox,
            log,
            config,
        }
    }

    /// Run the full five-step sequence for `order_id`.
    ///
    /// Returns `Err` only for the fatal case of the order row being
    /// unloadable; every step-level problem is captured in the report.
    pub fn process(
        &mut self,
        order_id: OrderId,
        items: &[ExternalOrderItem],
    ) -> Result<ProcessReport, StoreError> {
        let mut order = self
            .store
            .load_order(order_id)?
            .ok_or_else(|| StoreError::new(format!("order {order_id} not found")))?;

        let mut steps = Vec::with_capacity(5);
        steps.push((Step::ReserveStock, self.step_reserve_stock(&mut order)));
        steps.push((
            Step::CreateMagentoOrder,
            self.step_create_magento_order(&mut order),
        ));
        steps.push((Step::CreateInvoice, self.step_create_invoice(&mut order)));
        steps.push((
            Step::CreateShipment,
            self.step_create_shipment(&mut order, items),
        ));
        steps.push((
            Step::PropagateShipping,
            self.step_propagate_shipping(&order, items),
        ));

        Ok(ProcessReport { order_id, steps })
    }

    /// Step 1 — provisional stock allocation.
    pub fn step_reserve_stock(&mut self, order: &mut ExternalOrder) -> StepResult {
        if order.reservation != ReservationState::NotReserved {
            return StepResult::Skipped(StepSkip::AlreadyReserved);
        }
        if order.is_channel_fulfilled && !self.config.channel_fulfilled_order_sync {
            return StepResult::Skipped(StepSkip::ChannelFulfilledWithoutSync);
        }
        if order.status == OrderStatus::Canceled {
            return StepResult::Skipped(StepSkip::OrderCanceled);
        }

        if let Err(err) = self.gateway.reserve_stock(order) {
            return self.fail(order.id, "stock reservation", err);
        }
        order.reservation = ReservationState::Placed;
        match self.store.save_order(order) {
            Ok(()) => StepResult::Done,
            Err(err) => self.fail(order.id, "stock reservation save", err),
        }
    }

    /// Step 2 — create the Magento sales order, guarded against a parallel
    /// process having already done so.
    pub fn step_create_magento_order(&mut self, order: &mut ExternalOrder) -> StepResult {
        if order.magento_order_id.is_some() {
            return StepResult::Skipped(StepSkip::MagentoOrderExists);
        }
        if order.status == OrderStatus::Pending {
            return StepResult::Skipped(StepSkip::OrderPending);
        }
        if order.status == OrderStatus::Canceled {
            return StepResult::Skipped(StepSkip::OrderCanceled);
        }
        if order.is_channel_fulfilled && !self.config.channel_fulfilled_order_sync {
            return StepResult::Skipped(StepSkip::ChannelFulfilledWithoutSync);
        }

        // Optimistic re-read: a parallel worker may have created the order
        // after we loaded our copy. Abort silently if so.
        match self.store.load_order(order.id) {
            Ok(Some(persisted)) if persisted.magento_order_id != order.magento_order_id => {
                debug!(
                    order_id = order.id,
                    "magento order already created by a parallel process"
                );
                *order = persisted;
                return StepResult::Skipped(StepSkip::AdvancedByParallelProcess);
            }
            Ok(_) => {}
            Err(err) => return self.fail(order.id, "parallel-process re-read", err),
        }

        match self.gateway.create_order(order) {
            Ok(magento_order_id) => {
                order.magento_order_id = Some(magento_order_id);
                match self.store.save_order(order) {
                    Ok(()) => {
                        self.log.append(
                            order.id,
                            LogLevel::Info,
                            &format!("magento order {magento_order_id} created"),
                        );
                        StepResult::Done
                    }
                    Err(err) => self.fail(order.id, "magento order save", err),
                }
            }
            Err(err) => self.fail(order.id, "magento order creation", err),
        }
    }

    /// Step 3 — invoice the Magento order.
    pub fn step_create_invoice(&mut self, order: &mut ExternalOrder) -> StepResult {
        if !self.config.create_invoice {
            return StepResult::Skipped(StepSkip::InvoicingDisabled);
        }
        match order.status {
            OrderStatus::Pending => return StepResult::Skipped(StepSkip::OrderPending),
            OrderStatus::Canceled => return StepResult::Skipped(StepSkip::OrderCanceled),
            OrderStatus::Unfulfillable => {
                return StepResult::Skipped(StepSkip::OrderUnfulfillable)
            }
            _ => {}
        }
        let Some(magento_order_id) = order.magento_order_id else {
            return StepResult::Skipped(StepSkip::MagentoOrderMissing);
        };

        match self.gateway.order_has_invoice(magento_order_id) {
            Ok(true) => return StepResult::Skipped(StepSkip::AlreadyInvoiced),
            Ok(false) => {}
            Err(err) => return self.fail(order.id, "invoice lookup", err),
        }
        match self.gateway.is_invoiceable(magento_order_id) {
            Ok(true) => {}
            Ok(false) => return StepResult::Skipped(StepSkip::NotInvoiceable),
            Err(err) => return self.fail(order.id, "invoiceability check", err),
        }

        match self.gateway.create_invoice(magento_order_id) {
            Ok(invoice_id) => {
                order.invoice_id = Some(invoice_id);
                match self.store.save_order(order) {
                    Ok(()) => StepResult::Done,
                    Err(err) => self.fail(order.id, "invoice save", err),
                }
            }
            Err(err) => self.fail(order.id, "invoice creation", err),
        }
    }

    /// Step 4 — create the Magento shipment with the items' tracking.
    pub fn step_create_shipment(
        &mut self,
        order: &mut ExternalOrder,
        items: &[ExternalOrderItem],
    ) -> StepResult {
        if !self.config.create_shipment {
            return StepResult::Skipped(StepSkip::ShipmentSyncDisabled);
        }
        if order.status != OrderStatus::Shipped {
            return StepResult::Skipped(StepSkip::NotYetShipped);
        }
        let Some(magento_order_id) = order.magento_order_id else {
            return StepResult::Skipped(StepSkip::MagentoOrderMissing);
        };

        match self.gateway.order_has_shipment(magento_order_id) {
            Ok(true) => return StepResult::Skipped(StepSkip::AlreadyShipped),
            Ok(false) => {}
            Err(err) => return self.fail(order.id, "shipment lookup", err),
        }
        match self.gateway.is_shippable(magento_order_id) {
            Ok(true) => {}
            Ok(false) => return StepResult::Skipped(StepSkip::NotShippable),
            Err(err) => return self.fail(order.id, "shippability check", err),
        }

        let tracking: Vec<Tracking> = items.iter().filter_map(|i| i.tracking.clone()).collect();

        match self.gateway.create_shipment(magento_order_id, &tracking) {
            Ok(shipment_id) => {
                order.shipment_id = Some(shipment_id);
                match self.store.save_order(order) {
                    Ok(()) => StepResult::Done,
                    Err(err) => self.fail(order.id, "shipment save", err),
                }
            }
            Err(err) => self.fail(order.id, "shipment creation", err),
        }
    }

    /// Step 5 — enqueue the channel-facing shipping update. Coalescing at
    /// the outbox makes redundant enqueues from repeated passes harmless.
    pub fn step_propagate_shipping(
        &mut self,
        order: &ExternalOrder,
        items: &[ExternalOrderItem],
    ) -> StepResult {
        if !matches!(
            order.status,
            OrderStatus::Shipped | OrderStatus::PartiallyShipped
        ) {
            return StepResult::Skipped(StepSkip::NotYetShipped);
        }

        let mut by_tracking: Vec<(Tracking, Vec<ItemShipment>)> = Vec::new();
        for item in items {
            let Some(tracking) = &item.tracking else {
                continue;
            };
            let shipment = ItemShipment {
                channel_item_id: item.channel_item_id.clone(),
                qty: item.qty_purchased,
                qty_purchased: item.qty_purchased,
            };
            match by_tracking.iter_mut().find(|(t, _)| t.number == tracking.number) {
                Some((_, list)) => list.push(shipment),
                None => by_tracking.push((tracking.clone(), vec![shipment])),
            }
        }

        if by_tracking.is_empty() {
            return StepResult::Skipped(StepSkip::NoTrackingToPropagate);
        }

        for (tracking, items) in by_tracking {
            let result = self.outbox.enqueue(NewFulfillmentChange {
                order_id: order.id,
                channel: order.channel,
                initiator: Initiator::Automatic,
                params: ChangeParams::UpdateShipping { tracking, items },
            });
            if let Err(err) = result {
                return self.fail(order.id, "shipping update enqueue", err);
            }
        }
        StepResult::Done
    }

    /// Record a step failure in the order's own log stream and abandon the
    /// step for this pass.
    fn fail(&mut self, order_id: OrderId, what: &str, err: StoreError) -> StepResult {
        let message = format!("{what} failed: {err}");
        self.log.append(order_id, LogLevel::Error, &message);
        StepResult::Failed { message }
    }
}

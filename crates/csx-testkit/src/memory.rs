//! In-memory order storage, gateway, outbox, and log doubles.

use std::collections::HashMap;

use csx_fulfillment::{
    coalesce_params, EnqueueResult, FulfillmentAction, FulfillmentChange, FulfillmentOutbox,
    LogLevel, MagentoGateway, NewFulfillmentChange, OrderLog, OrderStore,
};
use csx_orders::{ExternalOrder, ExternalOrderItem, OrderItemStore, StoreError};
use csx_schemas::{OrderId, Tracking};

// ---------------------------------------------------------------------------
// Order + item store
// ---------------------------------------------------------------------------

/// Whole-row order and item storage with save counters.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: HashMap<OrderId, ExternalOrder>,
    items: Vec<ExternalOrderItem>,
    pub order_saves: usize,
    pub item_saves: usize,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_order(mut self, order: ExternalOrder) -> Self {
        self.orders.insert(order.id, order);
        self
    }

    pub fn items(&self) -> &[ExternalOrderItem] {
        &self.items
    }
}

impl OrderStore for InMemoryOrderStore {
    fn load_order(&self, id: OrderId) -> Result<Option<ExternalOrder>, StoreError> {
        Ok(self.orders.get(&id).cloned())
    }

    fn save_order(&mut self, order: &ExternalOrder) -> Result<(), StoreError> {
        self.order_saves += 1;
        self.orders.insert(order.id, order.clone());
        Ok(())
    }
}

impl OrderItemStore for InMemoryOrderStore {
    fn find_items(&self, order_id: OrderId, sku: &str) -> Vec<ExternalOrderItem> {
        let mut rows: Vec<_> = self
            .items
            .iter()
            .filter(|i| i.order_id == order_id && i.sku == sku)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.channel_item_id.cmp(&b.channel_item_id));
        rows
    }

    fn save_item(&mut self, item: &ExternalOrderItem) -> Result<(), StoreError> {
        self.item_saves += 1;
        // Replace any row sharing an id with the incoming record (a
        // canonical rotation moves the primary key).
        self.items.retain(|r| {
            !(r.order_id == item.order_id
                && r.sku == item.sku
                && (r.claims_id(&item.channel_item_id) || item.claims_id(&r.channel_item_id)))
        });
        self.items.push(item.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Magento gateway
// ---------------------------------------------------------------------------

/// Deterministic Magento double: every create succeeds with sequential ids,
/// invoice/shipment presence tracks what was created here.
#[derive(Default)]
pub struct InMemoryGateway {
    next_id: i64,
    pub reservations: usize,
    pub orders_created: usize,
    pub invoices_created: usize,
    pub shipments_created: usize,
    invoiced: HashMap<i64, i64>,
    shipped: HashMap<i64, i64>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MagentoGateway for InMemoryGateway {
    fn reserve_stock(&mut self, _order: &ExternalOrder) -> Result<(), StoreError> {
        self.reservations += 1;
        Ok(())
    }

    fn create_order(&mut self, _order: &ExternalOrder) -> Result<i64, StoreError> {
        self.orders_created += 1;
        self.next_id += 1;
        Ok(self.next_id)
    }

    fn order_has_invoice(&self, magento_order_id: i64) -> Result<bool, StoreError> {
        Ok(self.invoiced.contains_key(&magento_order_id))
    }

    fn is_invoiceable(&self, _magento_order_id: i64) -> Result<bool, StoreError> {
        Ok(true)
    }

    fn create_invoice(&mut self, magento_order_id: i64) -> Result<i64, StoreError> {
        self.invoices_created += 1;
        self.next_id += 1;
        self.invoiced.insert(magento_order_id, self.next_id);
        Ok(self.next_id)
    }

    fn order_has_shipment(&self, magento_order_id: i64) -> Result<bool, StoreError> {
        Ok(self.shipped.contains_key(&magento_order_id))
    }

    fn is_shippable(&self, _magento_order_id: i64) -> Result<bool, StoreError> {
        Ok(true)
    }

    fn create_shipment(
        &mut self,
        magento_order_id: i64,
        _tracking: &[Tracking],
    ) -> Result<i64, StoreError> {
        self.shipments_created += 1;
        self.next_id += 1;
        self.shipped.insert(magento_order_id, self.next_id);
        Ok(self.next_id)
    }
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// In-memory outbox honoring the coalescing invariant.
#[derive(Default)]
pub struct InMemoryOutbox {
    rows: Vec<FulfillmentChange>,
    next_id: i64,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[FulfillmentChange] {
        &self.rows
    }

    pub fn unprocessed_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_unprocessed()).count()
    }
}

impl FulfillmentOutbox for InMemoryOutbox {
    fn enqueue(&mut self, change: NewFulfillmentChange) -> Result<EnqueueResult, StoreError> {
        let action = change.params.action();
        if let Some(row) = self
            .rows
            .iter_mut()
            .find(|r| r.order_id == change.order_id && r.action == action && r.is_unprocessed())
        {
            coalesce_params(&mut row.params, &change.params);
            return Ok(EnqueueResult::Coalesced { id: row.id });
        }
        self.next_id += 1;
        self.rows.push(FulfillmentChange {
            id: self.next_id,
            order_id: change.order_id,
            channel: change.channel,
            action,
            initiator: change.initiator,
            params: change.params,
            processing_attempt_count: 0,
        });
        Ok(EnqueueResult::Inserted { id: self.next_id })
    }

    fn find_unprocessed(
        &self,
        order_id: OrderId,
        action: FulfillmentAction,
    ) -> Result<Option<FulfillmentChange>, StoreError> {
        Ok(self
            .rows
            .iter()
            .find(|r| r.order_id == order_id && r.action == action && r.is_unprocessed())
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Order log
// ---------------------------------------------------------------------------

/// Captures the per-order log stream for assertions.
#[derive(Default)]
pub struct InMemoryOrderLog {
    pub entries: Vec<(OrderId, LogLevel, String)>,
}

impl InMemoryOrderLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages_for(&self, order_id: OrderId) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(id, _, _)| *id == order_id)
            .map(|(_, _, m)| m.as_str())
            .collect()
    }
}

impl OrderLog for InMemoryOrderLog {
    fn append(&mut self, order_id: OrderId, level: LogLevel, message: &str) {
        self.entries.push((order_id, level, message.to_string()));
    }
}

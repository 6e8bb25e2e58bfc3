//! Order line-item merge/dedupe.
//!
//! Channels may report the same logical line item under several ids across
//! polls (split shipments, re-keyed fulfillment records). The reconciler
//! folds every sighting into one canonical [`ExternalOrderItem`] per
//! (order, sku, id-set), never deleting — only merging forward.
//!
//! Canonical-id direction: the incoming id replaces the primary **only**
//! when the lookup matched through the merged set (the channel has moved on
//! from the id we hold as primary). A sighting that matched the primary
//! records the new id into the merged set without rotating. Downstream
//! tracking writes key off the current primary, so this direction matters.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use csx_schemas::{Money, OrderId, Tracking};

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// One canonical line item after merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalOrderItem {
    pub order_id: OrderId,
    /// Current canonical channel id.
    pub channel_item_id: String,
    /// Secondary ids folded into this row. Disjoint from every other row of
    /// the same order+sku, and never contains the current primary.
    pub merged_channel_item_ids: BTreeSet<String>,
    pub sku: String,
    pub qty_purchased: i64,
    pub price: Money,
    pub buyer_cancellation_requested: bool,
    pub tracking: Option<Tracking>,
}

impl ExternalOrderItem {
    /// `true` if `id` is this row's primary or one of its merged ids.
    pub fn claims_id(&self, id: &str) -> bool {
        self.channel_item_id == id || self.merged_channel_item_ids.contains(id)
    }
}

/// One line-item record as reported by a channel poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingOrderItem {
    pub channel_item_id: String,
    pub sku: String,
    pub qty_purchased: i64,
    pub price: Money,
    pub buyer_cancellation_requested: bool,
    /// Channels only report tracking for seller-fulfilled flows; absent
    /// means "no statement", not "clear the stored value".
    pub tracking: Option<Tracking>,
}

// ---------------------------------------------------------------------------
// Store boundary
// ---------------------------------------------------------------------------

/// Whole-object item persistence. No partial-field API: a save writes the
/// entire record or nothing.
pub trait OrderItemStore {
    /// All canonical rows for this order+sku, stable order.
    fn find_items(&self, order_id: OrderId, sku: &str) -> Vec<ExternalOrderItem>;
    fn save_item(&mut self, item: &ExternalOrderItem) -> Result<(), StoreError>;
}

/// Persistence failure surfaced by a store implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "order item store error: {}", self.message)
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Result of one reconciliation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub item: ExternalOrderItem,
    /// The stored cancellation flag **before** this call overwrote it.
    /// One-shot: needed by the caller to detect the false→true transition.
    pub previous_buyer_cancellation_requested: bool,
    /// `false` when the incoming record was identical and nothing was written.
    pub saved: bool,
    /// `true` when no existing row matched and a new one was created.
    pub created: bool,
}

/// Merge one incoming line-item record into the canonical row for its
/// order+sku, creating the row on first sighting.
///
/// The save, when it happens, is all-or-nothing for the whole record.
pub fn reconcile_item(
    store: &mut dyn OrderItemStore,
    order_id: OrderId,
    incoming: &IncomingOrderItem,
) -> Result<ReconcileOutcome, StoreError> {
    let rows = store.find_items(order_id, &incoming.sku);

    // Prefer the row already claiming this id; otherwise any row for the
    // sku is the merge target; otherwise this is a first sighting.
    let matched = rows
        .iter()
        .find(|r| r.claims_id(&incoming.channel_item_id))
        .or_else(|| rows.first())
        .cloned();

    let Some(mut item) = matched else {
        let item = ExternalOrderItem {
            order_id,
            channel_item_id: incoming.channel_item_id.clone(),
            merged_channel_item_ids: BTreeSet::new(),
            sku: incoming.sku.clone(),
            qty_purchased: incoming.qty_purchased,
            price: incoming.price.clone(),
            buyer_cancellation_requested: incoming.buyer_cancellation_requested,
            tracking: incoming.tracking.clone(),
        };
        store.save_item(&item)?;
        return Ok(ReconcileOutcome {
            item,
            previous_buyer_cancellation_requested: false,
            saved: true,
            created: true,
        });
    };

    let previous_cancel = item.buyer_cancellation_requested;
    let mut changed = false;

    if item.channel_item_id != incoming.channel_item_id {
        if item.merged_channel_item_ids.contains(&incoming.channel_item_id) {
            // Matched through the merged set: the incoming id becomes the
            // new primary, the old primary joins the history.
            item.merged_channel_item_ids.remove(&incoming.channel_item_id);
            item.merged_channel_item_ids
                .insert(std::mem::replace(
                    &mut item.channel_item_id,
                    incoming.channel_item_id.clone(),
                ));
        } else {
            // Matched through the primary path (same order+sku, unseen id):
            // remember the new id, keep the primary.
            item.merged_channel_item_ids
                .insert(incoming.channel_item_id.clone());
        }
        changed = true;
    }

    if item.qty_purchased != incoming.qty_purchased {
        item.qty_purchased = incoming.qty_purchased;
        changed = true;
    }
    if item.price != incoming.price {
        item.price = incoming.price.clone();
        changed = true;
    }
    if item.buyer_cancellation_requested != incoming.buyer_cancellation_requested {
        item.buyer_cancellation_requested = incoming.buyer_cancellation_requested;
        changed = true;
    }
    if let Some(tracking) = &incoming.tracking {
        if item.tracking.as_ref() != Some(tracking) {
            item.tracking = Some(tracking.clone());
            changed = true;
        }
    }

    if changed {
        store.save_item(&item)?;
    }

    Ok(ReconcileOutcome {
        item,
        previous_buyer_cancellation_requested: previous_cancel,
        saved: changed,
        created: false,
    })
}

//! Durable fulfillment work-items (outbox).
//!
//! A [`FulfillmentChange`] is a queued intent ("push this shipping update
//! to the channel") that survives process restarts. Enqueue is
//! **coalescing**, not appending: at most one unprocessed change of a given
//! action type exists per order, so redundant enqueues from overlapping
//! cron passes are safe by construction.

use serde::{Deserialize, Serialize};

use csx_orders::StoreError;
use csx_schemas::{Channel, OrderId, Tracking};

// ---------------------------------------------------------------------------
// Change records
// ---------------------------------------------------------------------------

/// Follow-up actions a change can request on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FulfillmentAction {
    UpdateShipping,
    CancelOrder,
}

impl FulfillmentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentAction::UpdateShipping => "UPDATE_SHIPPING",
            FulfillmentAction::CancelOrder => "CANCEL_ORDER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UPDATE_SHIPPING" => Some(FulfillmentAction::UpdateShipping),
            "CANCEL_ORDER" => Some(FulfillmentAction::CancelOrder),
            _ => None,
        }
    }
}

/// Who asked for the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Initiator {
    Automatic,
    Operator,
}

/// Per-item shipped quantity inside an UpdateShipping intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemShipment {
    pub channel_item_id: String,
    pub qty: i64,
    /// Cap for coalesced sums: an intent can never claim more units
    /// shipped than were purchased.
    pub qty_purchased: i64,
}

/// Typed parameters per action kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeParams {
    UpdateShipping {
        tracking: Tracking,
        items: Vec<ItemShipment>,
    },
    CancelOrder,
}

impl ChangeParams {
    pub fn action(&self) -> FulfillmentAction {
        match self {
            ChangeParams::UpdateShipping { .. } => FulfillmentAction::UpdateShipping,
            ChangeParams::CancelOrder => FulfillmentAction::CancelOrder,
        }
    }
}

/// A queued intent as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentChange {
    pub id: i64,
    pub order_id: OrderId,
    pub channel: Channel,
    pub action: FulfillmentAction,
    pub initiator: Initiator,
    pub params: ChangeParams,
    /// Zero means unprocessed; dispatchers bump this on every attempt.
    pub processing_attempt_count: i32,
}

impl FulfillmentChange {
    pub fn is_unprocessed(&self) -> bool {
        self.processing_attempt_count == 0
    }
}

/// A not-yet-stored intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFulfillmentChange {
    pub order_id: OrderId,
    pub channel: Channel,
    pub initiator: Initiator,
    pub params: ChangeParams,
}

/// What an enqueue did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// No unprocessed change of this action existed; a new row was created.
    Inserted { id: i64 },
    /// The intent was merged into the existing unprocessed row.
    Coalesced { id: i64 },
}

// ---------------------------------------------------------------------------
// Outbox contract
// ---------------------------------------------------------------------------

/// Durable change storage. Implementations must uphold the coalescing
/// invariant: `enqueue` merges into an existing unprocessed row of the same
/// (order, action) via [`coalesce_params`] instead of inserting a second
/// one.
pub trait FulfillmentOutbox {
    fn enqueue(&mut self, change: NewFulfillmentChange) -> Result<EnqueueResult, StoreError>;

    fn find_unprocessed(
        &self,
        order_id: OrderId,
        action: FulfillmentAction,
    ) -> Result<Option<FulfillmentChange>, StoreError>;
}

// ---------------------------------------------------------------------------
// Coalescing
// ---------------------------------------------------------------------------

/// Merge `incoming` into `existing` (same order, same action).
///
/// UpdateShipping with an unchanged tracking number sums per-item
/// quantities, capped at each item's `qty_purchased`; items unseen so far
/// are appended. A differing tracking number replaces the stored one (the
/// latest statement wins) while item quantities still merge, so the
/// one-unprocessed-row invariant holds either way. CancelOrder has no
/// parameters to merge.
pub fn coalesce_params(existing: &mut ChangeParams, incoming: &ChangeParams) {
    match (existing, incoming) {
        (
            ChangeParams::UpdateShipping { tracking, items },
            ChangeParams::UpdateShipping {
                tracking: new_tracking,
                items: new_items,
            },
        ) => {
            let same_tracking = tracking.number == new_tracking.number;
            if !same_tracking {
                *tracking = new_tracking.clone();
            }
            for incoming_item in new_items {
                match items
                    .iter_mut()
                    .find(|i| i.channel_item_id == incoming_item.channel_item_id)
                {
                    Some(stored) if same_tracking => {
                        stored.qty =
                            (stored.qty + incoming_item.qty).min(stored.qty_purchased);
                    }
                    Some(stored) => {
                        stored.qty = incoming_item.qty.min(stored.qty_purchased);
                    }
                    None => {
                        let mut item = incoming_item.clone();
                        item.qty = item.qty.min(item.qty_purchased);
                        items.push(item);
                    }
                }
            }
        }
        (ChangeParams::CancelOrder, ChangeParams::CancelOrder) => {}
        // Mismatched action kinds never reach here; implementations key the
        // lookup by action.
        _ => {}
    }
}

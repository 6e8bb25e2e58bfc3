//! The canonical marketplace order aggregate.
//!
//! # Status machine
//!
//! ```text
//!   Pending ──► Unshipped ──► PartiallyShipped ──► Shipped (term.)
//!      │            │                │
//!      │            ▼                │
//!      │      Unfulfillable          │
//!      │            │                │
//!      └────────────┴────────────────┴──► Canceled (term.)
//! ```
//!
//! `Canceled` is reachable from every non-terminal state. Re-asserting the
//! current status is an idempotent no-op (channels repeat statuses across
//! polls). `Other` covers upstream states this engine does not interpret;
//! it neither blocks progress nor counts as terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use csx_schemas::{Channel, Money, OrderId, OrderStatus, StoreId};

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// Reservation lifecycle for the order's stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationState {
    NotReserved,
    Placed,
    Released,
}

/// Buyer identity as reported by the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerInfo {
    pub name: String,
    pub email: Option<String>,
}

/// Canonical representation of a marketplace order. Persisted once created;
/// subsequently only amended, never deleted except on explicit removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalOrder {
    pub id: OrderId,
    pub channel: Channel,
    pub channel_order_id: String,
    pub store_id: StoreId,
    pub status: OrderStatus,
    pub purchased_at: DateTime<Utc>,

    pub subtotal: Money,
    pub shipping_price: Money,
    pub product_tax: Money,
    pub shipping_tax: Money,
    pub discount: Money,

    pub buyer: BuyerInfo,

    /// The channel fulfills this order from its own warehouse (e.g. AFN);
    /// local stock is not reserved for it unless sync is forced on.
    pub is_channel_fulfilled: bool,

    /// Set once the Magento-side order exists. The parallel-process guard
    /// re-reads this field before creating one.
    pub magento_order_id: Option<i64>,
    pub invoice_id: Option<i64>,
    pub shipment_id: Option<i64>,

    pub reservation: ReservationState,
}

impl ExternalOrder {
    /// Apply a normalized status transition.
    ///
    /// Same-status re-assertions succeed without change. Illegal jumps
    /// (e.g. `Shipped → Unshipped`) return [`StatusTransitionError`] and
    /// leave the order untouched.
    pub fn apply_status(&mut self, next: OrderStatus) -> Result<(), StatusTransitionError> {
        if self.status == next {
            return Ok(());
        }
        if transition_allowed(self.status, next) {
            self.status = next;
            Ok(())
        } else {
            Err(StatusTransitionError {
                from: self.status,
                to: next,
            })
        }
    }
}

fn transition_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    // Unknown upstream states never wedge an order.
    if from == Other || to == Other {
        return !from.is_terminal();
    }

    match (from, to) {
        (_, Canceled) => !from.is_terminal(),
        (Pending, Unshipped) | (Pending, PartiallyShipped) => true,
        (Unshipped, PartiallyShipped) | (Unshipped, Shipped) | (Unshipped, Unfulfillable) => true,
        (PartiallyShipped, Shipped) => true,
        _ => false,
    }
}

/// An illegal order status jump. Callers log this against the order and
/// keep the stored status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl std::fmt::Display for StatusTransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "illegal order status transition: {} -> {}",
            self.from.as_str(),
            self.to.as_str()
        )
    }
}

impl std::error::Error for StatusTransitionError {}

// ---------------------------------------------------------------------------
// Raw status normalization
// ---------------------------------------------------------------------------

/// Normalize a channel's raw order status string.
///
/// Unrecognized strings map to [`OrderStatus::Other`] — never an error, the
/// reconciliation pipeline carries them through untouched.
pub fn normalize_status(channel: Channel, raw: &str) -> OrderStatus {
    match channel {
        Channel::Amazon => match raw {
            "Pending" | "PendingAvailability" => OrderStatus::Pending,
            "Unshipped" => OrderStatus::Unshipped,
            "PartiallyShipped" => OrderStatus::PartiallyShipped,
            "Shipped" | "InvoiceUnconfirmed" => OrderStatus::Shipped,
            "Unfulfillable" => OrderStatus::Unfulfillable,
            "Canceled" => OrderStatus::Canceled,
            _ => OrderStatus::Other,
        },
        Channel::Ebay => match raw {
            "Active" => OrderStatus::Pending,
            "Completed" => OrderStatus::Unshipped,
            "Shipped" => OrderStatus::Shipped,
            "Cancelled" | "CancelPending" => OrderStatus::Canceled,
            _ => OrderStatus::Other,
        },
        Channel::Walmart => match raw {
            "Created" => OrderStatus::Pending,
            "Acknowledged" => OrderStatus::Unshipped,
            "PartiallyShipped" => OrderStatus::PartiallyShipped,
            "Shipped" | "Delivered" => OrderStatus::Shipped,
            "Cancelled" => OrderStatus::Canceled,
            _ => OrderStatus::Other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus) -> ExternalOrder {
        ExternalOrder {
            id: 1,
            channel: Channel::Amazon,
            channel_order_id: "111-222".to_string(),
            store_id: 1,
            status,
            purchased_at: Utc::now(),
            subtotal: Money::new(25_000_000, "USD"),
            shipping_price: Money::zero("USD"),
            product_tax: Money::zero("USD"),
            shipping_tax: Money::zero("USD"),
            discount: Money::zero("USD"),
            buyer: BuyerInfo {
                name: "Jo Buyer".to_string(),
                email: None,
            },
            is_channel_fulfilled: false,
            magento_order_id: None,
            invoice_id: None,
            shipment_id: None,
            reservation: ReservationState::NotReserved,
        }
    }

    #[test]
    fn happy_path_progression() {
        let mut o = order(OrderStatus::Pending);
        o.apply_status(OrderStatus::Unshipped).unwrap();
        o.apply_status(OrderStatus::PartiallyShipped).unwrap();
        o.apply_status(OrderStatus::Shipped).unwrap();
        assert_eq!(o.status, OrderStatus::Shipped);
        assert!(o.status.is_terminal());
    }

    #[test]
    fn reasserting_current_status_is_noop() {
        let mut o = order(OrderStatus::Unshipped);
        o.apply_status(OrderStatus::Unshipped).unwrap();
        assert_eq!(o.status, OrderStatus::Unshipped);
    }

    #[test]
    fn cancel_from_any_non_terminal() {
        for st in [
            OrderStatus::Pending,
            OrderStatus::Unshipped,
            OrderStatus::PartiallyShipped,
            OrderStatus::Unfulfillable,
        ] {
            let mut o = order(st);
            o.apply_status(OrderStatus::Canceled).unwrap();
            assert_eq!(o.status, OrderStatus::Canceled, "from {st:?}");
        }
    }

    #[test]
    fn shipped_is_terminal() {
        let mut o = order(OrderStatus::Shipped);
        let err = o.apply_status(OrderStatus::Canceled).unwrap_err();
        assert_eq!(err.from, OrderStatus::Shipped);
        assert_eq!(o.status, OrderStatus::Shipped, "state must not change");
    }

    #[test]
    fn unfulfillable_only_from_unshipped() {
        let mut o = order(OrderStatus::Pending);
        assert!(o.apply_status(OrderStatus::Unfulfillable).is_err());

        let mut o = order(OrderStatus::Unshipped);
        assert!(o.apply_status(OrderStatus::Unfulfillable).is_ok());
    }

    #[test]
    fn amazon_statuses_normalize() {
        assert_eq!(
            normalize_status(Channel::Amazon, "Unshipped"),
            OrderStatus::Unshipped
        );
        assert_eq!(
            normalize_status(Channel::Amazon, "PendingAvailability"),
            OrderStatus::Pending
        );
        assert_eq!(
            normalize_status(Channel::Amazon, "SomethingNew"),
            OrderStatus::Other
        );
    }

    #[test]
    fn walmart_and_ebay_statuses_normalize() {
        assert_eq!(
            normalize_status(Channel::Walmart, "Acknowledged"),
            OrderStatus::Unshipped
        );
        assert_eq!(
            normalize_status(Channel::Walmart, "Delivered"),
            OrderStatus::Shipped
        );
        assert_eq!(
            normalize_status(Channel::Ebay, "Completed"),
            OrderStatus::Unshipped
        );
        assert_eq!(
            normalize_status(Channel::Ebay, "Cancelled"),
            OrderStatus::Canceled
        );
    }
}

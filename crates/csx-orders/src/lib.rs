//! Marketplace order aggregates and reconciliation.
//!
//! - [`order`]: the canonical [`ExternalOrder`] aggregate, the status
//!   transition machine, and per-channel raw-status normalization.
//! - [`item`]: [`ExternalOrderItem`] and the merge/dedupe reconciler that
//!   folds repeated channel line-item records into one canonical row.

pub mod item;
pub mod order;

pub use item::{
    reconcile_item, ExternalOrderItem, IncomingOrderItem, OrderItemStore, ReconcileOutcome,
    StoreError,
};
pub use order::{
    normalize_status, BuyerInfo, ExternalOrder, ReservationState, StatusTransitionError,
};

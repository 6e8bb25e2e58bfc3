//! Change classification: which trigger families does a candidate match?
//!
//! The four predicates are evaluated **independently** and combined with OR.
//! A candidate satisfying both Revise and Stop appears under both; this
//! engine surfaces every matching trigger and the consuming dispatcher owns
//! prioritization. Do not collapse this into an if/else chain.

use csx_policy::PolicySnapshot;
use csx_schemas::{ActionKind, ListingCandidate, ListingStatus, StockSnapshot};

/// List: not yet on the channel, calculated quantity at or above the list
/// threshold, and the optional enabled/in-stock gates hold.
pub fn should_list(
    candidate: &ListingCandidate,
    stock: &StockSnapshot,
    policy: &PolicySnapshot,
    calculated_qty: i64,
) -> bool {
    candidate.status == ListingStatus::NotListed
        && calculated_qty >= policy.list_qty_gte
        && (!policy.list_only_enabled_products || stock.product_enabled.is_enabled())
        && (!policy.list_only_in_stock_products || stock.is_in_stock)
}

/// Revise: listed, and the calculated quantity has drifted from the online
/// quantity inside the revise-threshold window.
pub fn should_revise(
    candidate: &ListingCandidate,
    policy: &PolicySnapshot,
    calculated_qty: i64,
) -> bool {
    if candidate.status != ListingStatus::Listed {
        return false;
    }
    let online = candidate.online_qty;
    (calculated_qty > online && online < policy.revise_threshold)
        || (calculated_qty != online && calculated_qty < policy.revise_threshold)
}

/// Relist: previously taken down (stopped/blocked/inactive), stock has
/// recovered past the relist threshold, and the optional gates hold.
pub fn should_relist(
    candidate: &ListingCandidate,
    stock: &StockSnapshot,
    policy: &PolicySnapshot,
) -> bool {
    candidate.status.is_relistable()
        && stock.qty_milli >= policy.relist_qty_gte_milli
        && (!policy.relist_when_in_stock || stock.is_in_stock)
        && (!policy.relist_when_enabled || stock.product_enabled.is_enabled())
}

/// Stop: listed, stock at or below the stop threshold, and the optional
/// out-of-stock/disabled gates hold.
///
/// Note this tests raw stock quantity, not the calculated quantity: a
/// FixedValue policy can advertise 10 while the shelf is empty, and the stop
/// trigger still fires.
pub fn should_stop(
    candidate: &ListingCandidate,
    stock: &StockSnapshot,
    policy: &PolicySnapshot,
) -> bool {
    candidate.status == ListingStatus::Listed
        && stock.qty_milli <= policy.stop_qty_lte_milli
        && (!policy.stop_when_out_of_stock || !stock.is_in_stock)
        && (!policy.stop_when_disabled || stock.product_enabled.is_disabled())
}

/// Evaluate all four predicates and return every match, in the fixed order
/// List, Revise, Relist, Stop. Empty means no action is warranted.
pub fn classify(
    candidate: &ListingCandidate,
    stock: &StockSnapshot,
    policy: &PolicySnapshot,
    calculated_qty: i64,
) -> Vec<ActionKind> {
    let mut matches = Vec::new();
    if should_list(candidate, stock, policy, calculated_qty) {
        matches.push(ActionKind::List);
    }
    if should_revise(candidate, policy, calculated_qty) {
        matches.push(ActionKind::Revise);
    }
    if should_relist(candidate, stock, policy) {
        matches.push(ActionKind::Relist);
    }
    if should_stop(candidate, stock, policy) {
        matches.push(ActionKind::Stop);
    }
    matches
}

//! Scenario: exclusion gates keep busy/ineligible candidates out of a pass.
//!
//! # Invariant under test
//! A candidate holding a processing lock, a pending scheduled action, a
//! pending instruction, the duplicate-action flag, a grouped/bundle product
//! kind, or a fresh blocking error is never evaluated.

use chrono::{Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};

use csx_candidates::{
    CandidateQueryEngine, CandidateSource, GateSource, PassConfig, StockSource,
};
use csx_policy::{AttributeSource, PolicySource, QtyMode, SellingPolicy, SyncPolicy};
use csx_schemas::{
    Channel, ChannelDetails, ListingCandidate, ListingExtras, ListingProductId, ListingStatus,
    ProductEnabled, ProductId, ProductKind, StockSnapshot,
};

// ---------------------------------------------------------------------------
// In-file fixtures
// ---------------------------------------------------------------------------

struct FixedCandidates(Vec<ListingCandidate>);

impl CandidateSource for FixedCandidates {
    fn candidates(&self, _channel: Channel) -> Vec<ListingCandidate> {
        self.0.clone()
    }
}

struct FixedStock(HashMap<ProductId, StockSnapshot>);

impl StockSource for FixedStock {
    fn stock_snapshot(&self, product_id: ProductId) -> Option<StockSnapshot> {
        self.0.get(&product_id).copied()
    }
}

#[derive(Default)]
struct Gates {
    locked: HashSet<ListingProductId>,
    scheduled: HashSet<ListingProductId>,
    instructed: HashSet<ListingProductId>,
}

impl GateSource for Gates {
    fn is_locked(&self, id: ListingProductId) -> bool {
        self.locked.contains(&id)
    }
    fn has_pending_scheduled_action(&self, id: ListingProductId) -> bool {
        self.scheduled.contains(&id)
    }
    fn has_pending_instruction(&self, id: ListingProductId) -> bool {
        self.instructed.contains(&id)
    }
}

struct OnePolicyPair;

impl PolicySource for OnePolicyPair {
    fn selling_policy(&self, id: i64) -> Option<SellingPolicy> {
        Some(SellingPolicy {
            id,
            qty_mode: QtyMode::PercentageOfStock,
            percentage: 100,
            custom_value_milli: 0,
            custom_attribute: None,
            custom_attribute_default_milli: 0,
            conditional_quantity: false,
            min_qty_milli: 0,
            max_qty_milli: 0,
        })
    }
    fn sync_policy(&self, id: i64) -> Option<SyncPolicy> {
        Some(SyncPolicy {
            id,
            list_qty_gte: 1,
            list_only_enabled_products: false,
            list_only_in_stock_products: false,
            revise_threshold: 10,
            relist_qty_gte_milli: 1_000,
            relist_when_in_stock: false,
            relist_when_enabled: false,
            stop_qty_lte_milli: 0,
            stop_when_out_of_stock: false,
            stop_when_disabled: false,
        })
    }
}

struct NoAttributes;

impl AttributeSource for NoAttributes {
    fn raw_attribute(&self, _product_id: ProductId, _code: &str) -> Option<String> {
        None
    }
}

fn candidate(id: ListingProductId, kind: ProductKind) -> ListingCandidate {
    ListingCandidate {
        listing_product_id: id,
        product_id: id + 100,
        store_id: 1,
        status: ListingStatus::NotListed,
        is_variation: false,
        product_kind: kind,
        online_qty: 0,
        selling_policy_id: 1,
        sync_policy_id: 1,
        details: ChannelDetails::Walmart {
            wpid: None,
            gtin: None,
        },
        extras: ListingExtras::default(),
        last_blocking_error_at: None,
    }
}

fn in_stock(qty_milli: i64) -> StockSnapshot {
    StockSnapshot {
        qty_milli,
        is_in_stock: true,
        product_enabled: ProductEnabled::Enabled,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn busy_flags_exclude_candidates() {
    let candidates = FixedCandidates(vec![
        candidate(1, ProductKind::Simple),
        candidate(2, ProductKind::Simple),
        candidate(3, ProductKind::Simple),
        candidate(4, ProductKind::Simple),
    ]);
    let gates = Gates {
        locked: HashSet::from([1]),
        scheduled: HashSet::from([2]),
        instructed: HashSet::from([3]),
    };
    let stock = FixedStock(HashMap::new());
    let engine = CandidateQueryEngine::new(
        &candidates,
        &stock,
        &gates,
        &OnePolicyPair,
        &NoAttributes,
        PassConfig::default(),
    );

    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let fetched = engine.fetch(Channel::Walmart, now);
    let ids: Vec<_> = fetched.iter().map(|c| c.listing_product_id).collect();
    assert_eq!(ids, vec![4], "only the unflagged candidate survives");
}

#[test]
fn grouped_and_bundle_kinds_are_never_eligible() {
    let candidates = FixedCandidates(vec![
        candidate(1, ProductKind::Grouped),
        candidate(2, ProductKind::Bundle),
        candidate(3, ProductKind::Configurable),
    ]);
    let stock = FixedStock(HashMap::new());
    let gates = Gates::default();
    let engine = CandidateQueryEngine::new(
        &candidates,
        &stock,
        &gates,
        &OnePolicyPair,
        &NoAttributes,
        PassConfig::default(),
    );

    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let ids: Vec<_> = engine
        .fetch(Channel::Walmart, now)
        .iter()
        .map(|c| c.listing_product_id)
        .collect();
    assert_eq!(ids, vec![3]);
}

#[test]
fn duplicate_action_flag_excludes() {
    let mut dup = candidate(1, ProductKind::Simple);
    dup.extras.item_duplicate_action_required = true;
    let candidates = FixedCandidates(vec![dup, candidate(2, ProductKind::Simple)]);
    let stock = FixedStock(HashMap::new());
    let gates = Gates::default();
    let engine = CandidateQueryEngine::new(
        &candidates,
        &stock,
        &gates,
        &OnePolicyPair,
        &NoAttributes,
        PassConfig::default(),
    );

    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let ids: Vec<_> = engine
        .fetch(Channel::Walmart, now)
        .iter()
        .map(|c| c.listing_product_id)
        .collect();
    assert_eq!(ids, vec![2]);
}

#[test]
fn blocking_error_cooldown_expires() {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    let mut fresh_error = candidate(1, ProductKind::Simple);
    fresh_error.last_blocking_error_at = Some(now - Duration::seconds(60));

    let mut stale_error = candidate(2, ProductKind::Simple);
    stale_error.last_blocking_error_at = Some(now - Duration::seconds(301));

    let candidates = FixedCandidates(vec![fresh_error, stale_error]);
    let stock = FixedStock(HashMap::new());
    let gates = Gates::default();
    let engine = CandidateQueryEngine::new(
        &candidates,
        &stock,
        &gates,
        &OnePolicyPair,
        &NoAttributes,
        PassConfig {
            error_retry_cooldown_secs: 300,
        },
    );

    let ids: Vec<_> = engine
        .fetch(Channel::Walmart, now)
        .iter()
        .map(|c| c.listing_product_id)
        .collect();
    assert_eq!(ids, vec![2], "only the expired-cooldown candidate returns");
}

#[test]
fn missing_stock_row_is_recorded_as_skip() {
    let candidates = FixedCandidates(vec![candidate(1, ProductKind::Simple)]);
    // No stock rows at all.
    let stock = FixedStock(HashMap::new());
    let gates = Gates::default();
    let engine = CandidateQueryEngine::new(
        &candidates,
        &stock,
        &gates,
        &OnePolicyPair,
        &NoAttributes,
        PassConfig::default(),
    );

    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let report = engine.run_pass(Channel::Walmart, now);
    assert!(report.actions.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.evaluated, 0);
}

#[test]
fn stocked_candidate_is_evaluated() {
    let candidates = FixedCandidates(vec![candidate(1, ProductKind::Simple)]);
    let stock = FixedStock(HashMap::from([(101, in_stock(30_000))]));
    let gates = Gates::default();
    let engine = CandidateQueryEngine::new(
        &candidates,
        &stock,
        &gates,
        &OnePolicyPair,
        &NoAttributes,
        PassConfig::default(),
    );

    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let report = engine.run_pass(Channel::Walmart, now);
    assert_eq!(report.evaluated, 1);
    assert!(!report.actions.is_empty());
}

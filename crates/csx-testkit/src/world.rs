//! A complete in-memory listing world: candidates, stock, gates, policies
//! and attributes behind the engine's source traits, with builder-style
//! seeding for scenario tests.

use std::collections::{HashMap, HashSet};

use csx_candidates::{CandidateSource, GateSource, StockSource};
use csx_policy::{AttributeSource, PolicySource, SellingPolicy, SyncPolicy};
use csx_schemas::{
    Channel, ListingCandidate, ListingProductId, ProductId, StockSnapshot,
};

/// Everything one evaluation pass reads, held in memory.
#[derive(Default)]
pub struct ListingWorld {
    pub candidates: Vec<ListingCandidate>,
    pub stock: HashMap<ProductId, StockSnapshot>,
    pub selling_policies: HashMap<i64, SellingPolicy>,
    pub sync_policies: HashMap<i64, SyncPolicy>,
    pub attributes: HashMap<(ProductId, String), String>,
    pub locked: HashSet<ListingProductId>,
    pub scheduled: HashSet<ListingProductId>,
    pub instructed: HashSet<ListingProductId>,
}

impl ListingWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candidate(mut self, candidate: ListingCandidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    pub fn with_stock(mut self, product_id: ProductId, snapshot: StockSnapshot) -> Self {
        self.stock.insert(product_id, snapshot);
        self
    }

    pub fn with_selling_policy(mut self, policy: SellingPolicy) -> Self {
        self.selling_policies.insert(policy.id, policy);
        self
    }

    pub fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policies.insert(policy.id, policy);
        self
    }

    pub fn with_attribute(
        mut self,
        product_id: ProductId,
        code: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.insert((product_id, code.into()), value.into());
        self
    }

    pub fn with_lock(mut self, id: ListingProductId) -> Self {
        self.locked.insert(id);
        self
    }
}

impl CandidateSource for ListingWorld {
    fn candidates(&self, _channel: Channel) -> Vec<ListingCandidate> {
        self.candidates.clone()
    }
}

impl StockSource for ListingWorld {
    fn stock_snapshot(&self, product_id: ProductId) -> Option<StockSnapshot> {
        self.stock.get(&product_id).copied()
    }
}

impl GateSource for ListingWorld {
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

impl PolicySource for ListingWorld {
    fn selling_policy(&self, id: i64) -> Option<SellingPolicy> {
        self.selling_policies.get(&id).cloned()
    }
    fn sync_policy(&self, id: i64) -> Option<SyncPolicy> {
        self.sync_policies.get(&id).cloned()
    }
}

impl AttributeSource for ListingWorld {
    fn raw_attribute(&self, product_id: ProductId, code: &str) -> Option<String> {
        self.attributes.get(&(product_id, code.to_string())).cloned()
    }
}

//! Candidate selection and pass evaluation.
//!
//! [`CandidateQueryEngine`] pulls the eligible listing candidates for one
//! channel, applies the exclusion gates (locks, scheduled actions,
//! instructions, duplicate flag, error cooldown, grouped/bundle kinds), and
//! [`run_pass`][CandidateQueryEngine::run_pass] evaluates each survivor into
//! zero-or-more [`ChangeAction`] rows from a single consistent read.
//!
//! The engine gives a best-effort-current snapshot, not a transactional
//! guarantee: a concurrent writer may invalidate a decision between
//! evaluation and dispatch, and the dispatcher is expected to re-validate
//! before committing. No writes happen here, so an interrupted pass leaves
//! nothing inconsistent behind.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use csx_inventory::{calculate, classify};
use csx_policy::{resolve, AttributeSource, PolicySource};
use csx_schemas::{
    ActionKind, Channel, ChangeAction, ListingCandidate, ListingProductId, ProductId,
    StockSnapshot,
};

// ---------------------------------------------------------------------------
// Source traits
// ---------------------------------------------------------------------------

/// Produces the raw candidate rows for a channel. Each call re-executes the
/// underlying query; the returned set is finite and owned by the caller.
pub trait CandidateSource: Send + Sync {
    fn candidates(&self, channel: Channel) -> Vec<ListingCandidate>;
}

/// Read-only view of catalog stock.
pub trait StockSource: Send + Sync {
    fn stock_snapshot(&self, product_id: ProductId) -> Option<StockSnapshot>;
}

/// Opaque busy flags maintained by other processes. A candidate holding any
/// of these is never evaluated or acted on.
pub trait GateSource: Send + Sync {
    fn is_locked(&self, id: ListingProductId) -> bool;
    fn has_pending_scheduled_action(&self, id: ListingProductId) -> bool;
    fn has_pending_instruction(&self, id: ListingProductId) -> bool;
}

// ---------------------------------------------------------------------------
// Pass configuration & report
// ---------------------------------------------------------------------------

/// Knobs for one evaluation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassConfig {
    /// Seconds a candidate stays excluded after its last blocking error.
    pub error_retry_cooldown_secs: i64,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            error_retry_cooldown_secs: 300,
        }
    }
}

/// Why a candidate was left out of a pass's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    PolicyMissing { detail: String },
    StockRowMissing,
}

/// One excluded candidate with its reason, for the pass report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCandidate {
    pub listing_product_id: ListingProductId,
    pub reason: SkipReason,
}

/// Output of one evaluation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PassReport {
    pub actions: Vec<ChangeAction>,
    pub skipped: Vec<SkippedCandidate>,
    /// Candidates evaluated after exclusion gates.
    pub evaluated: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Aggregates the candidate, stock, gate and policy sources for one pass.
/// Collaborators are injected; the engine holds no state of its own.
pub struct CandidateQueryEngine<'a> {
    candidates: &'a dyn CandidateSource,
    stock: &'a dyn StockSource,
    gates: &'a dyn GateSource,
    policies: &'a dyn PolicySource,
    attributes: &'a dyn AttributeSource,
    config: PassConfig,
}

impl<'a> CandidateQueryEngine<'a> {
    pub fn new(
        candidates: &'a dyn CandidateSource,
        stock: &'a dyn StockSource,
        gates: &'a dyn GateSource,
        policies: &'a dyn PolicySource,
        attributes: &'a dyn AttributeSource,
        config: PassConfig,
    ) -> Self {
        Self {
            candidates,
            stock,
            gates,
            policies,
            attributes,
            config,
        }
    }

    /// Fetch the candidates for `channel` that survive every exclusion gate.
    ///
    /// `now` is supplied by the caller (cron tick time) so cooldown checks
    /// are replayable in tests.
    pub fn fetch(&self, channel: Channel, now: DateTime<Utc>) -> Vec<ListingCandidate> {
        let cooldown = Duration::seconds(self.config.error_retry_cooldown_secs);

        self.candidates
            .candidates(channel)
            .into_iter()
            .filter(|c| {
                if !c.product_kind.supports_auto_actions() {
                    return false;
                }
                if c.extras.item_duplicate_action_required {
                    return false;
                }
                if let Some(errored_at) = c.last_blocking_error_at {
                    if errored_at + cooldown > now {
                        debug!(
                            listing_product_id = c.listing_product_id,
                            "candidate in error cooldown, excluded"
                        );
                        return false;
                    }
                }
                let id = c.listing_product_id;
                !(self.gates.is_locked(id)
                    || self.gates.has_pending_scheduled_action(id)
                    || self.gates.has_pending_instruction(id))
            })
            .collect()
    }

    /// Run one full evaluation pass for `channel`.
    ///
    /// Per candidate: resolve policies once, read stock once, calculate,
    /// classify — all from the same snapshot. Skip-worthy failures are
    /// logged and recorded; they never abort the pass. A candidate matching
    /// no trigger yields a single `NoAction` row so every evaluated
    /// candidate appears exactly once-or-more in the output.
    pub fn run_pass(&self, channel: Channel, now: DateTime<Utc>) -> PassReport {
        let mut report = PassReport::default();

        for candidate in self.fetch(channel, now) {
            let id = candidate.listing_product_id;

            let policy = match resolve(&candidate, self.policies, self.attributes) {
                Ok(p) => p,
                Err(err) => {
                    warn!(listing_product_id = id, %err, "candidate skipped");
                    report.skipped.push(SkippedCandidate {
                        listing_product_id: id,
                        reason: SkipReason::PolicyMissing {
                            detail: err.to_string(),
                        },
                    });
                    continue;
                }
            };

            let stock = match self.stock.stock_snapshot(candidate.product_id) {
                Some(s) => s,
                None => {
                    info!(
                        listing_product_id = id,
                        product_id = candidate.product_id,
                        "no stock row, candidate skipped"
                    );
                    report.skipped.push(SkippedCandidate {
                        listing_product_id: id,
                        reason: SkipReason::StockRowMissing,
                    });
                    continue;
                }
            };

            report.evaluated += 1;

            let calculated_qty = calculate(Some(&stock), &policy);
            let matched = classify(&candidate, &stock, &policy, calculated_qty);

            if matched.is_empty() {
                report.actions.push(ChangeAction {
                    candidate_id: id,
                    action_kind: ActionKind::NoAction,
                    calculated_qty,
                });
            } else {
                for action_kind in matched {
                    report.actions.push(ChangeAction {
                        candidate_id: id,
                        action_kind,
                        calculated_qty,
                    });
                }
            }
        }

        info!(
            channel = channel.as_str(),
            evaluated = report.evaluated,
            actions = report.actions.len(),
            skipped = report.skipped.len(),
            "evaluation pass complete"
        );

        report
    }
}

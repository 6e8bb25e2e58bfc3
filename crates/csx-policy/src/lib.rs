//! Policy resolution for listing candidates.
//!
//! A candidate references one selling-format policy (how to derive the
//! advertised quantity) and one synchronization policy (when to act on the
//! channel). [`resolve`] flattens both into a single immutable
//! [`PolicySnapshot`] per candidate, resolved once per evaluation pass and
//! reused for calculation and classification.
//!
//! Resolution is a pure read: no IO of its own, collaborators are injected
//! as source traits.

use serde::{Deserialize, Serialize};

use csx_schemas::{ListingCandidate, ProductId, SellingPolicyId, SyncPolicyId};

pub mod coerce;

pub use coerce::coerce_qty_milli;

// ---------------------------------------------------------------------------
// Policy records
// ---------------------------------------------------------------------------

/// How the advertised quantity is derived from stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QtyMode {
    /// Advertise a fixed configured value, ignoring stock.
    FixedValue,
    /// Advertise a percentage of the current stock quantity.
    PercentageOfStock,
    /// Advertise a percentage of a product attribute's numeric value.
    PercentageOfCustomAttribute,
}

/// Selling-format policy row as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellingPolicy {
    pub id: SellingPolicyId,
    pub qty_mode: QtyMode,
    /// Whole percent applied in the percentage modes.
    pub percentage: i64,
    /// Fixed quantity for [`QtyMode::FixedValue`], milli-units.
    pub custom_value_milli: i64,
    /// Attribute code read in [`QtyMode::PercentageOfCustomAttribute`].
    pub custom_attribute: Option<String>,
    /// Fallback when the attribute is absent or unparseable, milli-units.
    pub custom_attribute_default_milli: i64,
    /// Enables the min/max clamp below.
    pub conditional_quantity: bool,
    /// Milli-units. Only meaningful when `conditional_quantity` is set.
    pub min_qty_milli: i64,
    /// Milli-units. Only meaningful when `conditional_quantity` is set.
    pub max_qty_milli: i64,
}

/// Synchronization policy row as stored: trigger flags and comparison values
/// for the four action families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPolicy {
    pub id: SyncPolicyId,

    /// List trigger: minimum calculated quantity, whole units.
    pub list_qty_gte: i64,
    pub list_only_enabled_products: bool,
    pub list_only_in_stock_products: bool,

    /// Revise trigger: quantity gap threshold, whole units.
    pub revise_threshold: i64,

    /// Relist trigger: minimum stock quantity, milli-units.
    pub relist_qty_gte_milli: i64,
    pub relist_when_in_stock: bool,
    pub relist_when_enabled: bool,

    /// Stop trigger: stock quantity at or below this stops the listing,
    /// milli-units.
    pub stop_qty_lte_milli: i64,
    pub stop_when_out_of_stock: bool,
    pub stop_when_disabled: bool,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Flat, per-candidate resolution of both policies. Immutable for the
/// duration of one evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub qty_mode: QtyMode,
    pub percentage: i64,
    pub custom_value_milli: i64,
    /// Attribute value resolved for this candidate's product (or the
    /// configured default), milli-units.
    pub custom_attribute_value_milli: i64,
    pub conditional_quantity: bool,
    pub min_qty_milli: i64,
    /// `None` means unbounded. A stored `min > max` violation resolves to
    /// unbounded rather than failing the pass.
    pub max_qty_milli: Option<i64>,

    pub list_qty_gte: i64,
    pub list_only_enabled_products: bool,
    pub list_only_in_stock_products: bool,

    pub revise_threshold: i64,

    pub relist_qty_gte_milli: i64,
    pub relist_when_in_stock: bool,
    pub relist_when_enabled: bool,

    pub stop_qty_lte_milli: i64,
    pub stop_when_out_of_stock: bool,
    pub stop_when_disabled: bool,
}

// ---------------------------------------------------------------------------
// Source traits
// ---------------------------------------------------------------------------

/// Read-only policy storage, keyed by opaque integer ids.
pub trait PolicySource: Send + Sync {
    fn selling_policy(&self, id: SellingPolicyId) -> Option<SellingPolicy>;
    fn sync_policy(&self, id: SyncPolicyId) -> Option<SyncPolicy>;
}

/// Read-only product attribute storage. Values arrive as raw strings.
pub trait AttributeSource: Send + Sync {
    fn raw_attribute(&self, product_id: ProductId, code: &str) -> Option<String>;
}

// ---------------------------------------------------------------------------
// Resolution error
// ---------------------------------------------------------------------------

/// A dangling policy reference. Skip-worthy: the candidate is excluded from
/// the current pass, the pass itself continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyResolutionError {
    SellingPolicyMissing { id: SellingPolicyId },
    SyncPolicyMissing { id: SyncPolicyId },
}

impl std::fmt::Display for PolicyResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyResolutionError::SellingPolicyMissing { id } => {
                write!(f, "selling policy {id} does not exist")
            }
            PolicyResolutionError::SyncPolicyMissing { id } => {
                write!(f, "synchronization policy {id} does not exist")
            }
        }
    }
}

impl std::error::Error for PolicyResolutionError {}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolve both policy references of `candidate` into a flat snapshot.
///
/// The custom attribute (when the mode needs one) is read and coerced here,
/// once, so classification later in the pass sees a stable value. Coercion
/// failure falls back to the policy's configured default — it is never an
/// error.
pub fn resolve(
    candidate: &ListingCandidate,
    policies: &dyn PolicySource,
    attributes: &dyn AttributeSource,
) -> Result<PolicySnapshot, PolicyResolutionError> {
    let selling = policies.selling_policy(candidate.selling_policy_id).ok_or(
        PolicyResolutionError::SellingPolicyMissing {
            id: candidate.selling_policy_id,
        },
    )?;
    let sync = policies
        .sync_policy(candidate.sync_policy_id)
        .ok_or(PolicyResolutionError::SyncPolicyMissing {
            id: candidate.sync_policy_id,
        })?;

    let custom_attribute_value_milli = match (&selling.qty_mode, &selling.custom_attribute) {
        (QtyMode::PercentageOfCustomAttribute, Some(code)) => attributes
            .raw_attribute(candidate.product_id, code)
            .and_then(|raw| coerce_qty_milli(&raw))
            .unwrap_or(selling.custom_attribute_default_milli),
        _ => selling.custom_attribute_default_milli,
    };

    // min > max is a stored misconfiguration; treat max as unbounded so the
    // pass never halts on it.
    let max_qty_milli = if selling.conditional_quantity
        && selling.min_qty_milli > selling.max_qty_milli
    {
        None
    } else {
        Some(selling.max_qty_milli)
    };

    Ok(PolicySnapshot {
        qty_mode: selling.qty_mode,
        percentage: selling.percentage,
        custom_value_milli: selling.custom_value_milli,
        custom_attribute_value_milli,
        conditional_quantity: selling.conditional_quantity,
        min_qty_milli: selling.min_qty_milli,
        max_qty_milli,
        list_qty_gte: sync.list_qty_gte,
        list_only_enabled_products: sync.list_only_enabled_products,
        list_only_in_stock_products: sync.list_only_in_stock_products,
        revise_threshold: sync.revise_threshold,
        relist_qty_gte_milli: sync.relist_qty_gte_milli,
        relist_when_in_stock: sync.relist_when_in_stock,
        relist_when_enabled: sync.relist_when_enabled,
        stop_qty_lte_milli: sync.stop_qty_lte_milli,
        stop_when_out_of_stock: sync.stop_when_out_of_stock,
        stop_when_disabled: sync.stop_when_disabled,
    })
}

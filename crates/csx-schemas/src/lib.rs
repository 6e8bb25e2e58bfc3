//! Shared domain types for the ChannelSync engine.
//!
//! Everything here is a plain value object: serde-derived, no IO, no clock
//! reads. Engine crates exchange these types; persistence adapters map them
//! to and from whole rows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod fixedpoint;

pub use fixedpoint::{milli_floor_units, money_to_micros, qty_to_milli, DecimalParseError};

/// Row id of a listing-product (one product listed on one channel).
pub type ListingProductId = i64;

/// Catalog product row id.
pub type ProductId = i64;

/// Local order row id (ours, not the marketplace's).
pub type OrderId = i64;

/// Store scope id.
pub type StoreId = i32;

/// Opaque policy row ids.
pub type SellingPolicyId = i64;
pub type SyncPolicyId = i64;

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// An external marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Amazon,
    Ebay,
    Walmart,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Amazon => "AMAZON",
            Channel::Ebay => "EBAY",
            Channel::Walmart => "WALMART",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AMAZON" => Some(Channel::Amazon),
            "EBAY" => Some(Channel::Ebay),
            "WALMART" => Some(Channel::Walmart),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Listing lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of a listing-product on its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingStatus {
    NotListed,
    Listed,
    Stopped,
    Blocked,
    InactiveCustom,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::NotListed => "NOT_LISTED",
            ListingStatus::Listed => "LISTED",
            ListingStatus::Stopped => "STOPPED",
            ListingStatus::Blocked => "BLOCKED",
            ListingStatus::InactiveCustom => "INACTIVE_CUSTOM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NOT_LISTED" => Some(ListingStatus::NotListed),
            "LISTED" => Some(ListingStatus::Listed),
            "STOPPED" => Some(ListingStatus::Stopped),
            "BLOCKED" => Some(ListingStatus::Blocked),
            "INACTIVE_CUSTOM" => Some(ListingStatus::InactiveCustom),
            _ => None,
        }
    }

    /// States a relist can recover from.
    pub fn is_relistable(&self) -> bool {
        matches!(
            self,
            ListingStatus::Stopped | ListingStatus::Blocked | ListingStatus::InactiveCustom
        )
    }
}

/// Catalog product composition kind.
///
/// Grouped and bundle products aggregate other products; they are never
/// eligible for automatic quantity-driven actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductKind {
    Simple,
    Configurable,
    Virtual,
    Downloadable,
    Grouped,
    Bundle,
}

impl ProductKind {
    pub fn supports_auto_actions(&self) -> bool {
        !matches!(self, ProductKind::Grouped | ProductKind::Bundle)
    }
}

/// Catalog enabled/disabled state. `Unknown` covers a product row that was
/// deleted from the catalog after the listing was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEnabled {
    Enabled,
    Disabled,
    Unknown,
}

impl ProductEnabled {
    pub fn is_enabled(&self) -> bool {
        matches!(self, ProductEnabled::Enabled)
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, ProductEnabled::Disabled)
    }
}

// ---------------------------------------------------------------------------
// Stock
// ---------------------------------------------------------------------------

/// Read-only stock state for one product, captured once per pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    /// Available quantity in milli-units (non-negative).
    pub qty_milli: i64,
    pub is_in_stock: bool,
    pub product_enabled: ProductEnabled,
}

impl StockSnapshot {
    /// Snapshot used when the stock row is missing entirely: quantity zero,
    /// out of stock, catalog state unknown.
    pub fn missing() -> Self {
        Self {
            qty_milli: 0,
            is_in_stock: false,
            product_enabled: ProductEnabled::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// Channel-specific listing details
// ---------------------------------------------------------------------------

/// Channel-specific listing fields, composed as a tagged union instead of a
/// parent/child row split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelDetails {
    Amazon {
        /// Amazon ASIN once known.
        asin: Option<String>,
        /// Fulfilled by Amazon (AFN) — stock is not synchronized for these.
        is_afn_channel: bool,
    },
    Ebay {
        /// Numeric eBay item id once listed.
        item_id: Option<i64>,
        /// eBay site/marketplace code (e.g. `"EBAY_US"`).
        marketplace: String,
    },
    Walmart {
        /// Walmart item id once listed.
        wpid: Option<String>,
        /// GTIN used at publish time.
        gtin: Option<String>,
    },
}

impl ChannelDetails {
    pub fn channel(&self) -> Channel {
        match self {
            ChannelDetails::Amazon { .. } => Channel::Amazon,
            ChannelDetails::Ebay { .. } => Channel::Ebay,
            ChannelDetails::Walmart { .. } => Channel::Walmart,
        }
    }

    /// Channel-fulfilled listings (AFN) advertise the channel's own warehouse
    /// stock; local quantity sync does not apply to them.
    pub fn is_channel_fulfilled(&self) -> bool {
        matches!(self, ChannelDetails::Amazon { is_afn_channel: true, .. })
    }
}

// ---------------------------------------------------------------------------
// Typed extras
// ---------------------------------------------------------------------------

/// Known extension fields previously stored as a free-form JSON blob, plus a
/// read-only overflow map for keys this engine does not interpret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingExtras {
    #[serde(default)]
    pub variation_channel_theme: Option<String>,
    #[serde(default)]
    pub item_duplicate_action_required: bool,
    /// Unknown forward-compat keys, preserved verbatim and never written.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Listing candidate (projection)
// ---------------------------------------------------------------------------

/// One row per (listing_product, channel), materialized fresh on every
/// evaluation pass. Never persisted as its own entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingCandidate {
    pub listing_product_id: ListingProductId,
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub status: ListingStatus,
    pub is_variation: bool,
    pub product_kind: ProductKind,
    /// Quantity currently advertised on the channel, whole units.
    pub online_qty: i64,
    pub selling_policy_id: SellingPolicyId,
    pub sync_policy_id: SyncPolicyId,
    pub details: ChannelDetails,
    pub extras: ListingExtras,
    /// When the last blocking channel error occurred, if any.
    pub last_blocking_error_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Change actions
// ---------------------------------------------------------------------------

/// The trigger families a candidate can match in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    List,
    Revise,
    Relist,
    Stop,
    NoAction,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::List => "LIST",
            ActionKind::Revise => "REVISE",
            ActionKind::Relist => "RELIST",
            ActionKind::Stop => "STOP",
            ActionKind::NoAction => "NO_ACTION",
        }
    }
}

/// Output value object of one pass, consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeAction {
    pub candidate_id: ListingProductId,
    pub action_kind: ActionKind,
    /// Whole units the channel should advertise.
    pub calculated_qty: i64,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Normalized marketplace order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Unshipped,
    PartiallyShipped,
    Shipped,
    Unfulfillable,
    Canceled,
    Other,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Unshipped => "UNSHIPPED",
            OrderStatus::PartiallyShipped => "PARTIALLY_SHIPPED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Unfulfillable => "UNFULFILLABLE",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "UNSHIPPED" => Some(OrderStatus::Unshipped),
            "PARTIALLY_SHIPPED" => Some(OrderStatus::PartiallyShipped),
            "SHIPPED" => Some(OrderStatus::Shipped),
            "UNFULFILLABLE" => Some(OrderStatus::Unfulfillable),
            "CANCELED" => Some(OrderStatus::Canceled),
            "OTHER" => Some(OrderStatus::Other),
            _ => None,
        }
    }

    /// Returns `true` if no further status transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Canceled)
    }
}

/// A monetary amount in integer micros, tagged with its ISO currency code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount_micros: i64,
    pub currency: String,
}

impl Money {
    pub fn new(amount_micros: i64, currency: impl Into<String>) -> Self {
        Self {
            amount_micros,
            currency: currency.into(),
        }
    }

    pub fn zero(currency: impl Into<String>) -> Self {
        Self::new(0, currency)
    }
}

/// Carrier + tracking number pushed back to the channel after shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracking {
    pub carrier: String,
    pub number: String,
}

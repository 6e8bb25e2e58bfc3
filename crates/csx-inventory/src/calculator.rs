//! Advertised-quantity calculation.
//!
//! The contract that matters here is **floor before clamp**: the raw
//! derivation is floored to whole units first, and only then compared
//! against the conditional max. The max itself can be fractional when it
//! came from a custom attribute, so clamping before flooring could yield a
//! different integer.

use csx_policy::{PolicySnapshot, QtyMode};
use csx_schemas::fixedpoint::{milli_floor_units, QTY_MILLI};
use csx_schemas::StockSnapshot;

/// Derive the whole-unit quantity the channel should advertise.
///
/// `stock` is `None` when the product has no stock row at all; that is
/// treated as quantity zero, not an error.
pub fn calculate(stock: Option<&StockSnapshot>, policy: &PolicySnapshot) -> i64 {
    let stock_qty_milli = stock.map_or(0, |s| s.qty_milli.max(0));

    let raw_milli = match policy.qty_mode {
        QtyMode::FixedValue => policy.custom_value_milli,
        QtyMode::PercentageOfStock => percentage_of(stock_qty_milli, policy.percentage),
        QtyMode::PercentageOfCustomAttribute => {
            percentage_of(policy.custom_attribute_value_milli, policy.percentage)
        }
    };

    let mut units = milli_floor_units(raw_milli).max(0);

    if policy.conditional_quantity {
        if let Some(max_milli) = policy.max_qty_milli {
            if units.saturating_mul(QTY_MILLI) > max_milli {
                units = milli_floor_units(max_milli).max(0);
            }
        }
    }

    units
}

fn percentage_of(value_milli: i64, percentage: i64) -> i64 {
    // Saturating keeps absurd stored percentages from wrapping; the final
    // floor+clamp bounds the result anyway.
    value_milli.saturating_mul(percentage.max(0)) / 100
}

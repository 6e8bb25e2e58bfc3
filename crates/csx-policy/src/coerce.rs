//! Lenient coercion of attribute-sourced decimal strings.
//!
//! Attribute values are entered by merchants and arrive as raw strings.
//! Unlike the strict boundary parser in `csx-schemas::fixedpoint`, this
//! coercion tolerates a comma as the decimal separator (`"12,5"`) and
//! surrounding whitespace. Anything it cannot understand yields `None`; the
//! caller substitutes the policy's configured default. Coercion never fails
//! a pass.

use csx_schemas::fixedpoint;

/// Coerce a raw attribute string into quantity milli-units.
///
/// A single comma with no dot present is treated as the decimal separator.
/// Strings with both separators, or with more than one comma, are rejected
/// (returns `None`) rather than guessed at.
pub fn coerce_qty_milli(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let commas = trimmed.matches(',').count();
    let normalized = if commas == 1 && !trimmed.contains('.') {
        trimmed.replacen(',', ".", 1)
    } else if commas > 0 {
        return None;
    } else {
        trimmed.to_string()
    };

    fixedpoint::qty_to_milli(&normalized).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_decimal() {
        assert_eq!(coerce_qty_milli("10"), Some(10_000));
        assert_eq!(coerce_qty_milli("10.5"), Some(10_500));
        assert_eq!(coerce_qty_milli(" 42 "), Some(42_000));
    }

    #[test]
    fn comma_as_decimal_separator() {
        assert_eq!(coerce_qty_milli("10,5"), Some(10_500));
        assert_eq!(coerce_qty_milli("0,25"), Some(250));
    }

    #[test]
    fn ambiguous_separators_rejected() {
        // Thousands-grouping commas cannot be told apart reliably; refuse.
        assert_eq!(coerce_qty_milli("1,234.5"), None);
        assert_eq!(coerce_qty_milli("1,2,3"), None);
    }

    #[test]
    fn garbage_rejected() {
        assert_eq!(coerce_qty_milli(""), None);
        assert_eq!(coerce_qty_milli("n/a"), None);
        assert_eq!(coerce_qty_milli("12 units"), None);
    }
}

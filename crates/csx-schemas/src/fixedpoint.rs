//! Deterministic fixed-point conversions for quantities and money.
//!
//! Catalog stock quantities are fractional decimals (`"10.5"`); monetary
//! amounts carry up to six decimal places. Both are converted to integer
//! fixed-point at the boundary so no later stage touches floating point:
//!
//! - quantities → **milli-units** (1 unit = 1_000 milli)
//! - money      → **micros**      (1 currency unit = 1_000_000 micros)

use std::fmt;

/// Milli-units per whole quantity unit.
pub const QTY_MILLI: i64 = 1_000;

/// Micros per whole currency unit.
pub const MONEY_MICROS: i64 = 1_000_000;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors produced while parsing a decimal string into fixed point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecimalParseError {
    /// The input string was empty (after trimming).
    Empty,
    /// The input contained non-numeric characters or multiple separators.
    Invalid { raw: String },
    /// More fractional digits than the target scale can represent exactly.
    TooManyDecimalPlaces { raw: String, max_places: u32 },
    /// The value overflows i64 at the target scale.
    Overflow { raw: String },
}

impl fmt::Display for DecimalParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecimalParseError::Empty => write!(f, "decimal string is empty"),
            DecimalParseError::Invalid { raw } => {
                write!(f, "decimal string could not be parsed: '{raw}'")
            }
            DecimalParseError::TooManyDecimalPlaces { raw, max_places } => {
                write!(
                    f,
                    "decimal string has more than {max_places} decimal places \
                     (inexact fixed-point conversion): '{raw}'"
                )
            }
            DecimalParseError::Overflow { raw } => {
                write!(f, "decimal value overflows fixed-point range: '{raw}'")
            }
        }
    }
}

impl std::error::Error for DecimalParseError {}

// ---------------------------------------------------------------------------
// Parsers
// ---------------------------------------------------------------------------

/// Convert a decimal string to an integer at `scale` fractional digits.
///
/// Rules:
/// - Accepts optional leading `+` or `-`.
/// - Accepts an optional fractional part separated by `.`.
/// - Rejects more than `scale` decimal places (would require rounding).
/// - Rejects empty strings, non-numeric characters, multiple separators.
/// - Does **not** use floating-point at any stage.
pub fn parse_scaled(s: &str, scale: u32) -> Result<i64, DecimalParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DecimalParseError::Empty);
    }

    let (negative, digits) = if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    };

    if digits.is_empty() {
        return Err(DecimalParseError::Invalid { raw: s.to_string() });
    }

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };

    if frac_part.len() as u32 > scale {
        return Err(DecimalParseError::TooManyDecimalPlaces {
            raw: s.to_string(),
            max_places: scale,
        });
    }

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(DecimalParseError::Invalid { raw: s.to_string() });
    }

    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(DecimalParseError::Invalid { raw: s.to_string() });
    }

    let unit: i64 = 10i64.pow(scale);

    let int_val: i64 = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse()
            .map_err(|_| DecimalParseError::Overflow { raw: s.to_string() })?
    };

    // Right-pad the fractional digits to the full scale.
    let mut frac_val: i64 = 0;
    if !frac_part.is_empty() {
        frac_val = frac_part
            .parse()
            .map_err(|_| DecimalParseError::Invalid { raw: s.to_string() })?;
        frac_val *= 10i64.pow(scale - frac_part.len() as u32);
    }

    let magnitude = int_val
        .checked_mul(unit)
        .and_then(|v| v.checked_add(frac_val))
        .ok_or(DecimalParseError::Overflow { raw: s.to_string() })?;

    Ok(if negative { -magnitude } else { magnitude })
}

/// Parse a quantity decimal string into milli-units.
pub fn qty_to_milli(s: &str) -> Result<i64, DecimalParseError> {
    parse_scaled(s, 3)
}

/// Parse a monetary decimal string into micros.
pub fn money_to_micros(s: &str) -> Result<i64, DecimalParseError> {
    parse_scaled(s, 6)
}

/// Floor a milli-unit quantity to whole units.
///
/// Negative inputs floor toward zero-and-below exactly like mathematical
/// floor: `-1500 milli → -2 units`. Callers that must never see negatives
/// clamp before or after this call.
pub fn milli_floor_units(milli: i64) -> i64 {
    milli.div_euclid(QTY_MILLI)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_quantities() {
        assert_eq!(qty_to_milli("10"), Ok(10_000));
        assert_eq!(qty_to_milli("10.5"), Ok(10_500));
        assert_eq!(qty_to_milli("0.001"), Ok(1));
        assert_eq!(qty_to_milli("+3.25"), Ok(3_250));
        assert_eq!(qty_to_milli("-1.5"), Ok(-1_500));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(qty_to_milli(""), Err(DecimalParseError::Empty)));
        assert!(matches!(
            qty_to_milli("abc"),
            Err(DecimalParseError::Invalid { .. })
        ));
        assert!(matches!(
            qty_to_milli("1.2.3"),
            Err(DecimalParseError::Invalid { .. })
        ));
        assert!(matches!(
            qty_to_milli("1.0001"),
            Err(DecimalParseError::TooManyDecimalPlaces { .. })
        ));
    }

    #[test]
    fn money_scale_is_micros() {
        assert_eq!(money_to_micros("19.99"), Ok(19_990_000));
        assert_eq!(money_to_micros("0.000001"), Ok(1));
    }

    #[test]
    fn floor_units() {
        assert_eq!(milli_floor_units(10_900), 10);
        assert_eq!(milli_floor_units(10_000), 10);
        assert_eq!(milli_floor_units(999), 0);
        assert_eq!(milli_floor_units(-1_500), -2);
    }
}

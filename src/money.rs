//! Monetary amount parsing and rounding.
//!
//! Marketplaces render amounts as locale-formatted text ("$ 1.234.567",
//! "CLP 2.500.000,50", "1,234,567.89"). All of that funnels through one
//! parser here so the engine never touches raw currency strings.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Which characters act as thousands vs decimal separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AmountLocale {
    /// "1.234.567,89": period groups thousands, comma marks decimals
    /// (es-CL and most of Latin America).
    #[default]
    CommaDecimal,
    /// "1,234,567.89": comma groups thousands, period marks decimals.
    PointDecimal,
}

/// Parse a locale-formatted amount string into a `Decimal`.
///
/// Grammar: optional currency markers (symbols, letters, whitespace) are
/// ignored; an optional leading minus is kept; digits may be grouped with
/// the locale's thousands separator and followed by at most one decimal
/// separator. Returns `None` when no digits remain or the kept characters
/// do not form a single well-formed number.
pub fn parse_amount(text: &str, locale: AmountLocale) -> Option<Decimal> {
    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();

    let normalized = match locale {
        AmountLocale::CommaDecimal => kept.replace('.', "").replace(',', "."),
        AmountLocale::PointDecimal => kept.replace(',', ""),
    };

    if !normalized.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    normalized.parse::<Decimal>().ok()
}

/// Round to a whole amount, halves away from zero. Amounts in this system
/// are non-negative, so this is exactly "round half up".
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

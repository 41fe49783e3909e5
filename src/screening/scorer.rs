//! Keyword relevance scoring.
//!
//! Scores how well a candidate's text matches a configured search phrase
//! as the percentage of phrase tokens found in the text.

use rust_decimal::Decimal;

/// Percentage (0–100) of `phrase` tokens contained in `candidate_text`.
///
/// The phrase is split on whitespace (empty tokens ignored) and each token
/// is tested for case-insensitive substring containment. Repeated tokens
/// are NOT de-duplicated: each occurrence counts independently in both the
/// hit count and the denominator. A phrase with no tokens scores 0.
pub fn match_score(candidate_text: &str, phrase: &str) -> Decimal {
    let text = candidate_text.to_lowercase();
    let tokens: Vec<String> = phrase
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();

    if tokens.is_empty() {
        return Decimal::ZERO;
    }

    let hits = tokens.iter().filter(|t| text.contains(t.as_str())).count();
    Decimal::from(hits as u64 * 100) / Decimal::from(tokens.len() as u64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Candidate screening.
//!
//! Combines the exclusion filter and the relevance scorer into the two
//! checkpoints the engine runs: an early keyword check before any browser
//! work, and a late check against the retrieved listing's title.

pub mod exclusions;
pub mod scorer;

pub use exclusions::{ExclusionSet, DEFAULT_EXCLUSIONS};
pub use scorer::match_score;

use rust_decimal::Decimal;
use tracing::debug;

use crate::types::{Candidate, KeywordEntry, MatchResult};

/// Reason token recorded when the search keyword itself is excluded.
pub const REASON_EXCLUDED_KEYWORD: &str = "exclusion_logo";
/// Reason token recorded when the retrieved candidate's title is excluded.
pub const REASON_EXCLUDED_TITLE: &str = "exclusion_logo_titulo";

/// Screening front used by the submission engine.
pub struct Screening {
    exclusions: ExclusionSet,
}

impl Screening {
    pub fn new(exclusions: ExclusionSet) -> Self {
        Self { exclusions }
    }

    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    /// Early checkpoint: cheap rejection of a keyword before any browser
    /// interaction. Returns the reason token when the phrase is excluded.
    pub fn vet_keyword(&self, phrase: &str) -> Option<&'static str> {
        match self.exclusions.hit(phrase) {
            Some(term) => {
                debug!(keyword = %phrase, term = %term, "Keyword excluded");
                Some(REASON_EXCLUDED_KEYWORD)
            }
            None => None,
        }
    }

    /// Late checkpoint: screen a retrieved listing against its keyword
    /// entry. Catches listings whose keyword was innocuous but whose title
    /// is not.
    pub fn screen_listing(&self, candidate: Candidate, entry: &KeywordEntry) -> MatchResult {
        if let Some(term) = self.exclusions.hit(&candidate.title) {
            debug!(title = %candidate.title, term = %term, "Listing title excluded");
            return MatchResult {
                candidate,
                match_score: Decimal::ZERO,
                excluded: true,
                exclusion_reason: Some(REASON_EXCLUDED_TITLE.to_string()),
            };
        }

        let score = match_score(&candidate.title, &entry.phrase);
        debug!(
            title = %candidate.title,
            keyword = %entry.phrase,
            score = %format!("{score:.1}"),
            threshold = %entry.match_threshold,
            "Listing scored"
        );
        MatchResult {
            candidate,
            match_score: score,
            excluded: false,
            exclusion_reason: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

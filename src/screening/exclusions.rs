//! Exclusion term filtering.
//!
//! Rejects keywords and candidate titles containing any configured
//! forbidden term. The term list loads from a flat JSON file and falls
//! back to a built-in default when the file is absent or malformed.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

/// Built-in exclusion terms. These cover the printing/branding jobs the
/// business never bids on, plus one known bad counterparty.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "logo",
    "logotipo",
    "impreso",
    "impresión",
    "impresas",
    "personalizado",
    "personalizada",
    "serigrafía",
    "serigrafiado",
    "bordado",
    "esval",
];

/// Immutable set of lower-cased exclusion terms for one run.
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    terms: Vec<String>,
}

impl ExclusionSet {
    /// Build a set from arbitrary terms; terms are lower-cased and empties
    /// dropped.
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        ExclusionSet { terms }
    }

    /// Load from a JSON array file, degrading to the default list when the
    /// file is missing or invalid.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(terms) => {
                    let set = ExclusionSet::from_terms(terms);
                    debug!(path = %path.display(), terms = set.len(), "Loaded exclusion terms");
                    set
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Invalid exclusion file, using defaults");
                    ExclusionSet::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Exclusion file unavailable, using defaults");
                ExclusionSet::default()
            }
        }
    }

    /// First exclusion term contained in `text` (case-insensitive), if any.
    pub fn hit(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.terms
            .iter()
            .find(|term| lowered.contains(term.as_str()))
            .map(String::as_str)
    }

    /// Whether `text` contains any exclusion term.
    pub fn is_excluded(&self, text: &str) -> bool {
        self.hit(text).is_some()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Default for ExclusionSet {
    fn default() -> Self {
        ExclusionSet::from_terms(DEFAULT_EXCLUSIONS.iter().copied())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

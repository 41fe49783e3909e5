//! Shared types for the POSTOR agent.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that driver, screening,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Keywords
// ---------------------------------------------------------------------------

/// One entry of the configured interest list: a search phrase plus the
/// minimum match score required before a candidate is pursued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub phrase: String,
    /// Minimum match percentage (0–100). Entries without an explicit
    /// threshold require a perfect match.
    pub match_threshold: Decimal,
}

impl KeywordEntry {
    /// Entry with the default (exact-match) threshold.
    pub fn new(phrase: impl Into<String>) -> Self {
        KeywordEntry {
            phrase: phrase.into(),
            match_threshold: Decimal::ONE_HUNDRED,
        }
    }

    /// Entry with an explicit threshold.
    pub fn with_threshold(phrase: impl Into<String>, threshold: Decimal) -> Self {
        KeywordEntry {
            phrase: phrase.into(),
            match_threshold: threshold,
        }
    }
}

impl fmt::Display for KeywordEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" (min {}%)", self.phrase, self.match_threshold)
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A tender/opportunity observed on a marketplace. Constructed per search
/// result and discarded after the decision/submission attempt completes;
/// never persisted beyond the attempt record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    /// Published budget, when the listing exposes one.
    pub budget_amount: Option<Decimal>,
    /// Currently offered amount, when the listing exposes one.
    pub current_offer_amount: Option<Decimal>,
    pub closing_date: Option<DateTime<Utc>>,
    pub link: String,
}

impl Candidate {
    /// A candidate known only by title, before its detail page is opened.
    pub fn from_listing(id: impl Into<String>, title: impl Into<String>, link: impl Into<String>) -> Self {
        Candidate {
            id: id.into(),
            title: title.into(),
            budget_amount: None,
            current_offer_amount: None,
            closing_date: None,
            link: link.into(),
        }
    }

    /// Helper to build a test/sample candidate with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        use rust_decimal_macros::dec;
        Candidate {
            id: "lic-4402".to_string(),
            title: "Sillas de oficina ergonómicas".to_string(),
            budget_amount: Some(dec!(500000)),
            current_offer_amount: Some(dec!(620000)),
            closing_date: Some(Utc::now() + chrono::Duration::days(7)),
            link: "https://market.example.cl/lic-4402".to_string(),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.id, self.title)?;
        if let Some(budget) = self.budget_amount {
            write!(f, " (budget: {budget})")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Match result
// ---------------------------------------------------------------------------

/// Screening verdict for one candidate against one keyword entry.
/// `excluded == true` means downstream policy/submission steps are skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub candidate: Candidate,
    /// Percentage of keyword tokens found in the candidate's title (0–100).
    pub match_score: Decimal,
    pub excluded: bool,
    pub exclusion_reason: Option<String>,
}

impl MatchResult {
    /// Whether this candidate clears the entry's threshold and is not
    /// excluded.
    pub fn meets(&self, threshold: Decimal) -> bool {
        !self.excluded && self.match_score >= threshold
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.excluded {
            write!(
                f,
                "{} — excluded ({})",
                self.candidate.title,
                self.exclusion_reason.as_deref().unwrap_or("unspecified"),
            )
        } else {
            write!(f, "{} — score {:.1}%", self.candidate.title, self.match_score)
        }
    }
}

// ---------------------------------------------------------------------------
// Bid decision
// ---------------------------------------------------------------------------

/// Output of the bid policy: whether/how to change the offered amount and
/// whether to submit. `target_amount`, when present, never exceeds the
/// candidate's budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidDecision {
    pub should_adjust: bool,
    pub target_amount: Option<Decimal>,
    pub should_submit: bool,
    /// Populated on every branch for audit logging.
    pub rationale: String,
}

impl fmt::Display for BidDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.should_adjust, self.target_amount) {
            (true, Some(target)) => write!(
                f,
                "adjust to {target}, submit={} ({})",
                self.should_submit, self.rationale,
            ),
            _ => write!(f, "no adjustment, submit={} ({})", self.should_submit, self.rationale),
        }
    }
}

// ---------------------------------------------------------------------------
// Attempt result
// ---------------------------------------------------------------------------

/// Terminal status of one keyword/candidate attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Rejected by the exclusion filter (keyword or candidate title).
    Omitted,
    /// Candidate found but its score fell below the entry's threshold.
    NoMatch,
    /// The search returned nothing.
    NoResults,
    /// Candidate identified but no submission was made.
    Candidate,
    /// Submission positively confirmed.
    Applied,
    /// Offer adjusted, then submission positively confirmed.
    AdjustedAndApplied,
    /// Submit action taken but success could not be verified. Never
    /// upgraded to `Applied`.
    Attempted,
    Error,
}

impl AttemptStatus {
    /// The stable token used in status files and JSON logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Omitted => "omitted",
            AttemptStatus::NoMatch => "no_match",
            AttemptStatus::NoResults => "no_results",
            AttemptStatus::Candidate => "candidate",
            AttemptStatus::Applied => "applied",
            AttemptStatus::AdjustedAndApplied => "adjusted_and_applied",
            AttemptStatus::Attempted => "attempted",
            AttemptStatus::Error => "error",
        }
    }

    /// Whether this outcome represents a confirmed submission.
    pub fn is_confirmed_submission(&self) -> bool {
        matches!(self, AttemptStatus::Applied | AttemptStatus::AdjustedAndApplied)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The terminal record for one keyword/candidate attempt. Produced exactly
/// once per keyword per run; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptResult {
    pub keyword: String,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Match score, when one was computed for this attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<Decimal>,
    /// Paths of evidence snapshots captured during the attempt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_refs: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl AttemptResult {
    pub fn new(keyword: impl Into<String>, status: AttemptStatus) -> Self {
        AttemptResult {
            keyword: keyword.into(),
            status,
            reason: None,
            score: None,
            evidence_refs: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_score(mut self, score: Decimal) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_evidence(mut self, refs: Vec<String>) -> Self {
        self.evidence_refs = refs;
        self
    }
}

impl fmt::Display for AttemptResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.keyword, self.status)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        if let Some(score) = self.score {
            write!(f, " [score {score:.1}%]")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Task outcomes
// ---------------------------------------------------------------------------

/// Terminal state of one orchestrated task within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Ok,
    Skip,
    Error,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Ok => write!(f, "ok"),
            TaskState::Skip => write!(f, "skip"),
            TaskState::Error => write!(f, "error"),
        }
    }
}

/// Outcome of one task in one orchestration cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task: String,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Path of the per-task log artifact for this cycle, when one was
    /// written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_ref: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaskOutcome {
    pub fn new(task: impl Into<String>, state: TaskState) -> Self {
        TaskOutcome {
            task: task.into(),
            state,
            reason: None,
            log_ref: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_log_ref(mut self, log_ref: impl Into<String>) -> Self {
        self.log_ref = Some(log_ref.into());
        self
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.task, self.state)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cycle summary
// ---------------------------------------------------------------------------

/// Summary of a single orchestration cycle across all tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub run_id: uuid::Uuid,
    pub cycle_number: u64,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub outcomes: Vec<TaskOutcome>,
}

impl CycleSummary {
    /// Counts of (ok, skip, error) task outcomes.
    pub fn counts(&self) -> (usize, usize, usize) {
        let ok = self.outcomes.iter().filter(|o| o.state == TaskState::Ok).count();
        let skip = self.outcomes.iter().filter(|o| o.state == TaskState::Skip).count();
        let error = self.outcomes.iter().filter(|o| o.state == TaskState::Error).count();
        (ok, skip, error)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished - self.started
    }
}

impl fmt::Display for CycleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ok, skip, error) = self.counts();
        write!(
            f,
            "Cycle #{}: tasks={} ok={} skip={} error={} ({}s)",
            self.cycle_number,
            self.outcomes.len(),
            ok,
            skip,
            error,
            self.duration().num_seconds(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

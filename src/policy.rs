//! Bid decision policy.
//!
//! Given a candidate's published budget, its currently offered amount and
//! the keyword match score, decides whether the offer should be adjusted,
//! to what target, and whether a submission should follow. Pure decimal
//! arithmetic; no driver or network dependency.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::debug;

use crate::money::round_half_up;
use crate::types::BidDecision;

/// Rationale recorded when either amount is missing or unreported.
pub const RATIONALE_INSUFFICIENT_AMOUNTS: &str = "insufficient amounts";
/// Rationale recorded when the published budget is non-positive.
pub const RATIONALE_INVALID_BUDGET: &str = "invalid budget";

// ---------------------------------------------------------------------------
// Configuration (defaults, overridden by postor.toml at runtime)
// ---------------------------------------------------------------------------

/// Thresholds governing when an offer is rewritten before submission.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BidPolicyConfig {
    /// Fraction of the budget targeted when adjusting.
    pub target_factor: Decimal,
    /// Minimum match score for the overshoot rule.
    pub overshoot_min_score: Decimal,
    /// Offer/budget ratio above which an offer counts as overshot.
    pub overshoot_ratio: Decimal,
    /// Ratio, either direction, marking a gross budget/offer discrepancy.
    pub discrepancy_ratio: Decimal,
    /// Offer/budget ratio below which a perfect match counts as undercut.
    pub undercut_ratio: Decimal,
}

impl Default for BidPolicyConfig {
    fn default() -> Self {
        Self {
            target_factor: dec!(0.95),
            overshoot_min_score: dec!(70),
            overshoot_ratio: dec!(1.20),
            discrepancy_ratio: dec!(1.50),
            undercut_ratio: dec!(0.90),
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// The pricing decision function.
pub struct BidPolicy {
    config: BidPolicyConfig,
}

impl Default for BidPolicy {
    fn default() -> Self {
        BidPolicy::new(BidPolicyConfig::default())
    }
}

impl BidPolicy {
    pub fn new(config: BidPolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BidPolicyConfig {
        &self.config
    }

    /// Decide whether to adjust and/or submit for one candidate.
    ///
    /// A missing or zero current offer means the listing did not report
    /// one; no pricing decision is possible then. When no adjustment rule
    /// fires, the returned submit intent assumes a fresh candidate; the
    /// submission engine's already-applied check enforces the
    /// never-submitted-before condition.
    pub fn decide(
        &self,
        budget: Option<Decimal>,
        current_offer: Option<Decimal>,
        match_score: Decimal,
    ) -> BidDecision {
        let (budget, offer) = match (budget, current_offer) {
            (Some(b), Some(o)) if !o.is_zero() => (b, o),
            _ => {
                return BidDecision {
                    should_adjust: false,
                    target_amount: None,
                    should_submit: false,
                    rationale: RATIONALE_INSUFFICIENT_AMOUNTS.to_string(),
                };
            }
        };

        if budget <= Decimal::ZERO {
            return BidDecision {
                should_adjust: false,
                target_amount: None,
                should_submit: false,
                rationale: RATIONALE_INVALID_BUDGET.to_string(),
            };
        }

        let cfg = &self.config;
        // Target never exceeds the budget, even for sub-unit budgets where
        // rounding would otherwise push it past.
        let target = round_half_up(budget * cfg.target_factor).min(budget);
        let perfect = match_score == Decimal::ONE_HUNDRED;

        let decision = if match_score >= cfg.overshoot_min_score && offer > budget * cfg.overshoot_ratio {
            BidDecision {
                should_adjust: true,
                target_amount: Some(target),
                should_submit: true,
                rationale: format!("offer {offer} above {}x budget {budget}", cfg.overshoot_ratio),
            }
        } else if perfect
            && (offer >= budget * cfg.discrepancy_ratio || budget >= offer * cfg.discrepancy_ratio)
        {
            BidDecision {
                should_adjust: true,
                target_amount: Some(target),
                should_submit: true,
                rationale: format!("gross discrepancy between offer {offer} and budget {budget}"),
            }
        } else if perfect && offer < budget * cfg.undercut_ratio {
            BidDecision {
                should_adjust: true,
                target_amount: Some(target),
                should_submit: true,
                rationale: format!("perfect match with offer {offer} under {}x budget {budget}", cfg.undercut_ratio),
            }
        } else {
            BidDecision {
                should_adjust: false,
                target_amount: None,
                should_submit: true,
                rationale: "amounts within tolerance".to_string(),
            }
        };

        debug!(
            budget = %budget,
            offer = %offer,
            score = %match_score,
            adjust = decision.should_adjust,
            submit = decision.should_submit,
            rationale = %decision.rationale,
            "Bid decision"
        );
        decision
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

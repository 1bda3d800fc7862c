//! Bayesian-Knowledge-Tracing-style mastery estimation.
//!
//! Each attempt's score is treated as a soft evidence signal `r` in [0, 1].
//! The posterior interpolates the exact Bayesian posteriors for "correct"
//! and "incorrect" evidence by `r`, so an attempt that exactly matches the
//! current expectation leaves the probability unchanged. Learning transfer
//! only applies on positive surprise, which keeps the update monotone
//! non-decreasing for net-positive evidence while still allowing mastery to
//! regress on net-negative evidence.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{AssessmentAttempt, AttemptStatus, MasteryState};

const DEFAULT_GUESS: f64 = 0.2;
const DEFAULT_SLIP: f64 = 0.1;
const DEFAULT_TRANSFER: f64 = 0.15;
const DEFAULT_PASSING_RATIO: f64 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BktParams {
    /// P(correct | not mastered).
    pub guess: f64,
    /// P(incorrect | mastered).
    pub slip: f64,
    /// Learning transfer applied on positive evidence.
    pub transfer: f64,
    /// Correctness ratio at or above which the fast transfer path applies.
    pub passing_ratio: f64,
}

impl Default for BktParams {
    fn default() -> Self {
        Self {
            guess: DEFAULT_GUESS,
            slip: DEFAULT_SLIP,
            transfer: DEFAULT_TRANSFER,
            passing_ratio: DEFAULT_PASSING_RATIO,
        }
    }
}

impl BktParams {
    /// Expected correctness ratio for a learner at mastery probability `p`.
    pub fn expected_ratio(&self, p: f64) -> f64 {
        p * (1.0 - self.slip) + (1.0 - p) * self.guess
    }
}

/// One posterior step: prior mastery `p`, observed correctness ratio `r`.
pub fn bkt_posterior(p: f64, r: f64, params: &BktParams) -> f64 {
    let p = p.clamp(0.0, 1.0);
    let r = r.clamp(0.0, 1.0);

    // Strongly positive evidence: straight transfer step.
    if r >= params.passing_ratio {
        return (p + (1.0 - p) * params.transfer).clamp(0.0, 1.0);
    }

    let correct_denom = p * (1.0 - params.slip) + (1.0 - p) * params.guess;
    let p_given_correct = if correct_denom > f64::EPSILON {
        p * (1.0 - params.slip) / correct_denom
    } else {
        p
    };
    let incorrect_denom = p * params.slip + (1.0 - p) * (1.0 - params.guess);
    let p_given_incorrect = if incorrect_denom > f64::EPSILON {
        p * params.slip / incorrect_denom
    } else {
        p
    };

    // Interpolating by r recovers the prior exactly when r equals the
    // expected ratio (law of total probability).
    let blended = r * p_given_correct + (1.0 - r) * p_given_incorrect;

    // Transfer scaled by positive surprise only.
    let expected = params.expected_ratio(p);
    let surprise = ((r - expected) / (1.0 - expected).max(f64::EPSILON)).max(0.0);
    (blended + (1.0 - blended) * params.transfer * surprise).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Default)]
pub struct MasteryEstimator {
    params: BktParams,
}

impl MasteryEstimator {
    pub fn new(params: BktParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BktParams {
        &self.params
    }

    /// Fold one completed attempt into the learner's mastery state for the
    /// attempt's skill. The prior is `None` on the first attempt; the state
    /// is created lazily in that case.
    pub fn apply(
        &self,
        prior: Option<MasteryState>,
        attempt: &AssessmentAttempt,
    ) -> Result<MasteryState, EngineError> {
        if attempt.status != AttemptStatus::Completed {
            return Err(EngineError::AttemptNotCompleted(attempt.id.clone()));
        }

        let mut state = prior
            .unwrap_or_else(|| MasteryState::new(attempt.learner_id.clone(), attempt.skill_id.clone()));

        state.probability = bkt_posterior(state.probability, attempt.correctness_ratio(), &self.params);
        state.attempt_count += 1;
        state.updated_at = Utc::now();
        Ok(state)
    }
}

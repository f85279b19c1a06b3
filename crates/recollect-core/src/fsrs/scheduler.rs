//! Review Workflow
//!
//! The single state-transition function for a card's memory fields. A review
//! borrows the prior [`CardState`] and returns a brand new one together with
//! diagnostics; the input is never touched, so a failed call leaves the
//! caller's state authoritative.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::algorithm::{
    init_difficulty, init_stability, next_difficulty, next_forget_stability, next_interval,
    next_recall_stability, predict_retrievability, short_term_delay_seconds, SECONDS_PER_DAY,
};
use super::rating::Rating;
use super::weights::{WeightConfig, WeightStore, WeightsError};
use crate::card::{CardState, Phase};

// ============================================================================
// ERRORS
// ============================================================================

/// Errors that abort a single grading call
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Grade is not one of again/hard/good/easy or 1-4
    #[error("Unsupported grade: '{0}'")]
    InvalidGrade(String),
    /// Weight set could not be resolved
    #[error(transparent)]
    Weights(#[from] WeightsError),
}

// ============================================================================
// REVIEW RESULTS
// ============================================================================

/// Everything computed during one review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDiagnostics {
    pub grade: Rating,
    pub event_time: DateTime<Utc>,
    /// Days since the previous review (0 on first review)
    pub elapsed_days: f64,
    /// Predicted recall probability at `event_time`
    pub retrievability: f64,
    pub stability: f64,
    pub difficulty: f64,
    pub interval_days: u32,
    pub success: bool,
    /// Same-day requeue delay for cards still in short-term phases
    pub short_term_delay_seconds: Option<i64>,
    pub previous_phase: Phase,
    pub due_at: DateTime<Utc>,
    /// Weight set used
    pub w_version: String,
    pub before_state: CardState,
    pub after_state: CardState,
}

/// Updated state plus diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub state: CardState,
    pub diagnostics: ReviewDiagnostics,
}

/// What each rating would do to a card right now
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewResults {
    pub again: ReviewOutcome,
    pub hard: ReviewOutcome,
    pub good: ReviewOutcome,
    pub easy: ReviewOutcome,
}

impl PreviewResults {
    /// Outcome for a specific rating
    pub fn get(&self, rating: Rating) -> &ReviewOutcome {
        match rating {
            Rating::Again => &self.again,
            Rating::Hard => &self.hard,
            Rating::Good => &self.good,
            Rating::Easy => &self.easy,
        }
    }
}

// ============================================================================
// PURE WORKFLOW
// ============================================================================

/// Memory parameters to start from
///
/// An uninitialised card is seeded from the neutral Good baseline, not from
/// the rating being applied.
fn prior_memory(state: &CardState, config: &WeightConfig) -> (f64, f64) {
    if state.is_uninitialized() {
        (
            init_difficulty(Rating::Good, config),
            init_stability(Rating::Good, config),
        )
    } else {
        (state.difficulty, state.stability)
    }
}

fn elapsed_days(state: &CardState, event_time: DateTime<Utc>) -> f64 {
    state.last_review_at.map_or(0.0, |last| {
        let seconds = (event_time - last).num_milliseconds() as f64 / 1000.0;
        (seconds / SECONDS_PER_DAY).max(0.0)
    })
}

/// Apply `rating` to `state` at `event_time` with a resolved weight set
pub fn review_with_config(
    state: &CardState,
    rating: Rating,
    event_time: DateTime<Utc>,
    config: &WeightConfig,
) -> ReviewOutcome {
    let previous_phase = state.phase;
    let (difficulty, stability) = prior_memory(state, config);

    let elapsed = elapsed_days(state, event_time);
    let retrievability = predict_retrievability(stability, elapsed, config);

    let (new_stability, success, phase) = match rating {
        Rating::Again if state.stability <= 0.0 => {
            // Nothing learned yet, so there is no prior stability to decay
            (init_stability(Rating::Again, config), false, Phase::Relearning)
        }
        Rating::Again => (
            next_forget_stability(difficulty, stability, retrievability, config),
            false,
            Phase::Relearning,
        ),
        _ => (
            next_recall_stability(difficulty, stability, retrievability, rating, config),
            true,
            Phase::Review,
        ),
    };

    let new_difficulty = next_difficulty(difficulty, rating, config);
    let interval_days = next_interval(new_stability, config);

    let short_term_delay = (previous_phase.is_short_term() || rating == Rating::Again)
        .then(|| short_term_delay_seconds(new_stability));

    let due_at = Duration::try_days(i64::from(interval_days))
        .and_then(|d| event_time.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let mut updated = CardState {
        stability: new_stability,
        difficulty: new_difficulty,
        repetitions: state.repetitions.saturating_add(1),
        lapses: state.lapses.saturating_add(u32::from(!success)),
        last_review_at: Some(event_time),
        due_at: Some(due_at),
        phase,
        w_version: Some(config.version.clone()),
        ..state.clone()
    };
    if success {
        updated.mark_learning_success(event_time, phase);
    } else {
        updated.reset_same_day_success();
    }

    tracing::debug!(
        card_id = %state.card_id,
        grade = %rating,
        previous_phase = %previous_phase,
        stability = new_stability,
        difficulty = new_difficulty,
        interval_days,
        "Reviewed card"
    );

    let diagnostics = ReviewDiagnostics {
        grade: rating,
        event_time,
        elapsed_days: elapsed,
        retrievability,
        stability: new_stability,
        difficulty: new_difficulty,
        interval_days,
        success,
        short_term_delay_seconds: short_term_delay,
        previous_phase,
        due_at,
        w_version: config.version.clone(),
        before_state: state.clone(),
        after_state: updated.clone(),
    };

    ReviewOutcome {
        state: updated,
        diagnostics,
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Review workflow bound to a weight store
#[derive(Debug, Clone)]
pub struct FSRSScheduler {
    weights: Arc<WeightStore>,
}

impl Default for FSRSScheduler {
    fn default() -> Self {
        Self::new(Arc::new(WeightStore::builtin()))
    }
}

impl FSRSScheduler {
    /// Create a scheduler over `weights`
    pub fn new(weights: Arc<WeightStore>) -> Self {
        Self { weights }
    }

    /// Underlying weight store
    pub fn weights(&self) -> &WeightStore {
        &self.weights
    }

    /// Weight set for `state`: explicit override, then the card's own
    /// version, then the store default
    pub fn resolve_config(
        &self,
        state: &CardState,
        weights_version: Option<&str>,
    ) -> Result<Arc<WeightConfig>, SchedulerError> {
        let version = weights_version.or(state.w_version.as_deref());
        Ok(self.weights.load(version)?)
    }

    /// Grade a card with a free-form grade (`"good"`, `"Again"`, `"3"`, ...)
    pub fn review(
        &self,
        state: &CardState,
        grade: &str,
        event_time: DateTime<Utc>,
        weights_version: Option<&str>,
    ) -> Result<ReviewOutcome, SchedulerError> {
        let config = self.resolve_config(state, weights_version)?;
        let rating: Rating = grade.parse()?;
        Ok(review_with_config(state, rating, event_time, &config))
    }

    /// Grade a card with an already-typed rating
    pub fn review_rating(
        &self,
        state: &CardState,
        rating: Rating,
        event_time: DateTime<Utc>,
        weights_version: Option<&str>,
    ) -> Result<ReviewOutcome, SchedulerError> {
        let config = self.resolve_config(state, weights_version)?;
        Ok(review_with_config(state, rating, event_time, &config))
    }

    /// Outcome of every rating, without committing any
    pub fn preview(
        &self,
        state: &CardState,
        event_time: DateTime<Utc>,
    ) -> Result<PreviewResults, SchedulerError> {
        let config = self.resolve_config(state, None)?;
        let run = |rating| review_with_config(state, rating, event_time, &config);
        Ok(PreviewResults {
            again: run(Rating::Again),
            hard: run(Rating::Hard),
            good: run(Rating::Good),
            easy: run(Rating::Easy),
        })
    }

    /// Current recall probability of a reviewed card (1.0 if never reviewed)
    pub fn retrievability_at(
        &self,
        state: &CardState,
        now: DateTime<Utc>,
    ) -> Result<f64, SchedulerError> {
        if state.last_review_at.is_none() || state.stability <= 0.0 {
            return Ok(1.0);
        }
        let config = self.resolve_config(state, None)?;
        Ok(predict_retrievability(
            state.stability,
            elapsed_days(state, now),
            &config,
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================

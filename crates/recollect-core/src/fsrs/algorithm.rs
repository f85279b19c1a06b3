//! FSRS-6 Memory Model
//!
//! Pure functions over a [`WeightConfig`]. Nothing here holds state; the same
//! inputs always produce the same outputs.
//!
//! Stability and difficulty values are rounded to two decimals so the
//! persisted card state stays readable and reproducible.

use super::rating::Rating;
use super::weights::WeightConfig;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Floor for every stability value the model produces
pub const MIN_STABILITY: f64 = 0.1;

/// Lower difficulty bound
pub const MIN_DIFFICULTY: f64 = 1.0;

/// Upper difficulty bound
pub const MAX_DIFFICULTY: f64 = 10.0;

/// Seconds per day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Shortest same-day requeue delay (seconds)
pub const MIN_SHORT_TERM_DELAY_SECS: i64 = 60;

#[inline]
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// DIFFICULTY
// ============================================================================

/// Round to two decimals and clamp to [1, 10]
pub fn constrain_difficulty(difficulty: f64) -> f64 {
    round2(difficulty).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

/// Initial difficulty for a first rating: D0(G) = w4 - e^(w5*(G-1)) + 1
pub fn init_difficulty(rating: Rating, config: &WeightConfig) -> f64 {
    let w = &config.weights;
    constrain_difficulty(w[4] - (w[5] * rating.index() as f64).exp() + 1.0)
}

/// Scale a difficulty step so changes shrink near the ceiling
#[inline]
pub fn linear_damping(delta: f64, old_difficulty: f64) -> f64 {
    delta * (10.0 - old_difficulty) / 9.0
}

/// Pull `current` toward `initial` by w7
#[inline]
pub fn mean_reversion(initial: f64, current: f64, config: &WeightConfig) -> f64 {
    let w7 = config.weights[7];
    w7 * initial + (1.0 - w7) * current
}

/// Difficulty after a review
///
/// Linear-damped step of `-w6 * (G - 3)`, then mean reversion toward the
/// Easy initial difficulty.
pub fn next_difficulty(difficulty: f64, rating: Rating, config: &WeightConfig) -> f64 {
    let delta = -config.weights[6] * (rating.as_i32() - 3) as f64;
    let stepped = difficulty + linear_damping(delta, difficulty);
    constrain_difficulty(mean_reversion(
        init_difficulty(Rating::Easy, config),
        stepped,
        config,
    ))
}

// ============================================================================
// STABILITY
// ============================================================================

/// Initial stability for a first rating: S0(G) = w[G-1]
pub fn init_stability(rating: Rating, config: &WeightConfig) -> f64 {
    round2(config.weights[rating.index()].max(MIN_STABILITY))
}

/// Stability after a successful recall (Hard, Good or Easy)
///
/// S' = S * (1 + e^w8 * (11 - D) * S^-w9 * (e^((1-R)*w10) - 1) * hard * easy)
pub fn next_recall_stability(
    difficulty: f64,
    stability: f64,
    retrievability: f64,
    rating: Rating,
    config: &WeightConfig,
) -> f64 {
    let w = &config.weights;
    let hard_penalty = if rating == Rating::Hard { w[15] } else { 1.0 };
    let easy_bonus = if rating == Rating::Easy { w[16] } else { 1.0 };

    let growth = w[8].exp()
        * (11.0 - difficulty)
        * stability.powf(-w[9])
        * (((1.0 - retrievability) * w[10]).exp() - 1.0)
        * hard_penalty
        * easy_bonus;

    round2((stability * (1.0 + growth)).max(MIN_STABILITY))
}

/// Stability after a lapse
///
/// S'f = w11 * D^-w12 * ((S+1)^w13 - 1) * e^((1-R)*w14), capped at
/// S / e^(w17*w18) so forgetting never yields more than a bounded fraction
/// of the pre-lapse stability.
pub fn next_forget_stability(
    difficulty: f64,
    stability: f64,
    retrievability: f64,
    config: &WeightConfig,
) -> f64 {
    let w = &config.weights;
    let cap = stability / (w[17] * w[18]).exp();
    let value = w[11]
        * difficulty.powf(-w[12])
        * ((stability + 1.0).powf(w[13]) - 1.0)
        * ((1.0 - retrievability) * w[14]).exp();

    round2(value.min(cap).max(MIN_STABILITY))
}

/// Same-day stability update (FSRS-6 short-term term)
///
/// SInc = e^(w17 * (G - 3 + w18)) * S^-w19, never below 1 for Good or Easy.
pub fn next_short_term_stability(stability: f64, rating: Rating, config: &WeightConfig) -> f64 {
    let w = &config.weights;
    let exponent = (rating.as_i32() - 3) as f64 + w[18];
    let mut increase = (w[17] * exponent).exp() * stability.max(MIN_STABILITY).powf(-w[19]);
    if rating.as_i32() >= Rating::Good.as_i32() {
        increase = increase.max(1.0);
    }
    round2((stability * increase).max(MIN_STABILITY))
}

// ============================================================================
// RETRIEVABILITY & INTERVALS
// ============================================================================

/// Probability of recall after `elapsed_days`
///
/// R = (1 + factor * t / S)^decay, with S floored at 0.1
pub fn predict_retrievability(stability: f64, elapsed_days: f64, config: &WeightConfig) -> f64 {
    let stability = stability.max(MIN_STABILITY);
    (1.0 + config.base_factor() * elapsed_days / stability).powf(config.decay())
}

/// Whole-day interval that lands on the requested retention
///
/// Clamped to `[1, maximum_interval]`.
pub fn next_interval(stability: f64, config: &WeightConfig) -> u32 {
    let stability = stability.max(MIN_STABILITY);
    let raw = stability / config.base_factor() * config.target_factor();
    let rounded = raw.round();
    if !rounded.is_finite() || rounded >= config.maximum_interval as f64 {
        return config.maximum_interval;
    }
    (rounded as u32).clamp(1, config.maximum_interval)
}

/// Same-day requeue delay derived from stability (seconds)
pub fn short_term_delay_seconds(stability: f64) -> i64 {
    let seconds = (stability.max(MIN_STABILITY) * SECONDS_PER_DAY).round() as i64;
    seconds.max(MIN_SHORT_TERM_DELAY_SECS)
}

// ============================================================================
// TESTS
// ============================================================================

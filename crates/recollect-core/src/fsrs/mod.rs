//! FSRS-6 (Free Spaced Repetition Scheduler) Module
//!
//! Memory model and review workflow for vocabulary cards.
//!
//! Reference: https://github.com/open-spaced-repetition/fsrs4anki
//!
//! ## Core Formulas:
//! - Retrievability: R = (1 + FACTOR * t / S)^(-w20) where FACTOR = 0.9^(-1/w20) - 1
//! - Interval: t = S/FACTOR * (R_target^(-1/w20) - 1), clamped to [1, max]
//! - First review seeds difficulty and stability from the Good baseline
//!
//! ## Layout
//! - [`weights`]: versioned 21-weight parameter sets and their on-disk store
//! - `algorithm`: pure formulas
//! - [`FSRSScheduler`]: `review(state, grade, time) -> (state', diagnostics)`

mod algorithm;
mod rating;
mod scheduler;
pub mod weights;

pub use algorithm::{
    constrain_difficulty, init_difficulty, init_stability, linear_damping, mean_reversion,
    next_difficulty, next_forget_stability, next_interval, next_recall_stability,
    next_short_term_stability, predict_retrievability, short_term_delay_seconds, MAX_DIFFICULTY,
    MIN_DIFFICULTY, MIN_SHORT_TERM_DELAY_SECS, MIN_STABILITY, SECONDS_PER_DAY,
};
pub use rating::Rating;
pub use scheduler::{
    review_with_config, FSRSScheduler, PreviewResults, ReviewDiagnostics, ReviewOutcome,
    SchedulerError,
};
pub use weights::{
    WeightConfig, WeightStore, WeightsError, DEFAULT_MAXIMUM_INTERVAL, DEFAULT_RETENTION,
    DEFAULT_VERSION, FSRS6_WEIGHTS, WEIGHT_COUNT,
};

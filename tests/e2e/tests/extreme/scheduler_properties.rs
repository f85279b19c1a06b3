//! Memory model properties over many generated review histories
//!
//! Every seeded history is replayed through the scheduler and each outcome
//! is checked against the model's bounds and state-machine rules.

use std::sync::Arc;

use recollect_core::{
    fsrs::{MAX_DIFFICULTY, MIN_DIFFICULTY, MIN_STABILITY},
    CardState, FSRSScheduler, Phase, Rating, ReviewOutcome, WeightConfig, WeightStore,
};
use recollect_e2e_tests::TestDataFactory;

const SEEDS: usize = 60;
const HISTORY_LEN: usize = 40;

fn starting_cards() -> Vec<CardState> {
    let now = TestDataFactory::epoch();
    vec![
        TestDataFactory::new_card("fresh"),
        TestDataFactory::reference_card(now),
        TestDataFactory::studied_card("fragile", Phase::Relearning, 0.1, 10.0, now, now),
        TestDataFactory::studied_card("solid", Phase::Review, 900.0, 1.0, now, now),
    ]
}

fn for_every_history(scheduler: &FSRSScheduler, mut check: impl FnMut(&ReviewOutcome)) {
    for card in starting_cards() {
        for seed in 0..SEEDS {
            let steps = TestDataFactory::seeded_history(seed, HISTORY_LEN);
            for outcome in
                TestDataFactory::replay(scheduler, &card, TestDataFactory::epoch(), &steps)
            {
                check(&outcome);
            }
        }
    }
}

#[test]
fn test_interval_within_bounds() {
    let relaxed = TestDataFactory::relaxed_weights();
    for config in [WeightConfig::fsrs6_default(), relaxed] {
        let max = config.maximum_interval;
        let scheduler = FSRSScheduler::new(Arc::new(WeightStore::from_configs([config])));
        for_every_history(&scheduler, |outcome| {
            let interval = outcome.diagnostics.interval_days;
            assert!((1..=max).contains(&interval), "interval {interval} outside 1..={max}");
        });
    }
}

#[test]
fn test_difficulty_and_stability_bounds() {
    let scheduler = FSRSScheduler::default();
    for_every_history(&scheduler, |outcome| {
        let state = &outcome.state;
        assert!(
            (MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&state.difficulty),
            "difficulty {}",
            state.difficulty
        );
        assert!(state.stability >= MIN_STABILITY, "stability {}", state.stability);
        assert!(state.stability.is_finite());

        let r = outcome.diagnostics.retrievability;
        assert!(r > 0.0 && r <= 1.0, "retrievability {r}");
    });
}

#[test]
fn test_lapse_and_success_rules() {
    let scheduler = FSRSScheduler::default();
    for_every_history(&scheduler, |outcome| {
        let before = &outcome.diagnostics.before_state;
        let after = &outcome.state;
        assert_eq!(after.repetitions, before.repetitions + 1);
        assert_eq!(after.last_review_at, Some(outcome.diagnostics.event_time));

        if outcome.diagnostics.grade == Rating::Again {
            assert!(!outcome.diagnostics.success);
            assert_eq!(after.phase, Phase::Relearning);
            assert_eq!(after.lapses, before.lapses + 1);
            assert_eq!(after.same_day_success, 0);
            assert!(outcome.diagnostics.short_term_delay_seconds.is_some());
        } else {
            assert!(outcome.diagnostics.success);
            assert_eq!(after.phase, Phase::Review);
            assert_eq!(after.lapses, before.lapses);
            assert_eq!(after.last_success_at, Some(outcome.diagnostics.event_time));
        }

        // Short-term requeue exactly when leaving a short-term phase or lapsing
        let short_term = outcome.diagnostics.previous_phase.is_short_term()
            || outcome.diagnostics.grade == Rating::Again;
        assert_eq!(
            outcome.diagnostics.short_term_delay_seconds.is_some(),
            short_term
        );
        if let Some(delay) = outcome.diagnostics.short_term_delay_seconds {
            assert!(delay >= 60);
        }
    });
}

#[test]
fn test_replay_is_deterministic() {
    let scheduler = FSRSScheduler::default();
    let card = TestDataFactory::reference_card(TestDataFactory::epoch());
    for seed in 0..SEEDS {
        let steps = TestDataFactory::seeded_history(seed, HISTORY_LEN);
        let a = TestDataFactory::replay(&scheduler, &card, TestDataFactory::epoch(), &steps);
        let b = TestDataFactory::replay(&scheduler, &card, TestDataFactory::epoch(), &steps);
        assert_eq!(a, b, "seed {seed}");
    }
}

#[test]
fn test_harder_grades_never_schedule_further_out() {
    let scheduler = FSRSScheduler::default();
    let now = TestDataFactory::epoch();
    for stability in [0.5, 3.5, 20.0, 150.0] {
        for elapsed in [0.5, 2.0, 10.0, 90.0] {
            let mut card = TestDataFactory::reference_card(now);
            card.stability = stability;
            card.last_review_at = Some(now - chrono::Duration::hours((elapsed * 24.0) as i64));

            let preview = scheduler.preview(&card, now).unwrap();
            let intervals: Vec<u32> = Rating::ALL
                .iter()
                .map(|r| preview.get(*r).diagnostics.interval_days)
                .collect();
            assert!(
                intervals.windows(2).all(|w| w[0] <= w[1]),
                "S={stability} t={elapsed}: {intervals:?}"
            );
        }
    }
}

#[test]
fn test_on_time_successes_grow_stability() {
    let scheduler = FSRSScheduler::default();
    let mut card = TestDataFactory::new_card("streak");
    let mut at = TestDataFactory::epoch();
    let mut last = 0.0;
    for _ in 0..8 {
        let outcome = scheduler.review_rating(&card, Rating::Good, at, None).unwrap();
        assert!(outcome.state.stability >= last);
        last = outcome.state.stability;
        at = outcome.diagnostics.due_at;
        card = outcome.state;
    }
    assert!(last > 20.0, "stability after a streak: {last}");
}

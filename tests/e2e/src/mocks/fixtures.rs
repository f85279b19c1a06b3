//! Test Data Factory
//!
//! Provides utilities for generating realistic test data:
//! - Cards in every phase, with fixed clocks
//! - Deck files in the on-disk JSON layout
//! - Seeded review histories for property tests

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use recollect_core::{
    CardState, FSRSScheduler, Phase, Rating, ReviewOutcome, Storage, WeightConfig,
    fsrs::FSRS6_WEIGHTS,
};
use serde_json::{json, Map, Value};

/// One grade in a scripted history, applied `after_days` after the previous one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReviewStep {
    pub rating: Rating,
    pub after_days: f64,
}

impl ReviewStep {
    pub fn new(rating: Rating, after_days: f64) -> Self {
        Self { rating, after_days }
    }
}

/// Scenario containing related cards
#[derive(Debug)]
pub struct TestScenario {
    /// Card ids in creation order
    pub card_ids: Vec<String>,
    /// Description of the scenario
    pub description: String,
    /// Role -> card id, for assertions
    pub roles: HashMap<String, String>,
}

/// Factory for creating test data
///
/// # Example
///
/// ```rust,ignore
/// let card = TestDataFactory::reference_card(TestDataFactory::epoch());
/// let history = TestDataFactory::seeded_history(7, 12);
/// let outcomes = TestDataFactory::replay(&scheduler, &card, epoch, &history);
/// ```
pub struct TestDataFactory;

impl TestDataFactory {
    // ========================================================================
    // CLOCKS
    // ========================================================================

    /// 2024-01-01T00:00:00Z
    pub fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    /// `days` after [`TestDataFactory::epoch`]
    pub fn day(days: i64) -> DateTime<Utc> {
        Self::epoch() + Duration::days(days)
    }

    // ========================================================================
    // CARDS
    // ========================================================================

    /// Never-studied card
    pub fn new_card(word: &str) -> CardState {
        CardState::new(word, format!("definition of {}", word), "")
    }

    /// `count` never-studied cards named `<prefix>-<i>`
    pub fn new_cards(prefix: &str, count: usize) -> Vec<CardState> {
        (0..count)
            .map(|i| Self::new_card(&format!("{}-{}", prefix, i)))
            .collect()
    }

    /// Studied card with explicit memory and schedule
    pub fn studied_card(
        word: &str,
        phase: Phase,
        stability: f64,
        difficulty: f64,
        last_review: DateTime<Utc>,
        due: DateTime<Utc>,
    ) -> CardState {
        let mut card = Self::new_card(word);
        card.phase = phase;
        card.stability = stability;
        card.difficulty = difficulty;
        card.last_review_at = Some(last_review);
        card.due_at = Some(due);
        card.repetitions = 3;
        card.w_version = Some("fsrs_v1".to_string());
        card
    }

    /// Review card with S=3.5, D=4.0, last reviewed two days before `now`
    pub fn reference_card(now: DateTime<Utc>) -> CardState {
        let mut card = Self::studied_card(
            "osmosis",
            Phase::Review,
            3.5,
            4.0,
            now - Duration::days(2),
            now - Duration::days(1),
        );
        card.definition = "passive movement of water across a membrane".to_string();
        card
    }

    /// Raw record using the legacy key spellings and an unknown key
    pub fn legacy_record() -> Map<String, Value> {
        let record = json!({
            "definition:": "cell division",
            "example:": "a cell splits in two",
            "stability": "4.2",
            "difficulty": 5,
            "due": "2024-01-10T00:00:00",
            "last_review": 1704067200,
            "reviews": 4,
            "phase": "Review",
            "deck_colour": "teal"
        });
        match record {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    /// Weight set with a lower retention target and a one-year ceiling
    pub fn relaxed_weights() -> WeightConfig {
        WeightConfig::new("relaxed", &FSRS6_WEIGHTS, 0.8, 365).unwrap()
    }

    // ========================================================================
    // DECKS
    // ========================================================================

    /// Deck JSON holding `entries` as (word, definition, example) plus
    /// bookkeeping under `"XXX"`
    pub fn deck_json(name: &str, entries: &[(&str, &str, &str)]) -> String {
        let mut deck = Map::new();
        for (word, definition, example) in entries {
            deck.insert(
                word.to_string(),
                json!({ "definition": definition, "example": example }),
            );
        }
        deck.insert(
            "XXX".to_string(),
            json!({ "Name": name, "CurrentNum": 1, "Completed": false, "Learning": false }),
        );
        serde_json::to_string_pretty(&Value::Object(deck)).unwrap()
    }

    /// Write a deck of `count` generated words into `dir/<name>.json`
    pub fn write_deck(dir: &Path, name: &str, count: usize) -> PathBuf {
        let words: Vec<(String, String)> = (0..count)
            .map(|i| (format!("{}-{}", name, i), Self::lorem_definition(4, i)))
            .collect();
        let entries: Vec<(&str, &str, &str)> = words
            .iter()
            .map(|(w, d)| (w.as_str(), d.as_str(), ""))
            .collect();
        let path = dir.join(format!("{}.json", name));
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(&path, Self::deck_json(name, &entries)).unwrap();
        path
    }

    // ========================================================================
    // HISTORIES
    // ========================================================================

    /// Apply `steps` to `card` starting at `start`, returning every outcome
    pub fn replay(
        scheduler: &FSRSScheduler,
        card: &CardState,
        start: DateTime<Utc>,
        steps: &[ReviewStep],
    ) -> Vec<ReviewOutcome> {
        let mut state = card.clone();
        let mut at = start;
        let mut outcomes = Vec::with_capacity(steps.len());
        for step in steps {
            at += Duration::milliseconds((step.after_days * 86_400_000.0) as i64);
            let outcome = scheduler
                .review_rating(&state, step.rating, at, None)
                .unwrap();
            state = outcome.state.clone();
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Deterministic pseudo-random history of `len` steps
    pub fn seeded_history(seed: usize, len: usize) -> Vec<ReviewStep> {
        const GAPS: [f64; 8] = [0.0, 0.01, 0.5, 1.0, 3.0, 11.0, 40.0, 400.0];
        (0..len)
            .map(|i| {
                let mix = seed.wrapping_mul(31).wrapping_add(i * 17 + (i * i) % 13);
                ReviewStep::new(Rating::ALL[mix % 4], GAPS[(mix / 4) % GAPS.len()])
            })
            .collect()
    }

    /// Generate a short pseudo-definition
    pub fn lorem_definition(words: usize, seed: usize) -> String {
        const WORDS: [&str; 12] = [
            "membrane", "energy", "cell", "water", "protein", "gradient",
            "enzyme", "signal", "nucleus", "light", "carbon", "transport",
        ];
        (0..words)
            .map(|i| WORDS[(seed + i * 5) % WORDS.len()])
            .collect::<Vec<_>>()
            .join(" ")
    }

    // ========================================================================
    // SCENARIOS
    // ========================================================================

    /// One card per phase, stored for `user_id`; review and relearning cards
    /// are due at `now`, the learning card an hour later
    pub fn create_phase_scenario(
        storage: &Storage,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> TestScenario {
        let cards = [
            ("new", Self::new_card("nucleus")),
            (
                "learning",
                Self::studied_card(
                    "ribosome",
                    Phase::Learning,
                    2.31,
                    2.12,
                    now - Duration::hours(1),
                    now + Duration::hours(1),
                ),
            ),
            (
                "review",
                Self::studied_card(
                    "mitosis",
                    Phase::Review,
                    12.0,
                    5.0,
                    now - Duration::days(12),
                    now,
                ),
            ),
            (
                "relearning",
                Self::studied_card(
                    "meiosis",
                    Phase::Relearning,
                    0.74,
                    7.0,
                    now - Duration::days(1),
                    now - Duration::hours(2),
                ),
            ),
        ];

        let mut roles = HashMap::new();
        let mut card_ids = Vec::new();
        for (role, card) in cards {
            let stored = storage.save_card_state(&card, Some(user_id)).unwrap();
            roles.insert(role.to_string(), stored.card_id.clone());
            card_ids.push(stored.card_id);
        }

        TestScenario {
            card_ids,
            description: "One stored card in each phase".to_string(),
            roles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_new_cards_are_uninitialised() {
        let cards = TestDataFactory::new_cards("bio", 5);
        assert_eq!(cards.len(), 5);
        assert!(cards.iter().all(|c| c.is_uninitialized() && c.phase == Phase::New));
        assert_eq!(cards[3].card_id, "bio-3");
    }

    #[test]
    fn test_seeded_history_is_stable() {
        let a = TestDataFactory::seeded_history(7, 20);
        let b = TestDataFactory::seeded_history(7, 20);
        assert_eq!(a, b);
        assert_ne!(a, TestDataFactory::seeded_history(8, 20));
    }

    #[test]
    fn test_replay_chains_states() {
        let scheduler = FSRSScheduler::default();
        let card = TestDataFactory::new_card("osmosis");
        let steps = [
            ReviewStep::new(Rating::Good, 0.0),
            ReviewStep::new(Rating::Good, 3.0),
        ];
        let outcomes = TestDataFactory::replay(&scheduler, &card, TestDataFactory::epoch(), &steps);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].diagnostics.before_state, outcomes[0].state);
        assert_eq!(outcomes[1].state.repetitions, 2);
    }

    #[test]
    fn test_write_deck() {
        let dir = tempdir().unwrap();
        let path = TestDataFactory::write_deck(dir.path(), "biology", 3);
        let cards = recollect_core::load_deck(&path).unwrap();
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[0].word, "biology-0");
    }

    #[test]
    fn test_phase_scenario() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("test.db"))).unwrap();
        let scenario =
            TestDataFactory::create_phase_scenario(&storage, "ana", TestDataFactory::epoch());

        assert_eq!(scenario.card_ids.len(), 4);
        for role in ["new", "learning", "review", "relearning"] {
            assert!(scenario.roles.contains_key(role));
        }
    }
}

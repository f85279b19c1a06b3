//! Journey: grading stored cards
//!
//! Store a card, grade it through `Storage::submit_grade`, and check the
//! persisted state and review log agree with the memory model.

use std::sync::Arc;

use chrono::Duration;
use recollect_core::{
    FSRSScheduler, Phase, SchedulerError, StorageError, WeightConfig, WeightStore, WeightsError,
};
use recollect_e2e_tests::{TestDataFactory, TestDatabaseManager};
use serde_json::json;

const USER: &str = "ana";

#[test]
fn test_reference_review_is_persisted() {
    let db = TestDatabaseManager::new_temp();
    let now = TestDataFactory::epoch();
    let card = TestDataFactory::reference_card(now);
    db.storage.save_card_state(&card, Some(USER)).unwrap();

    let submitted = db.grade(USER, "osmosis", "good", now);
    let diag = &submitted.outcome.diagnostics;

    assert!((diag.retrievability - 0.9337093070461541).abs() < 1e-6);
    assert!((diag.stability - 10.51).abs() < 1e-9);
    assert!((diag.difficulty - 4.0).abs() < 1e-9);
    assert_eq!(diag.interval_days, 11);
    assert_eq!(diag.short_term_delay_seconds, None);

    let stored = db.card(USER, "osmosis");
    assert_eq!(stored, submitted.outcome.state);
    assert_eq!(stored.phase, Phase::Review);
    assert_eq!(stored.due_at, Some(now + Duration::days(11)));
    assert_eq!(stored.repetitions, card.repetitions + 1);
    assert_eq!(stored.lapses, 0);

    let log = db.storage.review_log(Some(USER), Some("osmosis"), 10).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].grade, "good");
    assert_eq!(log[0].interval_days, 11);
    assert!(log[0].success);
    assert_eq!(log[0].w_version, "fsrs_v1");
    assert_eq!(log[0].event_time, Some(now));
    assert_eq!(log[0].id, submitted.log_entry.id);
}

#[test]
fn test_first_review_again_enters_relearning() {
    let db = TestDatabaseManager::new_temp();
    let ids = db.seed_new_cards(USER, 1);
    let now = TestDataFactory::epoch();

    let submitted = db.grade(USER, &ids[0], "again", now);
    let state = &submitted.outcome.state;

    assert_eq!(state.phase, Phase::Relearning);
    assert_eq!(state.lapses, 1);
    assert_eq!(state.repetitions, 1);
    assert!((state.stability - 0.21).abs() < 1e-9);
    assert_eq!(
        submitted.outcome.diagnostics.short_term_delay_seconds,
        Some(18_144)
    );
    assert!(!submitted.log_entry.success);
    assert_eq!(db.storage.stats(Some(USER), now).unwrap().lapses_logged, 1);
}

#[test]
fn test_good_then_lapse() {
    let db = TestDatabaseManager::new_temp();
    let ids = db.seed_new_cards(USER, 1);
    let id = &ids[0];

    let first = db.grade(USER, id, "3", TestDataFactory::day(0));
    assert!((first.outcome.state.stability - 2.31).abs() < 1e-9);
    assert!((first.outcome.state.difficulty - 2.12).abs() < 1e-9);
    assert_eq!(
        first.outcome.diagnostics.short_term_delay_seconds,
        Some(199_584)
    );

    let second = db.grade(USER, id, "good", TestDataFactory::day(3));
    assert_eq!(second.outcome.state.phase, Phase::Review);
    assert!(second.outcome.state.stability > first.outcome.state.stability);

    let lapse = db.grade(USER, id, "Again", TestDataFactory::day(40));
    let state = &lapse.outcome.state;
    assert_eq!(state.phase, Phase::Relearning);
    assert_eq!(state.lapses, 1);
    assert_eq!(state.repetitions, 3);
    assert_eq!(state.same_day_success, 0);
    assert!(state.stability < second.outcome.state.stability);
    assert!(lapse.outcome.diagnostics.short_term_delay_seconds.is_some());

    let log = db.storage.review_log(Some(USER), Some(id), 10).unwrap();
    let grades: Vec<&str> = log.iter().map(|e| e.grade.as_str()).collect();
    assert_eq!(grades, ["again", "good", "good"]);
}

#[test]
fn test_rejected_grade_writes_nothing() {
    let db = TestDatabaseManager::new_temp();
    let now = TestDataFactory::epoch();
    let card = TestDataFactory::reference_card(now);
    let stored = db.storage.save_card_state(&card, Some(USER)).unwrap();

    let err = db
        .storage
        .submit_grade(&db.scheduler, &stored, "perfect", Some(USER), Some(now), None)
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Scheduler(SchedulerError::InvalidGrade(_))
    ));

    let err = db
        .storage
        .submit_grade(&db.scheduler, &stored, "good", Some(USER), Some(now), Some("fsrs_v9"))
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Scheduler(SchedulerError::Weights(WeightsError::NotFound { .. }))
    ));

    assert_eq!(db.card(USER, "osmosis"), stored);
    assert!(db.storage.review_log(Some(USER), None, 10).unwrap().is_empty());
}

#[test]
fn test_weight_override_is_recorded() {
    let mut db = TestDatabaseManager::new_temp();
    db.scheduler = FSRSScheduler::new(Arc::new(WeightStore::from_configs([
        WeightConfig::fsrs6_default(),
        TestDataFactory::relaxed_weights(),
    ])));
    let now = TestDataFactory::epoch();
    let card = TestDataFactory::reference_card(now);
    let stored = db.storage.save_card_state(&card, Some(USER)).unwrap();

    let default = db
        .scheduler
        .review(&stored, "good", now, None)
        .unwrap();
    let submitted = db
        .storage
        .submit_grade(&db.scheduler, &stored, "good", Some(USER), Some(now), Some("relaxed"))
        .unwrap();

    assert_eq!(submitted.log_entry.w_version, "relaxed");
    assert_eq!(db.card(USER, "osmosis").w_version.as_deref(), Some("relaxed"));
    // Lower retention target, longer interval for the same stability
    assert!(submitted.outcome.diagnostics.interval_days > default.diagnostics.interval_days);
}

#[test]
fn test_log_snapshots_card_records() {
    let db = TestDatabaseManager::new_temp();
    let now = TestDataFactory::epoch();
    let mut card = TestDataFactory::reference_card(now);
    card.custom_data.insert("colour".to_string(), json!("teal"));
    let before = db.storage.save_card_state(&card, Some(USER)).unwrap();

    db.grade(USER, "osmosis", "hard", now);
    let log = db.storage.review_log(Some(USER), None, 1).unwrap();
    let entry = &log[0];

    let before_record = entry.before_state.as_ref().unwrap();
    let after_record = entry.after_state.as_ref().unwrap();
    assert_eq!(before_record["phase"], json!("review"));
    assert_eq!(before_record["repetitions"], json!(before.repetitions));
    assert_eq!(after_record["repetitions"], json!(before.repetitions + 1));
    assert_eq!(after_record["custom_data"], json!({ "colour": "teal" }));
    assert_eq!(entry.grade, "hard");
    assert_eq!(entry.short_term_delay_seconds, None);
    assert!(entry.retrievability.is_some_and(|r| r > 0.0 && r <= 1.0));
}

#[test]
fn test_learners_are_isolated() {
    let db = TestDatabaseManager::new_temp();
    let now = TestDataFactory::epoch();
    let card = TestDataFactory::reference_card(now);
    db.storage.save_card_state(&card, Some("ana")).unwrap();
    db.storage.save_card_state(&card, Some("ben")).unwrap();

    db.grade("ana", "osmosis", "easy", now);

    assert_eq!(db.card("ben", "osmosis"), {
        let mut expected = card.clone();
        expected.user_id = Some("ben".to_string());
        expected
    });
    assert!(db.storage.review_log(Some("ben"), None, 10).unwrap().is_empty());
    assert_eq!(db.storage.review_log(Some("ana"), None, 10).unwrap().len(), 1);
}

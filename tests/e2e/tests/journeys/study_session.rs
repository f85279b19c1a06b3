//! Journey: a study session
//!
//! Deck files plus stored progress feed a `ReviewQueueManager`; every grade
//! goes through storage and back into the queue, the way the CLI drives it.

use chrono::Duration;
use recollect_core::{Phase, ReviewQueueManager};
use recollect_e2e_tests::{TestDataFactory, TestDatabaseManager};

const USER: &str = "ana";

#[test]
fn test_thirty_new_cards_with_cap_five() {
    let now = TestDataFactory::epoch();
    let mut queue = ReviewQueueManager::new(TestDataFactory::new_cards("bio", 30), now, 5);

    let counts = queue.queue_counts();
    assert_eq!(counts.learning_due, 5);
    assert_eq!(counts.new_available, 25);
    assert_eq!(queue.new_introduced(), 5);

    let mut served = Vec::new();
    while let Some(card) = queue.next_card() {
        assert_eq!(card.phase, Phase::Learning);
        served.push(card.card_id);
    }
    assert_eq!(served, ["bio-0", "bio-1", "bio-2", "bio-3", "bio-4"]);

    // Repeated calls never introduce a sixth card
    for _ in 0..10 {
        assert!(queue.next_card().is_none());
    }
    assert_eq!(queue.new_introduced(), 5);
    assert_eq!(queue.queue_counts().new_available, 25);
    assert!(queue.is_exhausted());
}

#[test]
fn test_session_round_trip_through_storage() {
    let db = TestDatabaseManager::new_temp();
    let deck = db.write_deck("biology", 8);
    let start = TestDataFactory::epoch();

    let cards = db.storage.session_cards([&deck], Some(USER)).unwrap();
    assert_eq!(cards.len(), 8);
    let mut queue = ReviewQueueManager::new(cards, start, 3);

    let mut graded = Vec::new();
    while let Some(card) = queue.next_card() {
        let grade = if graded.is_empty() { "again" } else { "good" };
        let submitted = db
            .storage
            .submit_grade(&db.scheduler, &card, grade, Some(USER), Some(queue.now()), None)
            .unwrap();
        queue.record_outcome(&submitted.outcome);
        graded.push(card.card_id);
    }
    assert_eq!(graded.len(), 3);

    let stats = db.storage.stats(Some(USER), start).unwrap();
    assert_eq!(stats.total_cards, 3);
    assert_eq!(stats.reviews_logged, 3);
    assert_eq!(stats.lapses_logged, 1);
    assert_eq!(stats.relearning_cards, 1);
    assert_eq!(stats.review_cards, 2);

    // The next session sees stored progress for studied cards and fresh
    // cards for the rest
    let next = db.storage.session_cards([&deck], Some(USER)).unwrap();
    assert_eq!(next.len(), 8);
    let studied: Vec<_> = next.iter().filter(|c| c.repetitions > 0).collect();
    assert_eq!(studied.len(), 3);
    assert!(studied.iter().all(|c| c.definition.starts_with(|ch: char| ch.is_alphabetic())));
    assert_eq!(next.iter().filter(|c| c.phase == Phase::New).count(), 5);
}

#[test]
fn test_again_card_returns_after_short_term_delay() {
    let db = TestDatabaseManager::new_temp();
    let start = TestDataFactory::epoch();
    let mut queue = ReviewQueueManager::new(TestDataFactory::new_cards("chem", 2), start, 2);

    let first = queue.next_card().unwrap();
    let again = db
        .storage
        .submit_grade(&db.scheduler, &first, "again", Some(USER), Some(start), None)
        .unwrap();
    queue.record_outcome(&again.outcome);

    let second = queue.next_card().unwrap();
    assert_eq!(second.card_id, "chem-1");
    let good = db
        .storage
        .submit_grade(&db.scheduler, &second, "good", Some(USER), Some(start), None)
        .unwrap();
    queue.record_outcome(&good.outcome);

    assert!(queue.next_card().is_none());
    assert_eq!(queue.next_due_at(), Some(start + Duration::seconds(18_144)));

    // Just before the delay elapses nothing is due
    queue.advance_clock(start + Duration::seconds(18_143));
    assert!(queue.next_card().is_none());

    queue.advance_clock(start + Duration::seconds(18_144));
    let back = queue.next_card().unwrap();
    assert_eq!(back.card_id, "chem-0");
    assert_eq!(back.phase, Phase::Relearning);
    assert_eq!(back.lapses, 1);

    // The good card follows at its own delay
    queue.advance_clock(start + Duration::seconds(199_584));
    assert_eq!(queue.next_card().unwrap().card_id, "chem-1");
}

#[test]
fn test_stored_review_cards_come_before_new() {
    let db = TestDatabaseManager::new_temp();
    let now = TestDataFactory::day(30);
    let scenario = TestDataFactory::create_phase_scenario(&db.storage, USER, now);

    let mut cards: Vec<_> = db
        .storage
        .load_card_states(Some(USER))
        .unwrap()
        .into_values()
        .collect();
    cards.sort_by(|a, b| a.card_id.cmp(&b.card_id));
    let mut queue = ReviewQueueManager::new(cards, now, 0);

    // Cap 0: the new card never appears; the learning card is not yet due
    let order: Vec<String> = std::iter::from_fn(|| queue.next_card())
        .map(|c| c.card_id)
        .collect();
    assert_eq!(
        order,
        [
            scenario.roles["relearning"].clone(),
            scenario.roles["review"].clone()
        ]
    );

    queue.advance_clock(now + Duration::hours(1));
    assert_eq!(
        queue.next_card().map(|c| c.card_id),
        Some(scenario.roles["learning"].clone())
    );
    assert!(queue.next_card().is_none());
    assert!(queue.is_exhausted());
}

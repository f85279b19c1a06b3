//! Review Queue Manager
//!
//! Decides serving order for one study session and enforces the daily cap on
//! how many never-studied cards are introduced.
//!
//! Priority is strict:
//! 1. due learning/relearning cards
//! 2. due review cards
//! 3. one more new card, while the cap allows it
//!
//! The session clock is held by the manager and moved explicitly with
//! [`ReviewQueueManager::advance_clock`], so serving order is reproducible.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::card::{CardState, Phase};
use crate::fsrs::ReviewOutcome;

/// Default number of new cards introduced per day
pub const DEFAULT_DAILY_NEW_CAP: usize = 20;

/// Due counts for progress display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub review_due: usize,
    pub learning_due: usize,
    /// Cards still waiting in the new pool
    pub new_available: usize,
    /// `review_due + learning_due`
    pub total_active: usize,
}

/// Session-level card queues
#[derive(Debug, Clone)]
pub struct ReviewQueueManager {
    now: DateTime<Utc>,
    daily_new_cap: usize,
    new_introduced: usize,
    review_ready: VecDeque<CardState>,
    /// Sorted by due time
    review_upcoming: Vec<(DateTime<Utc>, CardState)>,
    learning_ready: VecDeque<CardState>,
    /// Sorted by due time
    learning_queue: Vec<(DateTime<Utc>, CardState)>,
    new_queue: VecDeque<CardState>,
    active_card_id: Option<String>,
}

/// Insert after every entry due at or before `due_at`
fn insert_by_due(
    queue: &mut Vec<(DateTime<Utc>, CardState)>,
    due_at: DateTime<Utc>,
    card: CardState,
) {
    let index = queue.partition_point(|(due, _)| *due <= due_at);
    queue.insert(index, (due_at, card));
}

/// Move every entry due by `now` onto the back of `ready`
fn pull_due(
    queue: &mut Vec<(DateTime<Utc>, CardState)>,
    ready: &mut VecDeque<CardState>,
    now: DateTime<Utc>,
) {
    let split = queue.partition_point(|(due, _)| *due <= now);
    ready.extend(queue.drain(..split).map(|(_, card)| card));
}

impl ReviewQueueManager {
    /// Seed the queues from a snapshot of the learner's cards
    ///
    /// New cards are promoted to learning up to `daily_new_cap`; the rest
    /// wait in the new pool. Cards without a due time count as due now.
    pub fn new(
        cards: impl IntoIterator<Item = CardState>,
        now: DateTime<Utc>,
        daily_new_cap: usize,
    ) -> Self {
        let mut manager = Self {
            now,
            daily_new_cap,
            new_introduced: 0,
            review_ready: VecDeque::new(),
            review_upcoming: Vec::new(),
            learning_ready: VecDeque::new(),
            learning_queue: Vec::new(),
            new_queue: VecDeque::new(),
            active_card_id: None,
        };

        for mut card in cards {
            let due_at = card.due_at.unwrap_or(now);
            match card.phase {
                Phase::Review => manager.place_review(due_at, card),
                Phase::Learning | Phase::Relearning => manager.place_learning(due_at, card),
                Phase::New => {
                    if manager.new_introduced < manager.daily_new_cap {
                        card.update_phase(Phase::Learning);
                        manager.learning_ready.push_back(card);
                        manager.new_introduced += 1;
                    } else {
                        manager.new_queue.push_back(card);
                    }
                }
            }
        }

        tracing::debug!(
            learning_ready = manager.learning_ready.len(),
            learning_queued = manager.learning_queue.len(),
            review_ready = manager.review_ready.len(),
            review_upcoming = manager.review_upcoming.len(),
            new_waiting = manager.new_queue.len(),
            new_introduced = manager.new_introduced,
            "Seeded review queues"
        );

        manager
    }

    fn place_review(&mut self, due_at: DateTime<Utc>, card: CardState) {
        if due_at <= self.now {
            self.review_ready.push_back(card);
        } else {
            insert_by_due(&mut self.review_upcoming, due_at, card);
        }
    }

    fn place_learning(&mut self, due_at: DateTime<Utc>, card: CardState) {
        if due_at <= self.now {
            self.learning_ready.push_back(card);
        } else {
            insert_by_due(&mut self.learning_queue, due_at, card);
        }
    }

    /// Session clock
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Move the session clock forward; earlier times are ignored
    pub fn advance_clock(&mut self, now: DateTime<Utc>) {
        if now > self.now {
            self.now = now;
        }
    }

    pub fn daily_new_cap(&self) -> usize {
        self.daily_new_cap
    }

    /// New cards promoted so far this session, including at seeding
    pub fn new_introduced(&self) -> usize {
        self.new_introduced
    }

    /// Id of the card most recently served
    pub fn active_card_id(&self) -> Option<&str> {
        self.active_card_id.as_deref()
    }

    /// Next card to study, or `None` when nothing is actionable right now
    pub fn next_card(&mut self) -> Option<CardState> {
        pull_due(&mut self.learning_queue, &mut self.learning_ready, self.now);
        pull_due(&mut self.review_upcoming, &mut self.review_ready, self.now);

        let card = if let Some(card) = self.learning_ready.pop_front() {
            Some(card)
        } else if let Some(card) = self.review_ready.pop_front() {
            Some(card)
        } else if self.new_introduced < self.daily_new_cap {
            self.new_queue.pop_front().map(|mut card| {
                card.update_phase(Phase::Learning);
                self.new_introduced += 1;
                card
            })
        } else {
            None
        };

        self.active_card_id = card.as_ref().map(|c| c.card_id.clone());
        if let Some(card) = &card {
            tracing::trace!(card_id = %card.card_id, phase = %card.phase, "Serving card");
        }
        card
    }

    /// Requeue a graded card
    ///
    /// Cards with a short-term delay return to the learning buckets at
    /// `now + delay`; review-phase cards go back by their due time. The new
    /// card counter tracks introductions and is never decremented.
    pub fn record_outcome(&mut self, outcome: &ReviewOutcome) {
        let card = outcome.state.clone();
        if let Some(delay) = outcome.diagnostics.short_term_delay_seconds {
            let due_at = Duration::try_seconds(delay)
                .and_then(|d| self.now.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.place_learning(due_at, card);
        } else if card.phase == Phase::Review {
            let due_at = card.due_at.unwrap_or(self.now);
            self.place_review(due_at, card);
        }

        if self.active_card_id.as_deref() == Some(outcome.state.card_id.as_str()) {
            self.active_card_id = None;
        }
    }

    /// Counts of actionable cards at the session clock
    pub fn queue_counts(&self) -> QueueSnapshot {
        let elapsed = |queue: &[(DateTime<Utc>, CardState)]| {
            queue.partition_point(|(due, _)| *due <= self.now)
        };
        let learning_due = self.learning_ready.len() + elapsed(&self.learning_queue);
        let review_due = self.review_ready.len() + elapsed(&self.review_upcoming);
        QueueSnapshot {
            review_due,
            learning_due,
            new_available: self.new_queue.len(),
            total_active: review_due + learning_due,
        }
    }

    /// Earliest time a queued card becomes due
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        let learning = self.learning_queue.first().map(|(due, _)| *due);
        let review = self.review_upcoming.first().map(|(due, _)| *due);
        match (learning, review) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// No card is left in any bucket, or only new cards the cap holds back
    pub fn is_exhausted(&self) -> bool {
        self.learning_ready.is_empty()
            && self.learning_queue.is_empty()
            && self.review_ready.is_empty()
            && self.review_upcoming.is_empty()
            && (self.new_queue.is_empty() || self.new_introduced >= self.daily_new_cap)
    }
}

// ============================================================================
// TESTS
// ============================================================================

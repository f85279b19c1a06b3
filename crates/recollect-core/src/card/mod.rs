//! Card module - Scheduling state of a single flashcard
//!
//! A [`CardState`] carries:
//! - Identity (word, card id, owning user)
//! - Learning content, opaque to the scheduler
//! - FSRS-6 memory parameters (stability, difficulty)
//! - Scheduling fields (due time, last review, phase, counters)
//! - An extension bag (history, custom data, metadata) carried through untouched

mod record;

pub use record::{parse_timestamp, MalformedStateError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// PHASE
// ============================================================================

/// Coarse lifecycle bucket of a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Never studied
    #[default]
    New,
    /// Short-term acquisition
    Learning,
    /// Long-term retention
    Review,
    /// Recovering after a lapse
    Relearning,
}

impl Phase {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::New => "new",
            Phase::Learning => "learning",
            Phase::Review => "review",
            Phase::Relearning => "relearning",
        }
    }

    /// Phases whose next step is a same-day requeue rather than a day interval
    pub fn is_short_term(&self) -> bool {
        matches!(self, Phase::New | Phase::Learning | Phase::Relearning)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = MalformedStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "new" => Ok(Phase::New),
            "learning" => Ok(Phase::Learning),
            "review" => Ok(Phase::Review),
            "relearning" => Ok(Phase::Relearning),
            other => Err(MalformedStateError::new(
                "phase",
                format!("unknown phase '{}'", other),
            )),
        }
    }
}

// ============================================================================
// CARD STATE
// ============================================================================

/// Scheduling memory of one card
///
/// `difficulty == 0` and `stability == 0` mark a card the memory model has
/// never initialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardState {
    /// Word shown on the front of the card
    pub word: String,
    /// Persistent identifier, defaults to `word`
    pub card_id: String,
    /// Owning learner, if known
    #[serde(default)]
    pub user_id: Option<String>,
    /// Back-of-card definition
    #[serde(default)]
    pub definition: String,
    /// Example sentence(s)
    #[serde(default)]
    pub example: String,

    // ========== FSRS-6 memory ==========
    /// Days until recall probability decays to the target retention
    #[serde(default)]
    pub stability: f64,
    /// Intrinsic hardness in [1, 10], 0 until first review
    #[serde(default)]
    pub difficulty: f64,

    // ========== Scheduling ==========
    /// Next due time
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    /// Time of the most recent review
    #[serde(default)]
    pub last_review_at: Option<DateTime<Utc>>,
    /// Lifecycle phase
    #[serde(default)]
    pub phase: Phase,
    /// Total reviews
    #[serde(default)]
    pub repetitions: u32,
    /// Times the card was forgotten
    #[serde(default)]
    pub lapses: u32,
    /// Consecutive successful reviews since the last lapse
    #[serde(default)]
    pub same_day_success: u32,

    // ========== Provenance ==========
    /// Time of the most recent successful review
    #[serde(default)]
    pub last_success_at: Option<DateTime<Utc>>,
    /// Weight set that produced the current memory values
    #[serde(default)]
    pub w_version: Option<String>,
    /// Hidden from new-card introduction by the deck owner
    #[serde(default)]
    pub new_buried: bool,

    // ========== Extension bag ==========
    #[serde(default)]
    pub history: Vec<Map<String, Value>>,
    #[serde(default)]
    pub custom_data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CardState {
    /// Fresh, never-studied card
    pub fn new(
        word: impl Into<String>,
        definition: impl Into<String>,
        example: impl Into<String>,
    ) -> Self {
        let word = word.into();
        Self {
            card_id: word.clone(),
            word,
            user_id: None,
            definition: definition.into(),
            example: example.into(),
            stability: 0.0,
            difficulty: 0.0,
            due_at: None,
            last_review_at: None,
            phase: Phase::New,
            repetitions: 0,
            lapses: 0,
            same_day_success: 0,
            last_success_at: None,
            w_version: None,
            new_buried: false,
            history: Vec::new(),
            custom_data: Map::new(),
            metadata: Map::new(),
        }
    }

    /// Replace the card id
    pub fn with_card_id(mut self, card_id: impl Into<String>) -> Self {
        self.card_id = card_id.into();
        self
    }

    /// True until the memory model has produced values for this card
    pub fn is_uninitialized(&self) -> bool {
        self.stability <= 0.0 || self.difficulty <= 0.0
    }

    /// Due at or before `now`; cards without a due time count as due
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at.is_none_or(|due| due <= now)
    }

    /// Move the card into another phase without touching its memory
    pub fn update_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Record a successful review
    pub fn mark_learning_success(&mut self, event_time: DateTime<Utc>, promote_to: Phase) {
        self.last_success_at = Some(event_time);
        self.same_day_success = self.same_day_success.saturating_add(1);
        self.phase = promote_to;
    }

    /// Clear the success streak after a lapse
    pub fn reset_same_day_success(&mut self) {
        self.same_day_success = 0;
    }
}

// ============================================================================
// TESTS
// ============================================================================

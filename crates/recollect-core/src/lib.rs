//! # Recollect Core
//!
//! Flashcard scheduling engine built on the FSRS-6 memory model:
//!
//! - **FSRS-6**: 21-parameter spaced repetition with versioned weight sets
//! - **Review Workflow**: one pure transition `state -> (state', diagnostics)`
//! - **Session Queues**: learning before review before new, with a daily new-card cap
//! - **Card Records**: lenient reader for legacy deck/state JSON with an extension bag
//! - **Storage**: SQLite card state store and append-only review log
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use recollect_core::{FSRSScheduler, ReviewQueueManager, Storage};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Storage::new(None)?;
//! let scheduler = FSRSScheduler::default();
//!
//! let cards = storage.session_cards(["decks/biology.json"], Some("ana"))?;
//! let mut queue = ReviewQueueManager::new(cards, Utc::now(), 20);
//!
//! while let Some(card) = queue.next_card() {
//!     let submitted = storage.submit_grade(&scheduler, &card, "good", Some("ana"), None, None)?;
//!     queue.record_outcome(&submitted.outcome);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): bundled SQLite
//! - `encryption`: SQLCipher; the key is read from `RECOLLECT_ENCRYPTION_KEY`

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod card;
pub mod deck;
pub mod fsrs;
pub mod queue;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Cards
pub use card::{parse_timestamp, CardState, MalformedStateError, Phase};

// FSRS-6 algorithm
pub use fsrs::{
    init_difficulty,
    init_stability,
    next_interval,
    // Core functions for advanced usage
    predict_retrievability,
    review_with_config,
    FSRSScheduler,
    PreviewResults,
    Rating,
    ReviewDiagnostics,
    ReviewOutcome,
    SchedulerError,
    WeightConfig,
    WeightStore,
    WeightsError,
};

// Session queues
pub use queue::{QueueSnapshot, ReviewQueueManager, DEFAULT_DAILY_NEW_CAP};

// Decks
pub use deck::{load_deck, load_deck_str, DeckError, DeckInfo};

// Storage layer
pub use storage::{
    ImportSummary, Result, ReviewLogEntry, Storage, StorageError, StoreStats, SubmittedReview,
    DEFAULT_USER_ID,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// FSRS algorithm version (6 = 21 parameters)
pub const FSRS_VERSION: u8 = 6;

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        CardState, FSRSScheduler, Phase, QueueSnapshot, Rating, Result, ReviewOutcome,
        ReviewQueueManager, Storage, StorageError, WeightStore,
    };
}

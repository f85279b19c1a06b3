//! Storage Module
//!
//! SQLite-based storage layer with:
//! - Per-learner card state store keyed by `(user_id, card_id)`
//! - Append-only review log
//! - Transactional grade submission
//! - Deck import and session assembly

mod migrations;
mod sqlite;

pub use migrations::MIGRATIONS;
pub use sqlite::{
    ImportSummary, Result, ReviewLogEntry, Storage, StorageError, StoreStats, SubmittedReview,
    DEFAULT_USER_ID, REQUIRED_LOG_FIELDS,
};

//! SQLite Storage Implementation
//!
//! Card state store keyed by `(user_id, card_id)` plus an append-only
//! review log. The full card record lives in a JSON column; a few fields are
//! mirrored into plain columns for due queries and stats.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::card::{CardState, Phase};
use crate::deck::{deck_files, list_info, load_deck, DeckError};
use crate::fsrs::{FSRSScheduler, ReviewOutcome, SchedulerError};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Card not found
    #[error("Card not found: {0}")]
    NotFound(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
    /// Grading failed; nothing was written
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// Deck could not be read
    #[error(transparent)]
    Deck(#[from] DeckError),
    /// Stored or supplied JSON could not be (de)serialised
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Review log entry lacks required fields
    #[error("Review log entry is missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Learner id used when none is given
pub const DEFAULT_USER_ID: &str = "default";

/// Fields every review log entry must carry
pub const REQUIRED_LOG_FIELDS: [&str; 6] = [
    "user_id",
    "card_id",
    "grade",
    "interval_days",
    "success",
    "w_version",
];

fn normalise_user_id(user_id: Option<&str>) -> String {
    match user_id.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => DEFAULT_USER_ID.to_string(),
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// One graded review, as appended to the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewLogEntry {
    pub id: String,
    pub user_id: String,
    pub card_id: String,
    pub grade: String,
    pub interval_days: u32,
    pub success: bool,
    pub w_version: String,
    #[serde(default)]
    pub retrievability: Option<f64>,
    #[serde(default)]
    pub short_term_delay_seconds: Option<i64>,
    #[serde(default)]
    pub event_time: Option<DateTime<Utc>>,
    pub logged_at: DateTime<Utc>,
    /// Storage records of the card before and after the review
    #[serde(default)]
    pub before_state: Option<Map<String, Value>>,
    #[serde(default)]
    pub after_state: Option<Map<String, Value>>,
    /// Caller-supplied fields outside the fixed schema
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReviewLogEntry {
    /// Log entry describing `outcome`
    pub fn from_outcome(user_id: &str, outcome: &ReviewOutcome) -> Self {
        let d = &outcome.diagnostics;
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            card_id: outcome.state.card_id.clone(),
            grade: d.grade.as_str().to_string(),
            interval_days: d.interval_days,
            success: d.success,
            w_version: d.w_version.clone(),
            retrievability: Some(d.retrievability),
            short_term_delay_seconds: d.short_term_delay_seconds,
            event_time: Some(d.event_time),
            logged_at: Utc::now(),
            before_state: Some(d.before_state.to_storage_record()),
            after_state: Some(d.after_state.to_storage_record()),
            extra: Map::new(),
        }
    }
}

/// Result of a persisted grade
#[derive(Debug, Clone)]
pub struct SubmittedReview {
    pub outcome: ReviewOutcome,
    pub log_entry: ReviewLogEntry,
}

/// Result of a deck import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// Deck files that were read
    pub decks: Vec<PathBuf>,
    /// Cards written to the store
    pub imported: usize,
    /// Cards left alone because the learner already has state for them
    pub skipped: usize,
}

/// Per-learner store statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub user_id: String,
    pub total_cards: i64,
    pub new_cards: i64,
    pub learning_cards: i64,
    pub review_cards: i64,
    pub relearning_cards: i64,
    /// Studied cards due at the queried time
    pub due_now: i64,
    pub reviews_logged: i64,
    pub lapses_logged: i64,
    pub decks_imported: i64,
}

/// Raw `card_states` row
struct StoredRow {
    user_id: String,
    card_id: String,
    word: String,
    state: String,
}

impl StoredRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get("user_id")?,
            card_id: row.get("card_id")?,
            word: row.get("word")?,
            state: row.get("state")?,
        })
    }

    fn into_state(self) -> Result<CardState> {
        let payload: Map<String, Value> = serde_json::from_str(&self.state)?;
        let mut state = CardState::from_storage(&self.word, &payload);
        state.card_id = self.card_id;
        state.user_id = Some(self.user_id);
        Ok(state)
    }
}

fn upsert_state(conn: &Connection, user_id: &str, state: &CardState) -> Result<()> {
    let record = serde_json::to_string(&state.to_storage_record())?;
    conn.execute(
        "INSERT INTO card_states (user_id, card_id, word, phase, due_at, w_version, state, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(user_id, card_id) DO UPDATE SET
            word = excluded.word,
            phase = excluded.phase,
            due_at = excluded.due_at,
            w_version = excluded.w_version,
            state = excluded.state,
            updated_at = excluded.updated_at",
        params![
            user_id,
            state.card_id,
            state.word,
            state.phase.as_str(),
            state.due_at.map(|t| t.to_rfc3339()),
            state.w_version,
            record,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn insert_log(conn: &Connection, entry: &ReviewLogEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO review_log (
            id, user_id, card_id, grade, interval_days, success, w_version,
            retrievability, short_term_delay_seconds, event_time, logged_at, payload
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            entry.id,
            entry.user_id,
            entry.card_id,
            entry.grade,
            entry.interval_days,
            entry.success,
            entry.w_version,
            entry.retrievability,
            entry.short_term_delay_seconds,
            entry.event_time.map(|t| t.to_rfc3339()),
            entry.logged_at.to_rfc3339(),
            serde_json::to_string(entry)?,
        ],
    )?;
    Ok(())
}

// ============================================================================
// STORAGE
// ============================================================================

/// SQLite card state store
///
/// Uses separate reader/writer connections for interior mutability.
/// All methods take `&self` (not `&mut self`), making Storage `Send + Sync`.
pub struct Storage {
    path: PathBuf,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("path", &self.path).finish()
    }
}

impl Storage {
    /// Apply PRAGMAs and optional encryption to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        // Apply encryption key if SQLCipher is enabled and key is provided
        #[cfg(feature = "encryption")]
        {
            if let Ok(key) = std::env::var("RECOLLECT_ENCRYPTION_KEY") {
                if !key.is_empty() {
                    conn.pragma_update(None, "key", &key)?;
                }
            }
        }

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -16000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        Ok(())
    }

    /// Default database location in the platform data directory
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "recollect", "recollect").ok_or_else(|| {
            StorageError::Init("Could not determine project directories".to_string())
        })?;
        Ok(proj_dirs.data_dir().join("recollect.db"))
    }

    /// Open (creating if needed) the store at `db_path` or the default path
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => Self::default_path()?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
            // Restrict directory permissions to owner-only on Unix
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o700);
                let _ = std::fs::set_permissions(parent, perms);
            }
        }

        let writer_conn = Connection::open(&path)?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;

        // Apply migrations on writer only
        let applied = super::migrations::apply_migrations(&writer_conn)?;
        if applied > 0 {
            tracing::info!(path = %path.display(), applied, "Database schema updated");
        }

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            path,
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    /// Database file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))
    }

    fn lock_reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))
    }

    /// Applied schema version
    pub fn schema_version(&self) -> Result<u32> {
        let reader = self.lock_reader()?;
        Ok(super::migrations::get_current_version(&reader)?)
    }

    // ========================================================================
    // CARD STATES
    // ========================================================================

    /// Insert or replace one card's state
    ///
    /// The learner is `user_id`, else the card's own `user_id`, else
    /// [`DEFAULT_USER_ID`]. Returns the state as stored.
    pub fn save_card_state(&self, state: &CardState, user_id: Option<&str>) -> Result<CardState> {
        let user = normalise_user_id(user_id.or(state.user_id.as_deref()));
        let writer = self.lock_writer()?;
        upsert_state(&writer, &user, state)?;

        let mut stored = state.clone();
        stored.user_id = Some(user);
        Ok(stored)
    }

    /// Insert or replace many states in one transaction
    pub fn save_card_states<'a>(
        &self,
        states: impl IntoIterator<Item = &'a CardState>,
        user_id: Option<&str>,
    ) -> Result<usize> {
        let mut writer = self.lock_writer()?;
        let tx = writer.transaction()?;
        let mut count = 0;
        for state in states {
            let user = normalise_user_id(user_id.or(state.user_id.as_deref()));
            upsert_state(&tx, &user, state)?;
            count += 1;
        }
        tx.commit()?;
        Ok(count)
    }

    /// Stored state of a card, looked up by card id and then by word
    pub fn load_card_state(
        &self,
        user_id: Option<&str>,
        card_id: &str,
    ) -> Result<Option<CardState>> {
        let user = normalise_user_id(user_id);
        let row = {
            let reader = self.lock_reader()?;
            let mut stmt = reader.prepare(
                "SELECT user_id, card_id, word, state FROM card_states
                 WHERE user_id = ?1 AND (card_id = ?2 OR word = ?2)
                 ORDER BY card_id = ?2 DESC
                 LIMIT 1",
            )?;
            stmt.query_row(params![user, card_id], StoredRow::from_row)
                .optional()?
        };
        row.map(StoredRow::into_state).transpose()
    }

    /// Like [`Storage::load_card_state`], failing with `NotFound` for unknown cards
    pub fn require_card_state(&self, user_id: Option<&str>, card_id: &str) -> Result<CardState> {
        self.load_card_state(user_id, card_id)?
            .ok_or_else(|| StorageError::NotFound(card_id.to_string()))
    }

    /// Every stored state of a learner, keyed by card id
    pub fn load_card_states(&self, user_id: Option<&str>) -> Result<HashMap<String, CardState>> {
        let user = normalise_user_id(user_id);
        let rows: Vec<StoredRow> = {
            let reader = self.lock_reader()?;
            let mut stmt = reader.prepare(
                "SELECT user_id, card_id, word, state FROM card_states
                 WHERE user_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt.query_map(params![user], StoredRow::from_row)?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut states = HashMap::with_capacity(rows.len());
        for row in rows {
            let state = row.into_state()?;
            states.insert(state.card_id.clone(), state);
        }
        Ok(states)
    }

    /// Studied cards due at `now`, earliest first
    pub fn due_cards(
        &self,
        user_id: Option<&str>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CardState>> {
        let user = normalise_user_id(user_id);
        let rows: Vec<StoredRow> = {
            let reader = self.lock_reader()?;
            let mut stmt = reader.prepare(
                "SELECT user_id, card_id, word, state FROM card_states
                 WHERE user_id = ?1 AND phase != 'new'
                   AND (due_at IS NULL OR due_at <= ?2)
                 ORDER BY due_at IS NOT NULL, due_at, rowid
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(
                params![user, now.to_rfc3339(), limit as i64],
                StoredRow::from_row,
            )?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        rows.into_iter().map(StoredRow::into_state).collect()
    }

    // ========================================================================
    // REVIEW LOG
    // ========================================================================

    /// Append a typed log entry
    pub fn append_review_log(&self, entry: &ReviewLogEntry) -> Result<()> {
        let writer = self.lock_writer()?;
        insert_log(&writer, entry)
    }

    /// Append a free-form log entry
    ///
    /// The entry must be an object carrying every [`REQUIRED_LOG_FIELDS`]
    /// key. `id` and `logged_at` are filled in when absent; any other keys
    /// are kept in [`ReviewLogEntry::extra`].
    pub fn append_review_log_value(&self, entry: &Value) -> Result<ReviewLogEntry> {
        let empty = Map::new();
        let object = entry.as_object().unwrap_or(&empty);
        let missing: Vec<String> = REQUIRED_LOG_FIELDS
            .iter()
            .filter(|field| !object.contains_key(**field))
            .map(|field| field.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(StorageError::MissingFields(missing));
        }

        let mut record = object.clone();
        record
            .entry("id")
            .or_insert_with(|| Value::from(Uuid::new_v4().to_string()));
        record
            .entry("logged_at")
            .or_insert_with(|| Value::from(Utc::now().to_rfc3339()));

        let parsed: ReviewLogEntry = serde_json::from_value(Value::Object(record))?;
        self.append_review_log(&parsed)?;
        Ok(parsed)
    }

    /// Logged reviews of a learner, newest first, optionally for one card
    pub fn review_log(
        &self,
        user_id: Option<&str>,
        card_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ReviewLogEntry>> {
        let user = normalise_user_id(user_id);
        let payloads: Vec<String> = {
            let reader = self.lock_reader()?;
            let mut stmt = reader.prepare(
                "SELECT payload FROM review_log
                 WHERE user_id = ?1 AND (?2 IS NULL OR card_id = ?2)
                 ORDER BY logged_at DESC, rowid DESC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![user, card_id, limit as i64], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        payloads
            .iter()
            .map(|payload| serde_json::from_str(payload).map_err(StorageError::from))
            .collect()
    }

    // ========================================================================
    // WORKFLOW
    // ========================================================================

    /// Grade a card and persist the result
    ///
    /// The updated state and its log entry are written in one transaction;
    /// if grading fails nothing is written.
    pub fn submit_grade(
        &self,
        scheduler: &FSRSScheduler,
        state: &CardState,
        grade: &str,
        user_id: Option<&str>,
        event_time: Option<DateTime<Utc>>,
        weights_version: Option<&str>,
    ) -> Result<SubmittedReview> {
        let event_time = event_time.unwrap_or_else(Utc::now);
        let mut outcome = scheduler.review(state, grade, event_time, weights_version)?;

        let user = normalise_user_id(user_id.or(state.user_id.as_deref()));
        outcome.state.user_id = Some(user.clone());
        outcome.diagnostics.after_state.user_id = Some(user.clone());
        let log_entry = ReviewLogEntry::from_outcome(&user, &outcome);

        {
            let mut writer = self.lock_writer()?;
            let tx = writer.transaction()?;
            upsert_state(&tx, &user, &outcome.state)?;
            insert_log(&tx, &log_entry)?;
            tx.commit()?;
        }

        tracing::debug!(
            user_id = %user,
            card_id = %outcome.state.card_id,
            grade = %log_entry.grade,
            interval_days = log_entry.interval_days,
            "Recorded review"
        );

        Ok(SubmittedReview { outcome, log_entry })
    }

    /// Cards of the given decks with the learner's stored scheduling state
    /// laid over them
    ///
    /// Decks supply word, definition and example; stored state supplies
    /// everything else. Cards are matched by card id, then by word.
    pub fn session_cards<P: AsRef<Path>>(
        &self,
        deck_paths: impl IntoIterator<Item = P>,
        user_id: Option<&str>,
    ) -> Result<Vec<CardState>> {
        let user = normalise_user_id(user_id);
        let stored = self.load_card_states(Some(user.as_str()))?;
        let by_word: HashMap<&str, &CardState> =
            stored.values().map(|s| (s.word.as_str(), s)).collect();

        let mut cards = Vec::new();
        for path in deck_files(deck_paths)? {
            for card in load_deck(&path)? {
                let known = stored
                    .get(&card.card_id)
                    .or_else(|| by_word.get(card.word.as_str()).copied());
                let merged = match known {
                    Some(state) => {
                        let mut state = state.clone();
                        if !card.definition.is_empty() {
                            state.definition = card.definition;
                        }
                        if !card.example.is_empty() {
                            state.example = card.example;
                        }
                        state.word = card.word;
                        state
                    }
                    None => {
                        let mut card = card;
                        card.user_id = Some(user.clone());
                        card
                    }
                };
                cards.push(merged);
            }
        }
        Ok(cards)
    }

    /// Seed the store from deck files
    ///
    /// Missing phases stay `new`; learning/review cards without a due time
    /// become due at `now`; cards without a weight version get
    /// `default_w_version`. Cards the learner already has state for are
    /// skipped so re-importing a deck never resets progress.
    pub fn import_decks<P: AsRef<Path>>(
        &self,
        deck_paths: impl IntoIterator<Item = P>,
        user_id: Option<&str>,
        default_w_version: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ImportSummary> {
        let user = normalise_user_id(user_id);
        let files = deck_files(deck_paths)?;

        // Parse everything before taking the writer so a bad deck aborts cleanly
        let mut decks = Vec::with_capacity(files.len());
        for path in &files {
            let name = list_info(path)?.and_then(|info| info.name);
            decks.push((path, name, load_deck(path)?));
        }

        let mut summary = ImportSummary {
            decks: files.clone(),
            ..Default::default()
        };

        let mut writer = self.lock_writer()?;
        let tx = writer.transaction()?;
        for (path, name, cards) in decks {
            let deck_size = cards.len() as i64;
            for mut card in cards {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM card_states WHERE user_id = ?1 AND card_id = ?2)",
                    params![user, card.card_id],
                    |row| row.get(0),
                )?;
                if exists {
                    summary.skipped += 1;
                    continue;
                }

                if card.w_version.is_none() {
                    card.w_version = default_w_version.map(str::to_string);
                }
                if card.due_at.is_none() && matches!(card.phase, Phase::Learning | Phase::Review)
                {
                    card.due_at = Some(now);
                }
                card.user_id = Some(user.clone());
                upsert_state(&tx, &user, &card)?;
                summary.imported += 1;
            }

            tx.execute(
                "INSERT INTO imported_decks (user_id, path, name, card_count, imported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, path) DO UPDATE SET
                    name = excluded.name,
                    card_count = excluded.card_count,
                    imported_at = excluded.imported_at",
                params![
                    user,
                    path.display().to_string(),
                    name,
                    deck_size,
                    now.to_rfc3339()
                ],
            )?;
        }
        tx.commit()?;

        tracing::info!(
            user_id = %user,
            decks = summary.decks.len(),
            imported = summary.imported,
            skipped = summary.skipped,
            "Imported decks"
        );
        Ok(summary)
    }

    // ========================================================================
    // STATS
    // ========================================================================

    /// Counts for one learner at `now`
    pub fn stats(&self, user_id: Option<&str>, now: DateTime<Utc>) -> Result<StoreStats> {
        let user = normalise_user_id(user_id);
        let reader = self.lock_reader()?;

        let mut stats = StoreStats {
            user_id: user.clone(),
            ..Default::default()
        };

        let mut stmt = reader
            .prepare("SELECT phase, COUNT(*) FROM card_states WHERE user_id = ?1 GROUP BY phase")?;
        let rows = stmt.query_map(params![user], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (phase, count) = row?;
            stats.total_cards += count;
            match phase.parse::<Phase>() {
                Ok(Phase::New) => stats.new_cards += count,
                Ok(Phase::Learning) => stats.learning_cards += count,
                Ok(Phase::Review) => stats.review_cards += count,
                Ok(Phase::Relearning) => stats.relearning_cards += count,
                Err(e) => tracing::warn!(phase = %phase, "Unrecognised stored phase: {}", e),
            }
        }

        stats.due_now = reader.query_row(
            "SELECT COUNT(*) FROM card_states
             WHERE user_id = ?1 AND phase != 'new' AND (due_at IS NULL OR due_at <= ?2)",
            params![user, now.to_rfc3339()],
            |row| row.get(0),
        )?;

        let (logged, lapses): (i64, i64) = reader.query_row(
            "SELECT COUNT(*), COALESCE(SUM(success = 0), 0) FROM review_log WHERE user_id = ?1",
            params![user],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        stats.reviews_logged = logged;
        stats.lapses_logged = lapses;

        stats.decks_imported = reader.query_row(
            "SELECT COUNT(*) FROM imported_decks WHERE user_id = ?1",
            params![user],
            |row| row.get(0),
        )?;

        Ok(stats)
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Database Migrations
//!
//! Schema migration definitions for the storage layer.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: card state store and review log",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Imported deck registry",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
-- One row per (learner, card); `state` holds the full storage record as JSON.
-- phase / due_at / w_version are denormalised for due queries and stats.
CREATE TABLE IF NOT EXISTS card_states (
    user_id TEXT NOT NULL,
    card_id TEXT NOT NULL,
    word TEXT NOT NULL,
    phase TEXT NOT NULL DEFAULT 'new',
    due_at TEXT,
    w_version TEXT,
    state TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, card_id)
);

CREATE INDEX IF NOT EXISTS idx_card_states_due ON card_states(user_id, due_at);
CREATE INDEX IF NOT EXISTS idx_card_states_word ON card_states(user_id, word);

-- Append-only; rows are never updated
CREATE TABLE IF NOT EXISTS review_log (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    card_id TEXT NOT NULL,
    grade TEXT NOT NULL,
    interval_days INTEGER NOT NULL,
    success INTEGER NOT NULL,
    w_version TEXT NOT NULL,
    retrievability REAL,
    short_term_delay_seconds INTEGER,
    event_time TEXT,
    logged_at TEXT NOT NULL,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_review_log_card ON review_log(user_id, card_id, logged_at);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Imported deck registry
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS imported_decks (
    user_id TEXT NOT NULL,
    path TEXT NOT NULL,
    name TEXT,
    card_count INTEGER NOT NULL DEFAULT 0,
    imported_at TEXT NOT NULL,
    PRIMARY KEY (user_id, path)
);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}

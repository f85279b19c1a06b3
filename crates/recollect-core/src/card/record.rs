//! Storage records
//!
//! Conversion between [`CardState`] and the JSON objects persisted by decks
//! and the state store. Reading is lenient about legacy keys
//! (`definition:`, `due`, `last_review`, `reviews`) and timestamp encodings;
//! writing always emits the canonical keys.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use super::{CardState, Phase};

/// A persisted field could not be parsed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Malformed card state field '{field}': {reason}")]
pub struct MalformedStateError {
    /// Record key that failed
    pub field: String,
    /// What was wrong with it
    pub reason: String,
}

impl MalformedStateError {
    pub(crate) fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

const KNOWN_KEYS: &[&str] = &[
    "word",
    "user_id",
    "definition",
    "definition:",
    "example",
    "example:",
    "card_id",
    "stability",
    "difficulty",
    "due",
    "due_at",
    "last_review",
    "last_review_at",
    "phase",
    "lapses",
    "repetitions",
    "reviews",
    "same_day_success",
    "last_success_at",
    "w_version",
    "new_buried",
    "history",
    "custom_data",
    "metadata",
];

/// Parse a persisted timestamp
///
/// Accepts RFC 3339, naive ISO-8601 (taken as UTC), bare dates, and POSIX
/// seconds. `null`, `""` and `0` mean "no timestamp".
pub fn parse_timestamp(
    field: &str,
    value: &Value,
) -> Result<Option<DateTime<Utc>>, MalformedStateError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(Some(dt.with_timezone(&Utc)));
            }
            for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Ok(Some(naive.and_utc()));
                }
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                    return Ok(Some(naive.and_utc()));
                }
            }
            Err(MalformedStateError::new(
                field,
                format!("unparseable timestamp '{}'", s),
            ))
        }
        Value::Number(n) => {
            let seconds = n
                .as_f64()
                .ok_or_else(|| MalformedStateError::new(field, "timestamp out of range"))?;
            if seconds == 0.0 {
                return Ok(None);
            }
            let whole = seconds.floor();
            let nanos = (seconds.rem_euclid(1.0) * 1e9).round() as u32;
            let (whole, nanos) = if nanos >= 1_000_000_000 {
                (whole + 1.0, 0)
            } else {
                (whole, nanos)
            };
            DateTime::from_timestamp(whole as i64, nanos)
                .map(Some)
                .ok_or_else(|| {
                    MalformedStateError::new(field, format!("timestamp {} out of range", seconds))
                })
        }
        other => Err(MalformedStateError::new(
            field,
            format!("expected timestamp, found {}", other),
        )),
    }
}

fn parse_f64(field: &str, value: &Value) -> Result<f64, MalformedStateError> {
    let parsed = match value {
        Value::Null => Some(0.0),
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(MalformedStateError::new(
            field,
            format!("expected non-negative number, found {}", value),
        )),
    }
}

fn parse_count(field: &str, value: &Value) -> Result<u32, MalformedStateError> {
    let parsed = match value {
        Value::Null => Some(0),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| {
            MalformedStateError::new(field, format!("expected non-negative integer, found {}", value))
        })
}

fn parse_text(field: &str, value: &Value) -> Result<String, MalformedStateError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(MalformedStateError::new(
            field,
            format!("expected text, found {}", other),
        )),
    }
}

fn parse_object(field: &str, value: &Value) -> Result<Map<String, Value>, MalformedStateError> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        other => Err(MalformedStateError::new(
            field,
            format!("expected object, found {}", other),
        )),
    }
}

fn parse_history(value: &Value) -> Result<Vec<Map<String, Value>>, MalformedStateError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(entries) => Ok(entries
            .iter()
            .map(|entry| match entry {
                Value::Object(map) => map.clone(),
                other => {
                    let mut wrapped = Map::new();
                    wrapped.insert("value".to_string(), other.clone());
                    wrapped
                }
            })
            .collect()),
        other => Err(MalformedStateError::new(
            "history",
            format!("expected list, found {}", other),
        )),
    }
}

fn non_empty(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    })
}

fn format_timestamp(value: Option<DateTime<Utc>>) -> Value {
    value.map_or(Value::Null, |dt| Value::String(dt.to_rfc3339()))
}

/// Parse every field, collecting problems instead of stopping at the first
fn parse_record(word: &str, payload: &Map<String, Value>) -> (CardState, Vec<MalformedStateError>) {
    let mut errors = Vec::new();
    let mut card = CardState::new(word, "", "");

    macro_rules! field {
        ($parse:expr, $default:expr) => {
            match $parse {
                Ok(value) => value,
                Err(err) => {
                    errors.push(err);
                    $default
                }
            }
        };
    }

    if let Some(v) = non_empty(payload.get("definition")).or_else(|| payload.get("definition:")) {
        card.definition = field!(parse_text("definition", v), String::new());
    }
    if let Some(v) = non_empty(payload.get("example")).or_else(|| payload.get("example:")) {
        card.example = field!(parse_text("example", v), String::new());
    }
    if let Some(Value::String(id)) = non_empty(payload.get("card_id")) {
        card.card_id = id.clone();
    }
    if let Some(Value::String(user)) = non_empty(payload.get("user_id")) {
        card.user_id = Some(user.clone());
    }

    if let Some(v) = payload.get("stability") {
        card.stability = field!(parse_f64("stability", v), 0.0);
    }
    if let Some(v) = payload.get("difficulty") {
        card.difficulty = field!(parse_f64("difficulty", v), 0.0);
    }

    if let Some(v) = payload.get("due_at").or_else(|| payload.get("due")) {
        card.due_at = field!(parse_timestamp("due_at", v), None);
    }
    if let Some(v) = payload.get("last_review_at").or_else(|| payload.get("last_review")) {
        card.last_review_at = field!(parse_timestamp("last_review_at", v), None);
    }
    if let Some(v) = payload.get("last_success_at") {
        card.last_success_at = field!(parse_timestamp("last_success_at", v), None);
    }

    if let Some(v) = payload.get("phase") {
        card.phase = match v {
            Value::Null => Phase::New,
            Value::String(s) => field!(s.parse::<Phase>(), Phase::New),
            other => {
                errors.push(MalformedStateError::new(
                    "phase",
                    format!("expected text, found {}", other),
                ));
                Phase::New
            }
        };
    }

    if let Some(v) = payload.get("repetitions").or_else(|| payload.get("reviews")) {
        card.repetitions = field!(parse_count("repetitions", v), 0);
    }
    if let Some(v) = payload.get("lapses") {
        card.lapses = field!(parse_count("lapses", v), 0);
    }
    if let Some(v) = payload.get("same_day_success") {
        card.same_day_success = field!(parse_count("same_day_success", v), 0);
    }

    card.w_version = match non_empty(payload.get("w_version")) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => {
            errors.push(MalformedStateError::new(
                "w_version",
                format!("expected text, found {}", other),
            ));
            None
        }
        None => None,
    };

    if let Some(v) = payload.get("new_buried") {
        card.new_buried = match v {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::Number(n) => n.as_i64().is_some_and(|i| i != 0),
            other => {
                errors.push(MalformedStateError::new(
                    "new_buried",
                    format!("expected boolean, found {}", other),
                ));
                false
            }
        };
    }

    if let Some(v) = payload.get("history") {
        card.history = field!(parse_history(v), Vec::new());
    }
    if let Some(v) = payload.get("custom_data") {
        card.custom_data = field!(parse_object("custom_data", v), Map::new());
    }
    if let Some(v) = payload.get("metadata") {
        card.metadata = field!(parse_object("metadata", v), Map::new());
    }

    for (key, value) in payload {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            card.metadata.insert(key.clone(), value.clone());
        }
    }

    (card, errors)
}

impl CardState {
    /// Build a card from a persisted record, substituting defaults for bad fields
    ///
    /// Every substitution is logged at `warn` level.
    pub fn from_storage(word: &str, payload: &Map<String, Value>) -> Self {
        let (card, errors) = parse_record(word, payload);
        for err in &errors {
            tracing::warn!(card_id = %card.card_id, "{}; using default", err);
        }
        card
    }

    /// Build a card from a persisted record, failing on the first bad field
    pub fn try_from_storage(
        word: &str,
        payload: &Map<String, Value>,
    ) -> Result<Self, MalformedStateError> {
        let (card, mut errors) = parse_record(word, payload);
        if errors.is_empty() {
            Ok(card)
        } else {
            Err(errors.swap_remove(0))
        }
    }

    /// Overlay fields present in `payload`, keeping everything else
    ///
    /// Used to lay stored scheduling state over freshly loaded deck content.
    pub fn update_from_storage(&mut self, payload: &Map<String, Value>) {
        let (parsed, errors) = parse_record(&self.word, payload);
        for err in &errors {
            tracing::warn!(card_id = %self.card_id, "{}; keeping default", err);
        }

        let has = |keys: &[&str]| keys.iter().any(|k| payload.contains_key(*k));

        if has(&["definition", "definition:"]) && !parsed.definition.is_empty() {
            self.definition = parsed.definition;
        }
        if has(&["example", "example:"]) && !parsed.example.is_empty() {
            self.example = parsed.example;
        }
        if has(&["card_id"]) {
            self.card_id = parsed.card_id;
        }
        if has(&["user_id"]) {
            self.user_id = parsed.user_id;
        }
        if has(&["stability"]) {
            self.stability = parsed.stability;
        }
        if has(&["difficulty"]) {
            self.difficulty = parsed.difficulty;
        }
        if has(&["due_at", "due"]) {
            self.due_at = parsed.due_at;
        }
        if has(&["last_review_at", "last_review"]) {
            self.last_review_at = parsed.last_review_at;
        }
        if has(&["last_success_at"]) {
            self.last_success_at = parsed.last_success_at;
        }
        if has(&["phase"]) {
            self.phase = parsed.phase;
        }
        if has(&["repetitions", "reviews"]) {
            self.repetitions = parsed.repetitions;
        }
        if has(&["lapses"]) {
            self.lapses = parsed.lapses;
        }
        if has(&["same_day_success"]) {
            self.same_day_success = parsed.same_day_success;
        }
        if has(&["w_version"]) {
            self.w_version = parsed.w_version;
        }
        if has(&["new_buried"]) {
            self.new_buried = parsed.new_buried;
        }
        if has(&["history"]) {
            self.history = parsed.history;
        }
        if has(&["custom_data"]) {
            self.custom_data = parsed.custom_data;
        }
        // Extras always land in metadata, so merge rather than replace
        for (key, value) in parsed.metadata {
            self.metadata.insert(key, value);
        }
    }

    /// Serialise into the canonical record layout
    pub fn to_storage_record(&self) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("word".into(), Value::String(self.word.clone()));
        record.insert("card_id".into(), Value::String(self.card_id.clone()));
        record.insert("definition".into(), Value::String(self.definition.clone()));
        record.insert("example".into(), Value::String(self.example.clone()));
        record.insert("stability".into(), serde_json::json!(self.stability));
        record.insert("difficulty".into(), serde_json::json!(self.difficulty));
        record.insert("due_at".into(), format_timestamp(self.due_at));
        record.insert("last_review_at".into(), format_timestamp(self.last_review_at));
        record.insert("phase".into(), Value::String(self.phase.as_str().to_string()));
        record.insert("repetitions".into(), Value::from(self.repetitions));
        record.insert("lapses".into(), Value::from(self.lapses));
        record.insert("same_day_success".into(), Value::from(self.same_day_success));
        record.insert("last_success_at".into(), format_timestamp(self.last_success_at));
        record.insert(
            "w_version".into(),
            self.w_version.clone().map_or(Value::Null, Value::String),
        );
        record.insert("new_buried".into(), Value::Bool(self.new_buried));
        record.insert(
            "history".into(),
            Value::Array(self.history.iter().cloned().map(Value::Object).collect()),
        );
        if !self.custom_data.is_empty() {
            record.insert("custom_data".into(), Value::Object(self.custom_data.clone()));
        }
        if !self.metadata.is_empty() {
            record.insert("metadata".into(), Value::Object(self.metadata.clone()));
        }
        record
    }
}

// ============================================================================
// TESTS
// ============================================================================

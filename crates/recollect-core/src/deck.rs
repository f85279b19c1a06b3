//! Deck files
//!
//! A deck is a JSON object mapping each word to its record. The reserved
//! `"XXX"` entry carries deck bookkeeping instead of a card:
//!
//! ```json
//! {
//!   "osmosis": { "definition": "passive transport", "example": "" },
//!   "XXX": { "Name": "biology", "CurrentNum": 1, "Completed": false, "Learning": false }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::card::CardState;

/// Key of the deck bookkeeping entry
pub const LIST_INFO_KEY: &str = "XXX";

/// Deck loading error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid deck JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Top-level value is not a word -> record mapping
    #[error("Deck {0} is not a JSON object")]
    NotAnObject(String),
}

/// Bookkeeping stored under [`LIST_INFO_KEY`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeckInfo {
    pub name: Option<String>,
    #[serde(default = "first_card")]
    pub current_num: u32,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub learning: bool,
}

fn first_card() -> u32 {
    1
}

impl DeckInfo {
    /// Fresh bookkeeping for a deck named after its file
    pub fn for_path(path: &Path) -> Self {
        Self {
            name: path.file_stem().map(|s| s.to_string_lossy().into_owned()),
            current_num: 1,
            completed: false,
            learning: false,
        }
    }
}

fn read(path: &Path) -> Result<String, DeckError> {
    std::fs::read_to_string(path).map_err(|source| DeckError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_object(raw: &str, name: &str) -> Result<Map<String, Value>, DeckError> {
    match serde_json::from_str(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(DeckError::NotAnObject(name.to_string())),
    }
}

fn cards_from_object(deck: &Map<String, Value>, name: &str) -> Vec<CardState> {
    deck.iter()
        .filter(|(word, _)| word.as_str() != LIST_INFO_KEY)
        .filter_map(|(word, record)| match record {
            Value::Object(payload) => Some(CardState::from_storage(word, payload)),
            _ => {
                tracing::warn!(deck = name, word = %word, "Skipping non-object deck entry");
                None
            }
        })
        .collect()
}

/// Cards of the deck at `path`, in file order
pub fn load_deck(path: impl AsRef<Path>) -> Result<Vec<CardState>, DeckError> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let deck = parse_object(&read(path)?, &name)?;
    let cards = cards_from_object(&deck, &name);
    tracing::debug!(deck = %name, cards = cards.len(), "Loaded deck");
    Ok(cards)
}

/// Cards of an in-memory deck
pub fn load_deck_str(raw: &str) -> Result<Vec<CardState>, DeckError> {
    let deck = parse_object(raw, "<memory>")?;
    Ok(cards_from_object(&deck, "<memory>"))
}

/// Deck bookkeeping, if the deck carries any
pub fn list_info(path: impl AsRef<Path>) -> Result<Option<DeckInfo>, DeckError> {
    let path = path.as_ref();
    let mut deck = parse_object(&read(path)?, &path.display().to_string())?;
    match deck.remove(LIST_INFO_KEY) {
        Some(info) => Ok(Some(serde_json::from_value(info)?)),
        None => Ok(None),
    }
}

/// Write `cards` as a fresh deck with default bookkeeping
pub fn write_deck(path: impl AsRef<Path>, cards: &[CardState]) -> Result<(), DeckError> {
    let path = path.as_ref();
    let mut deck = Map::new();
    for card in cards {
        let mut record = Map::new();
        record.insert("definition".into(), Value::from(card.definition.as_str()));
        record.insert("example".into(), Value::from(card.example.as_str()));
        record.insert("card_id".into(), Value::from(card.card_id.as_str()));
        deck.insert(card.word.clone(), Value::Object(record));
    }
    deck.insert(
        LIST_INFO_KEY.to_string(),
        serde_json::to_value(DeckInfo::for_path(path))?,
    );

    let io_err = |source| DeckError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&deck)?).map_err(io_err)
}

/// Every `*.json` deck under `paths`; directories are walked recursively
/// in sorted order, missing paths are skipped
pub fn deck_files<P: AsRef<Path>>(
    paths: impl IntoIterator<Item = P>,
) -> Result<Vec<PathBuf>, DeckError> {
    fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), DeckError> {
        let entries = std::fs::read_dir(dir).map_err(|source| DeckError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut children: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        children.sort();
        for child in children {
            if child.is_dir() {
                walk(&child, out)?;
            } else if is_json(&child) {
                out.push(child);
            }
        }
        Ok(())
    }

    fn is_json(path: &Path) -> bool {
        path.is_file() && path.extension().is_some_and(|ext| ext == "json")
    }

    let mut files = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            walk(path, &mut files)?;
        } else if is_json(path) {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

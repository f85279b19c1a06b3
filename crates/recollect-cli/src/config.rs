//! Runtime configuration
//!
//! Every option comes from a CLI flag, falling back to its environment
//! variable (handled by clap), then to a default resolved here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use recollect_core::{FSRSScheduler, Storage, WeightStore, DEFAULT_DAILY_NEW_CAP, DEFAULT_USER_ID};

/// Database file name inside the data directory
pub const DB_FILE_NAME: &str = "recollect.db";

/// Options as given on the command line / environment, before defaults
#[derive(Debug, Clone, Default)]
pub struct ConfigArgs {
    pub data_dir: Option<PathBuf>,
    pub weights_dir: Option<PathBuf>,
    pub user: Option<String>,
    pub daily_new_cap: Option<usize>,
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the database; `None` means the platform default
    pub data_dir: Option<PathBuf>,
    /// Directory of `<version>.json` weight files; `None` uses the built-in set
    pub weights_dir: Option<PathBuf>,
    pub user_id: String,
    pub daily_new_cap: usize,
}

impl Config {
    pub fn resolve(args: ConfigArgs) -> Self {
        let user_id = args
            .user
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_USER_ID.to_string());

        Self {
            data_dir: args.data_dir,
            weights_dir: args.weights_dir,
            user_id,
            daily_new_cap: args.daily_new_cap.unwrap_or(DEFAULT_DAILY_NEW_CAP),
        }
    }

    /// Database location: `<data_dir>/recollect.db`, or the platform default
    pub fn db_path(&self) -> Option<PathBuf> {
        self.data_dir.as_deref().map(|dir| dir.join(DB_FILE_NAME))
    }

    /// Human-readable data directory, for status output
    pub fn data_dir_display(&self) -> String {
        match &self.data_dir {
            Some(dir) => dir.display().to_string(),
            None => ProjectDirs::from("com", "recollect", "recollect")
                .map(|dirs| dirs.data_dir().display().to_string())
                .unwrap_or_else(|| "<unknown>".to_string()),
        }
    }

    pub fn open_storage(&self) -> Result<Storage> {
        let path = self.db_path();
        Storage::new(path.clone()).with_context(|| match path {
            Some(p) => format!("failed to open database at {}", p.display()),
            None => "failed to open default database".to_string(),
        })
    }

    pub fn weight_store(&self) -> Result<WeightStore> {
        match &self.weights_dir {
            Some(dir) => load_weights_dir(dir),
            None => Ok(WeightStore::builtin()),
        }
    }

    pub fn scheduler(&self) -> Result<FSRSScheduler> {
        Ok(FSRSScheduler::new(Arc::new(self.weight_store()?)))
    }

    pub fn user(&self) -> Option<&str> {
        Some(self.user_id.as_str())
    }
}

fn load_weights_dir(dir: &Path) -> Result<WeightStore> {
    WeightStore::from_dir(dir)
        .with_context(|| format!("failed to read weights from {}", dir.display()))
}

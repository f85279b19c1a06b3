//! Weight Store
//!
//! Versioned FSRS-6 parameter sets. Each set carries the 21 model weights,
//! the requested retention and the maximum interval. Sets are read from a
//! directory of JSON files (or supplied in memory) and cached by version for
//! the lifetime of the store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Number of weights in an FSRS-6 parameter set
pub const WEIGHT_COUNT: usize = 21;

/// Retention the base forgetting factor is anchored to
pub const BASE_RETENTION: f64 = 0.9;

/// Default requested retention when a weight file omits it
pub const DEFAULT_RETENTION: f64 = 0.9;

/// Default upper bound on scheduled intervals (days)
pub const DEFAULT_MAXIMUM_INTERVAL: u32 = 36_500;

/// Version id of the built-in parameter set
pub const DEFAULT_VERSION: &str = "fsrs_v1";

/// FSRS-6 default parameters (w0..w20)
pub const FSRS6_WEIGHTS: [f64; WEIGHT_COUNT] = [
    0.212, 1.2931, 2.3065, 8.2956, 6.4133, 0.8334, 3.0194, 0.001, 1.8722, 0.1666, 0.796, 1.4835,
    0.0614, 0.2629, 1.6483, 0.6014, 1.8729, 0.5425, 0.0912, 0.0658, 0.1542,
];

// ============================================================================
// ERRORS
// ============================================================================

/// Weight loading error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum WeightsError {
    /// A specific version was requested but no source provides it
    #[error("No weights found for version '{version}' in {location}")]
    NotFound { version: String, location: String },
    /// No version requested and the store has no sources at all
    #[error("No weight sources found in {0}")]
    NoSources(String),
    /// A source exists but does not describe a valid parameter set
    #[error("Malformed weights in {source_name}: {reason}")]
    Malformed { source_name: String, reason: String },
    /// IO error while scanning or reading sources
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Cache lock poisoned
    #[error("Weight cache lock poisoned")]
    Lock,
}

// ============================================================================
// WEIGHT CONFIG
// ============================================================================

/// An immutable, versioned FSRS-6 parameter set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightConfig {
    /// Version identifier recorded on every card this set schedules
    pub version: String,
    /// Model weights w0..w20
    pub weights: [f64; WEIGHT_COUNT],
    /// Target recall probability in (0, 1)
    pub request_retention: f64,
    /// Upper bound on scheduled intervals (days)
    pub maximum_interval: u32,
}

impl WeightConfig {
    /// Build a validated parameter set
    pub fn new(
        version: impl Into<String>,
        weights: &[f64],
        request_retention: f64,
        maximum_interval: u32,
    ) -> Result<Self, WeightsError> {
        let version = version.into();
        let malformed = |reason: String| WeightsError::Malformed {
            source_name: version.clone(),
            reason,
        };

        let weights: [f64; WEIGHT_COUNT] = weights.try_into().map_err(|_| {
            malformed(format!(
                "expected {} weights, found {}",
                WEIGHT_COUNT,
                weights.len()
            ))
        })?;
        if let Some(index) = weights.iter().position(|w| !w.is_finite()) {
            return Err(malformed(format!("weight w{} is not finite", index)));
        }
        if weights[20] <= 0.0 {
            return Err(malformed("decay weight w20 must be positive".to_string()));
        }
        if !(request_retention > 0.0 && request_retention < 1.0) {
            return Err(malformed(format!(
                "request_retention {} outside (0, 1)",
                request_retention
            )));
        }
        if maximum_interval == 0 {
            return Err(malformed("maximum_interval must be at least 1".to_string()));
        }

        Ok(Self {
            version,
            weights,
            request_retention,
            maximum_interval,
        })
    }

    /// The FSRS-6 default parameter set
    pub fn fsrs6_default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            weights: FSRS6_WEIGHTS,
            request_retention: DEFAULT_RETENTION,
            maximum_interval: DEFAULT_MAXIMUM_INTERVAL,
        }
    }

    /// Forgetting curve exponent (negative)
    #[inline]
    pub fn decay(&self) -> f64 {
        -self.weights[20]
    }

    /// Curve factor that puts retrievability at 90% when t == S
    #[inline]
    pub fn base_factor(&self) -> f64 {
        BASE_RETENTION.powf(1.0 / self.decay()) - 1.0
    }

    /// Curve factor for the requested retention
    #[inline]
    pub fn target_factor(&self) -> f64 {
        self.request_retention.powf(1.0 / self.decay()) - 1.0
    }
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self::fsrs6_default()
    }
}

/// On-disk layout of a weight file
#[derive(Debug, Deserialize)]
struct WeightFile {
    w_version: Option<String>,
    weights: Vec<f64>,
    request_retention: Option<f64>,
    maximum_interval: Option<u32>,
}

fn load_weight_file(path: &Path) -> Result<WeightConfig, WeightsError> {
    let raw = std::fs::read_to_string(path)?;
    let file: WeightFile = serde_json::from_str(&raw).map_err(|e| WeightsError::Malformed {
        source_name: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let version = file
        .w_version
        .filter(|v| !v.trim().is_empty())
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| DEFAULT_VERSION.to_string());

    WeightConfig::new(
        version,
        &file.weights,
        file.request_retention.unwrap_or(DEFAULT_RETENTION),
        file.maximum_interval.unwrap_or(DEFAULT_MAXIMUM_INTERVAL),
    )
    .map_err(|e| match e {
        WeightsError::Malformed { reason, .. } => WeightsError::Malformed {
            source_name: path.display().to_string(),
            reason,
        },
        other => other,
    })
}

// ============================================================================
// WEIGHT STORE
// ============================================================================

#[derive(Debug)]
enum WeightSource {
    File(PathBuf),
    Inline(Arc<WeightConfig>),
}

#[derive(Debug, Default)]
struct WeightCache {
    /// Parsed config per source index
    resolved: Vec<Option<Arc<WeightConfig>>>,
    by_version: HashMap<String, Arc<WeightConfig>>,
}

/// Read-through cache of weight sets
///
/// `load` takes `&self`, so a store can be shared behind an `Arc`.
#[derive(Debug)]
pub struct WeightStore {
    location: String,
    sources: Vec<WeightSource>,
    cache: Mutex<WeightCache>,
}

impl WeightStore {
    fn with_sources(location: String, sources: Vec<WeightSource>) -> Self {
        let cache = WeightCache {
            resolved: vec![None; sources.len()],
            by_version: HashMap::new(),
        };
        Self {
            location,
            sources,
            cache: Mutex::new(cache),
        }
    }

    /// Store backed by every `*.json` file in `dir`, in path order
    ///
    /// A missing directory yields an empty store.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, WeightsError> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        if dir.is_dir() {
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                let is_json = path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
                if path.is_file() && is_json {
                    files.push(path);
                }
            }
        }
        files.sort();

        tracing::debug!(dir = %dir.display(), files = files.len(), "Scanned weight directory");

        Ok(Self::with_sources(
            dir.display().to_string(),
            files.into_iter().map(WeightSource::File).collect(),
        ))
    }

    /// In-memory store; the first config is the default
    pub fn from_configs(configs: impl IntoIterator<Item = WeightConfig>) -> Self {
        Self::with_sources(
            "<memory>".to_string(),
            configs
                .into_iter()
                .map(|c| WeightSource::Inline(Arc::new(c)))
                .collect(),
        )
    }

    /// Store holding only the FSRS-6 default set
    pub fn builtin() -> Self {
        Self::from_configs([WeightConfig::fsrs6_default()])
    }

    /// Number of configured sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True when the store has no sources
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Load a parameter set by version, or the first available one
    pub fn load(&self, version: Option<&str>) -> Result<Arc<WeightConfig>, WeightsError> {
        match version {
            Some(version) => {
                if let Some(hit) = self.lock()?.by_version.get(version) {
                    return Ok(Arc::clone(hit));
                }
                for index in 0..self.sources.len() {
                    let config = self.resolve(index)?;
                    if config.version == version {
                        return Ok(config);
                    }
                }
                Err(WeightsError::NotFound {
                    version: version.to_string(),
                    location: self.location.clone(),
                })
            }
            None => {
                if self.sources.is_empty() {
                    return Err(WeightsError::NoSources(self.location.clone()));
                }
                self.resolve(0)
            }
        }
    }

    /// All versions provided by the store, in source order
    pub fn versions(&self) -> Result<Vec<String>, WeightsError> {
        (0..self.sources.len())
            .map(|index| self.resolve(index).map(|c| c.version.clone()))
            .collect()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, WeightCache>, WeightsError> {
        self.cache.lock().map_err(|_| WeightsError::Lock)
    }

    fn resolve(&self, index: usize) -> Result<Arc<WeightConfig>, WeightsError> {
        if let Some(config) = &self.lock()?.resolved[index] {
            return Ok(Arc::clone(config));
        }

        let config = match &self.sources[index] {
            WeightSource::File(path) => {
                let config = Arc::new(load_weight_file(path)?);
                tracing::debug!(
                    version = %config.version,
                    path = %path.display(),
                    "Loaded weight file"
                );
                config
            }
            WeightSource::Inline(config) => Arc::clone(config),
        };

        let mut cache = self.lock()?;
        cache.resolved[index] = Some(Arc::clone(&config));
        cache
            .by_version
            .entry(config.version.clone())
            .or_insert_with(|| Arc::clone(&config));
        Ok(config)
    }
}

impl Default for WeightStore {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// TESTS
// ============================================================================

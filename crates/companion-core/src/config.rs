use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CompanionError, Result};
use crate::types::PetState;

/// Top-level configuration for the companion engine.
///
/// Loaded from `~/.companion/config.toml` by default. Each section corresponds
/// to one component of the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanionConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub rhythm: RhythmConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

impl CompanionConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CompanionConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CompanionError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the strategy catalog and exports.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.companion/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Behavior scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Base interval for the next-schedule hint, before multipliers.
    pub base_interval_ms: u64,
    /// Consult the static state/emotion table when no strategy matches.
    pub use_legacy_fallback: bool,
    /// Register the emotion-driven and time-aware capability rules.
    pub builtin_rules: bool,
    /// Register the stock strategy records on startup.
    pub default_strategies: bool,
    /// States whose overlapping calls for the same emotion are rejected.
    pub exclusive_states: Vec<PetState>,
    /// Intensity used when no emotion source is attached.
    pub default_intensity: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 5_000,
            use_legacy_fallback: true,
            builtin_rules: true,
            default_strategies: true,
            exclusive_states: Vec::new(),
            default_intensity: 0.7,
        }
    }
}

/// Rhythm adaptation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmConfig {
    /// Interactions per minute at or above which the user counts as busy.
    pub high_frequency_threshold: u32,
    /// Interactions per minute below which the user counts as quiet.
    pub low_frequency_threshold: u32,
    /// Milliseconds without interaction before calm or sleepy moods slow down.
    pub idle_threshold_ms: u64,
    /// Number of recent emotions kept.
    pub emotion_history_window: usize,
    /// Window over which the interaction rate is measured.
    pub rate_window_ms: u64,
    /// How long interaction timestamps are retained.
    pub retention_ms: u64,
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            high_frequency_threshold: 3,
            low_frequency_threshold: 1,
            idle_threshold_ms: 15_000,
            emotion_history_window: 10,
            rate_window_ms: 60_000,
            retention_ms: 120_000,
        }
    }
}

/// Persisted strategy catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON catalog file. Empty means no persisted catalog.
    pub path: String,
    /// Watch the catalog file and reload it on change.
    pub hot_reload: bool,
    /// How often the watcher checks the file.
    pub poll_interval_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            hot_reload: true,
            poll_interval_ms: 500,
        }
    }
}

/// Event bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel capacity; slow subscribers lag past this.
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

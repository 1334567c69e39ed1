//! CLI argument definitions for the companion binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::{Path, PathBuf};

/// Desktop companion behavior engine: decide and run behaviors for a pet state.
#[derive(Parser, Debug)]
#[command(name = "companion", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Strategy catalog JSON file.
    #[arg(long = "catalog")]
    pub catalog: Option<PathBuf>,

    /// Pet state to schedule for (idle, hover, awaken, control).
    #[arg(short = 's', long = "state", default_value = "idle")]
    pub state: String,

    /// Current emotion (happy, calm, excited, curious, sleepy, focused).
    #[arg(short = 'e', long = "emotion", default_value = "calm")]
    pub emotion: String,

    /// Emotion intensity, 0.0-1.0.
    #[arg(short = 'i', long = "intensity")]
    pub intensity: Option<f64>,

    /// Write the strategy catalog to this file and exit.
    #[arg(long = "export")]
    pub export: Option<PathBuf>,

    /// Keep running: reschedule at each hint and hot-reload the catalog until Ctrl-C.
    #[arg(short = 'w', long = "watch")]
    pub watch: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > COMPANION_CONFIG env var > ~/.companion/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("COMPANION_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log filter directive.
    ///
    /// Priority: --log-level flag > RUST_LOG env var > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if let Ok(filter) = std::env::var("RUST_LOG") {
            if !filter.trim().is_empty() {
                return filter;
            }
        }
        config_level.to_string()
    }

    /// Resolve the catalog file.
    ///
    /// Priority: --catalog flag > config path. A relative config path is taken
    /// from the data directory. `None` if neither is set.
    pub fn resolve_catalog_path(&self, config_path: &str, data_dir: &Path) -> Option<PathBuf> {
        if let Some(ref p) = self.catalog {
            return Some(p.clone());
        }
        if config_path.trim().is_empty() {
            return None;
        }
        let path = expand_home(config_path);
        if path.is_absolute() {
            Some(path)
        } else {
            Some(data_dir.join(path))
        }
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".companion").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".companion").join("config.toml");
    }
    PathBuf::from("config.toml")
}

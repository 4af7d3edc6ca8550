//! Daemon configuration: a TOML file in the data directory plus CLI/env
//! overrides. The loaded config object is passed explicitly at startup;
//! business logic never reads ambient environment state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_LOG: &str = "info";
const DEFAULT_RESET_HOUR: u32 = 0;

// ─── SweepConfig ──────────────────────────────────────────────────────────────

/// Daily reset sweep configuration (`[sweep]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Local hour (0-23) of the daily reset boundary. Default: 0 (midnight).
    pub reset_hour: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            reset_hour: DEFAULT_RESET_HOUR,
        }
    }
}

// ─── PruneConfig ──────────────────────────────────────────────────────────────

/// Activity log retention (`[prune]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PruneConfig {
    /// Days of activity log to keep when pruning. 0 disables pruning.
    pub activity_retention_days: u32,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            activity_retention_days: 0,
        }
    }
}

// ─── HabitdConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HabitdConfig {
    /// Data directory for the SQLite database.
    pub data_dir: PathBuf,
    /// Log filter (trace, debug, info, warn, error).
    pub log: String,
    pub sweep: SweepConfig,
    pub prune: PruneConfig,
}

impl Default for HabitdConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log: DEFAULT_LOG.to_string(),
            sweep: SweepConfig::default(),
            prune: PruneConfig::default(),
        }
    }
}

impl HabitdConfig {
    /// Load `config.toml` from `path` if it exists; defaults otherwise.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let text = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&text)?)
        } else {
            Ok(Self::default())
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join(".local/share/habitd"))
        .unwrap_or_else(|| PathBuf::from("habitd-data"))
}

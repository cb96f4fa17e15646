//! Configuration management for convoy
//!
//! The reconciliation heuristics (merge thresholds, staleness delay, debounce)
//! are tuned empirically, so they live here instead of being hard-coded.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub merge: MergeConfig,
    pub activity: ActivityConfig,
    pub selection: SelectionConfig,
    pub cache: CacheConfig,
    pub polling: PollingConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

/// Thresholds for coalescing streamed agent fragments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MergeConfig {
    /// Longest fragment (in chars) that may still be glued onto the previous block
    pub max_fragment_runes: usize,
    /// Upper bound on the combined block length after a merge
    pub max_combined_runes: usize,
    /// Largest gap between fragment timestamps that still counts as one paragraph
    pub max_gap_ms: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_fragment_runes: 96,
            max_combined_runes: 1200,
            max_gap_ms: 1200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActivityConfig {
    /// How long an active request may go without a visible update before
    /// the history is refreshed out of band
    pub stale_refresh_delay_ms: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            stale_refresh_delay_ms: 10_000,
        }
    }
}

impl ActivityConfig {
    pub fn stale_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.stale_refresh_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectionConfig {
    /// Delay before a session selection triggers a history load
    pub load_debounce_ms: u64,
    /// Maximum back/forward entries kept
    pub history_limit: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            load_debounce_ms: 40,
            history_limit: 200,
        }
    }
}

impl SelectionConfig {
    pub fn load_debounce(&self) -> Duration {
        Duration::from_millis(self.load_debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Transcripts kept in memory; least recently focused ones are evicted first
    pub max_cached_sessions: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cached_sessions: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    /// Reducer tick cadence (staleness checks, meta polling)
    pub tick_interval_ms: u64,
    /// Minimum spacing between session-meta polls while runs are outstanding
    pub meta_poll_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 250,
            meta_poll_interval_ms: 3_000,
        }
    }
}

impl PollingConfig {
    /// Never zero; a zero period would spin the tick loop
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn meta_poll_interval(&self) -> Duration {
        Duration::from_millis(self.meta_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Provider assumed for sessions whose metadata has not been polled yet
    pub default_provider: String,
    /// Where selection/draft state is persisted (defaults to the data dir)
    pub state_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_provider: "codex".to_string(),
            state_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "convoy_cli=info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Reject values the runtime cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.polling.tick_interval_ms == 0 {
            bail!("polling.tick_interval_ms must be at least 1");
        }
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "convoy") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Resolve where the persisted app state lives
    pub fn state_file(&self) -> PathBuf {
        if let Some(path) = &self.client.state_file {
            return path.clone();
        }
        directories::ProjectDirs::from("", "", "convoy")
            .map(|dirs| dirs.data_dir().join("app_state.json"))
            .unwrap_or_else(|| PathBuf::from("app_state.json"))
    }

    /// Save configuration to the given path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save configuration to default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }
}

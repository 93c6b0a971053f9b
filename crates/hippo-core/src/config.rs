//! Configuration management for hippo.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. `HIPPO_CONFIG` (explicit config file path)
//! 2. Config file (`$HIPPO_DIR/config.toml`, default `~/.hippo/config.toml`)
//! 3. Default values

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub working: WorkingConfig,

    #[serde(default)]
    pub episode: EpisodeConfig,

    #[serde(default)]
    pub patterns: PatternConfig,

    #[serde(default)]
    pub semantic: SemanticConfig,

    #[serde(default)]
    pub reinforcement: ReinforcementConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Maximum records processed per chunk in batch stages
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingConfig {
    /// TTL applied when a record is ingested without one
    #[serde(default = "default_ttl_hours")]
    pub default_ttl_hours: i64,

    /// Minimum importance (1-10) for promotion to an episode
    #[serde(default = "default_promotion_min_importance")]
    pub promotion_min_importance: u8,

    /// Settling delay before a record may be promoted
    #[serde(default = "default_settle_minutes")]
    pub settle_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeConfig {
    /// Participant name used when a record has no speaker
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// Counterpart name for the two-party convention
    #[serde(default = "default_user_name")]
    pub user_name: String,

    /// Maximum characters of content kept in a derived summary
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,

    /// Upper bound on the optional summarizer call
    #[serde(default = "default_summarizer_timeout_ms")]
    pub summarizer_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Trailing window scanned by the weekly stage
    #[serde(default = "default_window_days")]
    pub window_days: i64,

    /// A group needs at least this many episodes to count as a pattern
    #[serde(default = "default_min_frequency")]
    pub min_frequency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticConfig {
    #[serde(default = "default_initial_confidence_base")]
    pub initial_confidence_base: f64,

    #[serde(default = "default_initial_confidence_per_occurrence")]
    pub initial_confidence_per_occurrence: f64,

    #[serde(default = "default_initial_confidence_cap")]
    pub initial_confidence_cap: f64,

    /// Fraction of the remaining headroom gained per merge
    #[serde(default = "default_confidence_growth")]
    pub confidence_growth: f64,

    /// Merges never push confidence past this value
    #[serde(default = "default_confidence_cap")]
    pub confidence_cap: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinforcementConfig {
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,

    #[serde(default = "default_inactivity_days")]
    pub inactivity_days: i64,

    #[serde(default = "default_strength_step")]
    pub strength_step: f64,

    #[serde(default = "default_confidence_step")]
    pub confidence_step: f64,

    /// Decay rate assigned to new units
    #[serde(default = "default_decay_rate")]
    pub default_decay_rate: f64,

    /// Confidence loses `decay_rate * confidence_decay_ratio` per decay
    #[serde(default = "default_confidence_decay_ratio")]
    pub confidence_decay_ratio: f64,

    #[serde(default = "default_strength_floor")]
    pub strength_floor: f64,

    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,

    /// Activation strength of a freshly created fact
    #[serde(default = "default_initial_activation")]
    pub initial_activation: f64,

    /// A unit decays at most once within this many hours
    #[serde(default = "default_min_tick_hours")]
    pub min_tick_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_days")]
    pub older_than_days: i64,

    /// Only archive episodes whose pattern has been merged
    #[serde(default)]
    pub require_folded: bool,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("HIPPO_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hippo")
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("hippo.db")
}

fn default_batch_size() -> usize {
    200
}

fn default_ttl_hours() -> i64 {
    24
}

fn default_promotion_min_importance() -> u8 {
    7
}

fn default_settle_minutes() -> i64 {
    60
}

fn default_agent_name() -> String {
    "assistant".to_string()
}

fn default_user_name() -> String {
    "user".to_string()
}

fn default_summary_max_chars() -> usize {
    200
}

fn default_summarizer_timeout_ms() -> u64 {
    5_000
}

fn default_window_days() -> i64 {
    7
}

fn default_min_frequency() -> usize {
    2
}

fn default_initial_confidence_base() -> f64 {
    0.5
}

fn default_initial_confidence_per_occurrence() -> f64 {
    0.05
}

fn default_initial_confidence_cap() -> f64 {
    0.8
}

fn default_confidence_growth() -> f64 {
    0.05
}

fn default_confidence_cap() -> f64 {
    0.95
}

fn default_lookback_days() -> i64 {
    7
}

fn default_inactivity_days() -> i64 {
    30
}

fn default_strength_step() -> f64 {
    0.02
}

fn default_confidence_step() -> f64 {
    0.01
}

fn default_decay_rate() -> f64 {
    0.05
}

fn default_confidence_decay_ratio() -> f64 {
    0.5
}

fn default_strength_floor() -> f64 {
    0.1
}

fn default_confidence_floor() -> f64 {
    0.3
}

fn default_initial_activation() -> f64 {
    0.5
}

fn default_min_tick_hours() -> i64 {
    12
}

fn default_archive_days() -> i64 {
    90
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for WorkingConfig {
    fn default() -> Self {
        Self {
            default_ttl_hours: default_ttl_hours(),
            promotion_min_importance: default_promotion_min_importance(),
            settle_minutes: default_settle_minutes(),
        }
    }
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            user_name: default_user_name(),
            summary_max_chars: default_summary_max_chars(),
            summarizer_timeout_ms: default_summarizer_timeout_ms(),
        }
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            min_frequency: default_min_frequency(),
        }
    }
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            initial_confidence_base: default_initial_confidence_base(),
            initial_confidence_per_occurrence: default_initial_confidence_per_occurrence(),
            initial_confidence_cap: default_initial_confidence_cap(),
            confidence_growth: default_confidence_growth(),
            confidence_cap: default_confidence_cap(),
        }
    }
}

impl Default for ReinforcementConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            inactivity_days: default_inactivity_days(),
            strength_step: default_strength_step(),
            confidence_step: default_confidence_step(),
            default_decay_rate: default_decay_rate(),
            confidence_decay_ratio: default_confidence_decay_ratio(),
            strength_floor: default_strength_floor(),
            confidence_floor: default_confidence_floor(),
            initial_activation: default_initial_activation(),
            min_tick_hours: default_min_tick_hours(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            older_than_days: default_archive_days(),
            require_folded: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            working: WorkingConfig::default(),
            episode: EpisodeConfig::default(),
            patterns: PatternConfig::default(),
            semantic: SemanticConfig::default(),
            reinforcement: ReinforcementConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the resolved config path, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load and validate configuration from a specific TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("HIPPO_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Reject constants that would break the engine's invariants.
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| -> Result<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(Error::Config(format!("{} must be within [0, 1], got {}", name, v)))
            }
        };

        if self.storage.batch_size == 0 {
            return Err(Error::Config("storage.batch_size must be positive".into()));
        }
        if !(1..=10).contains(&self.working.promotion_min_importance) {
            return Err(Error::Config(
                "working.promotion_min_importance must be within 1..=10".into(),
            ));
        }
        if self.patterns.min_frequency < 2 {
            return Err(Error::Config(
                "patterns.min_frequency must be at least 2".into(),
            ));
        }

        unit("semantic.initial_confidence_base", self.semantic.initial_confidence_base)?;
        unit("semantic.initial_confidence_cap", self.semantic.initial_confidence_cap)?;
        unit("semantic.confidence_growth", self.semantic.confidence_growth)?;
        unit("semantic.confidence_cap", self.semantic.confidence_cap)?;
        unit("reinforcement.strength_step", self.reinforcement.strength_step)?;
        unit("reinforcement.confidence_step", self.reinforcement.confidence_step)?;
        unit("reinforcement.default_decay_rate", self.reinforcement.default_decay_rate)?;
        unit("reinforcement.confidence_decay_ratio", self.reinforcement.confidence_decay_ratio)?;
        unit("reinforcement.strength_floor", self.reinforcement.strength_floor)?;
        unit("reinforcement.confidence_floor", self.reinforcement.confidence_floor)?;
        unit("reinforcement.initial_activation", self.reinforcement.initial_activation)?;

        // Every span must be representable once added to, or taken from, "now"
        let days = 1..=MAX_SPAN_DAYS;
        let hours = 1..=MAX_SPAN_DAYS * 24;
        let delay_hours = 0..=MAX_SPAN_DAYS * 24;
        let delay_minutes = 0..=MAX_SPAN_DAYS * 24 * 60;
        let working = &self.working;
        let reinforcement = &self.reinforcement;
        bounded("working.default_ttl_hours", working.default_ttl_hours, &hours)?;
        bounded("working.settle_minutes", working.settle_minutes, &delay_minutes)?;
        bounded("patterns.window_days", self.patterns.window_days, &days)?;
        bounded("reinforcement.lookback_days", reinforcement.lookback_days, &days)?;
        bounded("reinforcement.inactivity_days", reinforcement.inactivity_days, &days)?;
        bounded("reinforcement.min_tick_hours", reinforcement.min_tick_hours, &delay_hours)?;
        bounded("archive.older_than_days", self.archive.older_than_days, &days)?;

        Ok(())
    }
}

/// Upper bound for every configured day, hour or minute span.
const MAX_SPAN_DAYS: i64 = 36_500;

fn bounded(name: &str, value: i64, range: &RangeInclusive<i64>) -> Result<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} must be within {}..={}, got {}",
            name,
            range.start(),
            range.end(),
            value
        )))
    }
}

// Folio Configuration
//
// Latency budgets for the three tiers, chunk scheduling knobs, worker pool
// sizing, and analyzer thresholds.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main Folio configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FolioConfig {
    pub chunks: ChunkSettings,
    pub tiers: TierSettings,
    pub pool: PoolSettings,
    pub style: StyleSettings,
    pub heatmap: HeatmapSettings,
    pub locator: LocatorSettings,
    pub cache: CacheSettings,
}

/// Chunk Manager scheduling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkSettings {
    /// Quiet period after the last edit before the pending range is applied
    #[serde(with = "serde_duration_millis")]
    pub edit_debounce: Duration,

    /// Delay between arming the processing timer and running a batch
    #[serde(with = "serde_duration_millis")]
    pub processing_delay: Duration,

    /// Maximum dirty chunks analyzed per batch
    pub max_batch_size: usize,

    /// Consecutive failed analyses before a chunk waits for its next edit
    pub max_retries: u32,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            edit_debounce: Duration::from_millis(300),
            processing_delay: Duration::from_millis(50),
            max_batch_size: 4,
            max_retries: 3,
        }
    }
}

/// Orchestrator tier delays
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TierSettings {
    #[serde(with = "serde_duration_millis")]
    pub debounced_delay: Duration,

    #[serde(with = "serde_duration_millis")]
    pub background_delay: Duration,
}

impl Default for TierSettings {
    fn default() -> Self {
        Self {
            debounced_delay: Duration::from_millis(150),
            background_delay: Duration::from_millis(2000),
        }
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolSettings {
    /// `None` picks `max(2, available_parallelism - 1)`; `Some(0)` runs inline
    pub size: Option<usize>,
}

/// Style analyzer thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StyleSettings {
    pub overused_min_count: usize,
    pub repeated_phrase_min_count: usize,
    pub repeated_phrase_len: usize,
}

impl Default for StyleSettings {
    fn default() -> Self {
        Self {
            overused_min_count: 3,
            repeated_phrase_min_count: 3,
            repeated_phrase_len: 3,
        }
    }
}

/// Heatmap sectioning and risk threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeatmapSettings {
    pub section_target_words: usize,
    pub high_risk_threshold: f64,
}

impl Default for HeatmapSettings {
    fn default() -> Self {
        Self {
            section_target_words: 150,
            high_risk_threshold: 0.5,
        }
    }
}

/// Quote locator tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocatorSettings {
    /// Allowed edits as a fraction of the pattern length
    pub max_error_ratio: f64,

    /// Longest pattern (in chars) the approximate search accepts
    pub max_pattern_chars: usize,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self {
            max_error_ratio: 0.25,
            max_pattern_chars: 256,
        }
    }
}

/// Analyzer cache sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

// Custom serde module for Duration (serialize/deserialize as milliseconds)
mod serde_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl FolioConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: FolioConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunks.max_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "chunks.max_batch_size must be at least 1".to_string(),
            ));
        }

        if self.cache.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "cache.capacity must be at least 1".to_string(),
            ));
        }

        if self.tiers.background_delay <= self.tiers.debounced_delay {
            return Err(ConfigError::ValidationError(
                "tiers.background_delay must be longer than tiers.debounced_delay".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.heatmap.high_risk_threshold) {
            return Err(ConfigError::ValidationError(
                "heatmap.high_risk_threshold must be within [0, 1]".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.locator.max_error_ratio) {
            return Err(ConfigError::ValidationError(
                "locator.max_error_ratio must be within [0, 1]".to_string(),
            ));
        }

        if self.style.repeated_phrase_len < 2 {
            return Err(ConfigError::ValidationError(
                "style.repeated_phrase_len must be at least 2".to_string(),
            ));
        }

        Ok(())
    }
}

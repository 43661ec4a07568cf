//! Configuration module for ChronoTrace
//!
//! This module handles the static startup parameters of the capture
//! pipeline, the temporal store and the playback engine. None of these are
//! mutable at runtime; playback speed is the only knob a session can turn,
//! and it lives on the session, not here.
//!
//! # Config Location
//!
//! When no explicit path is given the configuration is read from the
//! platform-appropriate config directory under `chronotrace-rs`:
//!
//! - **Linux**: `~/.config/chronotrace-rs/config.toml`
//! - **macOS**: `~/Library/Application Support/chronotrace-rs/config.toml`
//! - **Windows**: `%APPDATA%\chronotrace-rs\config.toml`
//!
//! # Formats
//!
//! Files ending in `.toml` are parsed as TOML, everything else as JSON.
//! Every section and field has a default, so partial files are accepted.
//!
//! # Example
//!
//! ```ignore
//! use chronotrace_rs::config::TraceConfig;
//!
//! let config = TraceConfig::load("chronotrace.toml")?;
//! config.validate()?;
//! ```

use crate::error::{Result, TraceError};
use crate::store::{AgeAnchor, RetentionPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "chronotrace-rs";

/// Config filename inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Default per-producer buffer size
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Default number of events moved per buffer per flush
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Default flush interval in milliseconds
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 50;

/// Default bound on events left waiting in buffers after a flush cycle
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 65_536;

/// Default playback tick interval at speed 1.0, in milliseconds
pub const DEFAULT_BASE_INTERVAL_MS: u64 = 100;

/// Default store capacity
pub const DEFAULT_STORE_MAX_EVENTS: usize = 1_000_000;

/// Default store maximum event age (one hour)
pub const DEFAULT_MAX_AGE_SECONDS: u64 = 3600;

/// Default prune interval in milliseconds
pub const DEFAULT_PRUNE_INTERVAL_MS: u64 = 1000;

// ==================== Config Directory ====================

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Trace Config ====================

/// Complete startup configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TraceConfig {
    /// Capture buffers and drain coordinator
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Temporal store retention
    #[serde(default)]
    pub store: StoreConfig,

    /// Playback engine defaults
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Log output for the binary
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TraceConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TraceError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: TraceConfig = if is_toml(path) {
            toml::from_str(&content).map_err(|e| {
                TraceError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                TraceError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the configuration to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TraceError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| TraceError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| TraceError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content).map_err(|e| {
            TraceError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let capture = &self.capture;
        if capture.buffer_size == 0 || capture.max_events == 0 {
            return Err(TraceError::Config(
                "capture buffer capacity must be at least 1".to_string(),
            ));
        }
        if capture.batch_size == 0 {
            return Err(TraceError::Config("batch_size must be at least 1".to_string()));
        }
        if capture.flush_interval_ms == 0 {
            return Err(TraceError::Config(
                "flush_interval_ms must be at least 1".to_string(),
            ));
        }
        if capture.max_queue_size == 0 {
            return Err(TraceError::Config(
                "max_queue_size must be at least 1".to_string(),
            ));
        }
        if self.store.prune_interval_ms == 0 {
            return Err(TraceError::Config(
                "prune_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.playback.base_interval_ms == 0 {
            return Err(TraceError::Config(
                "base_interval_ms must be at least 1".to_string(),
            ));
        }
        let speed = self.playback.default_speed;
        if !speed.is_finite() || speed <= 0.0 {
            return Err(TraceError::Config(format!(
                "default_speed must be a positive number, got {}",
                speed
            )));
        }
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

// ==================== Capture Config ====================

/// Overflow handling for full capture buffers
///
/// Only drop-oldest is supported: producers must never stall because the
/// tracer fell behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowStrategy {
    /// Overwrite the oldest unread event
    #[default]
    DropOldest,
}

impl std::fmt::Display for OverflowStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverflowStrategy::DropOldest => write!(f, "drop_oldest"),
        }
    }
}

/// Capture buffer and drain coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Slots allocated per producer buffer
    pub buffer_size: usize,

    /// Maximum events held per buffer before drop-oldest applies
    pub max_events: usize,

    /// Overflow policy
    pub overflow_strategy: OverflowStrategy,

    /// Events drained from one buffer per flush
    pub batch_size: usize,

    /// Flush period in milliseconds
    pub flush_interval_ms: u64,

    /// Bound on events left in buffers after a cycle; the oldest batches beyond it are dropped
    pub max_queue_size: usize,

    /// Retries after a failed append before the batch is dropped
    pub flush_retries: u32,

    /// Base backoff between retries in milliseconds (doubled per attempt)
    pub retry_backoff_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_events: DEFAULT_BUFFER_SIZE,
            overflow_strategy: OverflowStrategy::DropOldest,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            flush_retries: 3,
            retry_backoff_ms: 5,
        }
    }
}

impl CaptureConfig {
    /// Effective per-buffer capacity
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_size.min(self.max_events).max(1)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Backoff before retry number `attempt` (1-based)
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(10);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

// ==================== Store Config ====================

/// Temporal store retention configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum stored events (0 = unlimited)
    pub max_events: usize,

    /// Maximum event age in seconds (0 = unlimited)
    pub max_age_seconds: u64,

    /// What event age is measured against
    pub age_anchor: AgeAnchor,

    /// Prune period in milliseconds
    pub prune_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_events: DEFAULT_STORE_MAX_EVENTS,
            max_age_seconds: DEFAULT_MAX_AGE_SECONDS,
            age_anchor: AgeAnchor::default(),
            prune_interval_ms: DEFAULT_PRUNE_INTERVAL_MS,
        }
    }
}

impl StoreConfig {
    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms)
    }

    /// Retention policy described by this section
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_events: (self.max_events > 0).then_some(self.max_events),
            max_age: (self.max_age_seconds > 0).then(|| Duration::from_secs(self.max_age_seconds)),
            anchor: self.age_anchor,
        }
    }
}

// ==================== Playback Config ====================

/// Playback engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Tick interval at speed 1.0, in milliseconds
    pub base_interval_ms: u64,

    /// Speed a new session starts with
    pub default_speed: f64,

    /// Capacity of each session's update stream
    pub update_channel_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: DEFAULT_BASE_INTERVAL_MS,
            default_speed: 1.0,
            update_channel_capacity: 1024,
        }
    }
}

impl PlaybackConfig {
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }
}

// ==================== Logging Config ====================

/// Log output configuration for the binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub filter: String,

    /// Directory for daily rolling log files (disabled when unset)
    pub directory: Option<PathBuf>,

    /// Log file name prefix
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,chronotrace_rs=debug".to_string(),
            directory: None,
            file_prefix: "chronotrace.log".to_string(),
        }
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TraceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.playback.base_interval(), Duration::from_millis(100));
        assert_eq!(config.capture.overflow_strategy, OverflowStrategy::DropOldest);
    }

    #[test]
    fn test_buffer_capacity_uses_smaller_limit() {
        let capture = CaptureConfig {
            buffer_size: 1024,
            max_events: 16,
            ..Default::default()
        };
        assert_eq!(capture.buffer_capacity(), 16);
    }

    #[test]
    fn test_retry_backoff_doubles() {
        let capture = CaptureConfig {
            retry_backoff_ms: 10,
            ..Default::default()
        };
        assert_eq!(capture.retry_backoff(1), Duration::from_millis(10));
        assert_eq!(capture.retry_backoff(2), Duration::from_millis(20));
        assert_eq!(capture.retry_backoff(3), Duration::from_millis(40));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TraceConfig::default();
        config.capture.batch_size = 0;
        assert!(matches!(config.validate(), Err(TraceError::Config(_))));

        let mut config = TraceConfig::default();
        config.playback.default_speed = 0.0;
        assert!(config.validate().is_err());

        let mut config = TraceConfig::default();
        config.playback.default_speed = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retention_zero_means_unlimited() {
        let store = StoreConfig {
            max_events: 0,
            max_age_seconds: 0,
            prune_interval_ms: 10,
            ..Default::default()
        };
        let retention = store.retention();
        assert_eq!(retention.max_events, None);
        assert_eq!(retention.max_age, None);
    }

    #[test]
    fn test_partial_toml() {
        let config: TraceConfig = toml::from_str(
            r#"
            [capture]
            batch_size = 8
            overflow_strategy = "drop_oldest"

            [playback]
            base_interval_ms = 40
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.batch_size, 8);
        assert_eq!(config.capture.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.playback.base_interval_ms, 40);
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn test_store_age_anchor() {
        assert_eq!(StoreConfig::default().retention().anchor, AgeAnchor::NewestEvent);

        let config: TraceConfig = toml::from_str(
            r#"
            [store]
            age_anchor = "wall_clock"
            "#,
        )
        .unwrap();
        assert_eq!(config.store.retention().anchor, AgeAnchor::WallClock);
        assert_eq!(config.store.max_age_seconds, DEFAULT_MAX_AGE_SECONDS);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TraceConfig::default();
        config.capture.max_queue_size = 77;
        config.logging.directory = Some(PathBuf::from("/var/log/chronotrace"));

        for name in ["config.toml", "config.json"] {
            let path = dir.path().join(name);
            config.save(&path).unwrap();
            let loaded = TraceConfig::load(&path).unwrap();
            assert_eq!(loaded, config);
        }
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[capture]\nbatch_size = 0\n").unwrap();
        assert!(TraceConfig::load(&path).is_err());
    }
}

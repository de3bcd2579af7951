//! Engine configuration.
//!
//! Serde-backed with sensible defaults; optionally persisted as JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use vaultdrive_protocol::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_WINDOW, DEFAULT_MAX_CONCURRENT_TRANSFERS,
    DEFAULT_MAX_RETRIES, DEFAULT_PROGRESS_INTERVAL, DEFAULT_RETRY_DELAY,
};
use vaultdrive_transfer::{ChunkSettings, RetryPolicy};

/// Tunables for the transfer engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Global cap on simultaneously admitted transfers.
    pub max_concurrent_transfers: usize,
    /// Plaintext bytes per chunk.
    pub chunk_size: u64,
    /// Per-file bound on in-flight chunk jobs.
    pub chunk_window: usize,
    /// Total attempts for each network-dependent step.
    pub max_retries: u32,
    /// Delay between retry attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Minimum interval between progress emissions, in milliseconds.
    pub progress_interval_ms: u64,
    /// Region assigned to newly uploaded files.
    pub default_region: String,
    /// Bucket assigned to newly uploaded files.
    pub default_bucket: String,
    /// Scratch directory for download chunks. Empty means the system temp
    /// directory.
    pub temp_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: DEFAULT_MAX_CONCURRENT_TRANSFERS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_window: DEFAULT_CHUNK_WINDOW,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL.as_millis() as u64,
            default_region: "eu-central".into(),
            default_bucket: "default".into(),
            temp_dir: String::new(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a JSON file, falling back to defaults for
    /// missing fields.
    pub fn load(path: &Path) -> Result<Self, crate::EngineError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), crate::EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn chunk_settings(&self) -> ChunkSettings {
        ChunkSettings {
            chunk_size: self.chunk_size,
            window: self.chunk_window,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Base directory for per-transfer download scratch space.
    pub fn temp_base(&self) -> PathBuf {
        if self.temp_dir.is_empty() {
            std::env::temp_dir().join("vaultdrive")
        } else {
            PathBuf::from(&self.temp_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert!(config.max_concurrent_transfers >= 1);
        assert!(config.chunk_size >= 1024);
        assert!(config.chunk_window >= 1);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"maxConcurrentTransfers": 7}"#).unwrap();
        assert_eq!(config.max_concurrent_transfers, 7);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.json");

        let mut config = EngineConfig::default();
        config.max_concurrent_transfers = 5;
        config.chunk_window = 8;
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.max_concurrent_transfers, 5);
        assert_eq!(loaded.chunk_window, 8);
    }

    #[test]
    fn derived_views_match_fields() {
        let config = EngineConfig {
            chunk_size: 2048,
            chunk_window: 6,
            max_retries: 2,
            retry_delay_ms: 10,
            ..Default::default()
        };
        let settings = config.chunk_settings();
        assert_eq!(settings.chunk_size, 2048);
        assert_eq!(settings.window, 6);
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.delay, Duration::from_millis(10));
    }

    #[test]
    fn temp_base_defaults_to_system_temp() {
        let config = EngineConfig::default();
        assert!(config.temp_base().starts_with(std::env::temp_dir()));

        let config = EngineConfig {
            temp_dir: "/custom/scratch".into(),
            ..Default::default()
        };
        assert_eq!(config.temp_base(), PathBuf::from("/custom/scratch"));
    }
}

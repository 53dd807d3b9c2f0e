//! Configuration management
//!
//! Handles loading and storing the CLI configuration.
//! Config directory: ~/.bitmend/ (cross-platform)
//!
//! Config file format (~/.bitmend/config.toml):
//! ```toml
//! [chunking]
//! size = 4096
//! policy = "simple"
//!
//! [corruption]
//! levels = [0.05, 0.1, 0.2, 0.3, 0.5]
//! weights = [10.0, 20.0, 30.0, 25.0, 15.0]
//! clean_ratio = 0.1
//! granularity = "chunk"
//! # seed = 42
//!
//! [flipper]
//! mode = "external"
//! command = "bitflip"
//! timeout_secs = 30
//! ```

use anyhow::{Context, Result};
use bitmend_core::corruption::{
    CorruptionConfig, Granularity, DEFAULT_CLEAN_RATIO, DEFAULT_LEVELS, DEFAULT_WEIGHTS,
};
use bitmend_core::flipper::{DEFAULT_BITFLIP_CMD, DEFAULT_TIMEOUT};
use bitmend_core::{SegmentPolicy, DEFAULT_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Structure of ~/.bitmend/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BitmendConfig {
    /// Segmentation and chunking settings
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Severity levels and clean ratio
    #[serde(default)]
    pub corruption: CorruptionSettings,

    /// Bit-flip collaborator settings
    #[serde(default)]
    pub flipper: FlipperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingConfig {
    /// Chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub size: u32,

    /// Segmentation policy (`simple` or `scan-header`)
    #[serde(default)]
    pub policy: SegmentPolicy,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            policy: SegmentPolicy::default(),
        }
    }
}

fn default_chunk_size() -> u32 {
    chunk_size_from_env(std::env::var("BITMEND_CHUNK_SIZE").ok().as_deref())
}

fn chunk_size_from_env(value: Option<&str>) -> u32 {
    let Some(value) = value else {
        return DEFAULT_CHUNK_SIZE;
    };
    match value.trim().parse::<u32>() {
        Ok(size) if size > 0 => size,
        _ => {
            warn!(
                value,
                fallback = DEFAULT_CHUNK_SIZE,
                "ignoring invalid BITMEND_CHUNK_SIZE"
            );
            DEFAULT_CHUNK_SIZE
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorruptionSettings {
    /// Severities in percent of bits flipped
    #[serde(default = "default_levels")]
    pub levels: Vec<f64>,

    /// Relative weights, one per level
    #[serde(default = "default_weights")]
    pub weights: Vec<f64>,

    /// Share of chunks left clean
    #[serde(default = "default_clean_ratio")]
    pub clean_ratio: f64,

    /// One severity per chunk or per image
    #[serde(default)]
    pub granularity: Granularity,

    /// Fixed run seed for reproducible datasets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for CorruptionSettings {
    fn default() -> Self {
        Self {
            levels: default_levels(),
            weights: default_weights(),
            clean_ratio: default_clean_ratio(),
            granularity: Granularity::default(),
            seed: None,
        }
    }
}

fn default_levels() -> Vec<f64> {
    DEFAULT_LEVELS.to_vec()
}

fn default_weights() -> Vec<f64> {
    DEFAULT_WEIGHTS.to_vec()
}

fn default_clean_ratio() -> f64 {
    DEFAULT_CLEAN_RATIO
}

impl CorruptionSettings {
    /// Validated engine configuration
    pub fn to_core(&self) -> Result<CorruptionConfig> {
        let mut config =
            CorruptionConfig::from_lists(&self.levels, &self.weights, self.clean_ratio)
                .context("Invalid [corruption] settings")?;
        config.seed = self.seed;
        Ok(config.with_granularity(self.granularity))
    }
}

/// Which bit-flip collaborator to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FlipperMode {
    /// Run the external bit-flip program once per chunk
    #[default]
    External,
    /// Flip bits in-process with a seeded RNG
    InProcess,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlipperConfig {
    #[serde(default)]
    pub mode: FlipperMode,

    /// External program, invoked as `<command> spray percent:<p> <file>`
    #[serde(default = "default_bitflip_cmd")]
    pub command: String,

    /// Per-chunk timeout for the external program
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FlipperConfig {
    fn default() -> Self {
        Self {
            mode: FlipperMode::default(),
            command: default_bitflip_cmd(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_bitflip_cmd() -> String {
    std::env::var("BITMEND_BITFLIP_CMD").unwrap_or_else(|_| DEFAULT_BITFLIP_CMD.to_string())
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

/// Get the config directory path (~/.bitmend/)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".bitmend"))
}

/// Get the default config file path
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Parse a config file
pub fn read_config(path: &Path) -> Result<BitmendConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Load configuration.
///
/// An explicit path must exist and parse. The default path falls back to
/// defaults when missing or broken.
pub fn load_config(explicit: Option<&Path>) -> Result<BitmendConfig> {
    if let Some(path) = explicit {
        return read_config(path);
    }

    match config_file_path() {
        Ok(path) if path.exists() => match read_config(&path) {
            Ok(config) => Ok(config),
            Err(e) => {
                eprintln!("Warning: {:#}", e);
                Ok(BitmendConfig::default())
            }
        },
        _ => Ok(BitmendConfig::default()),
    }
}

/// Save configuration to file
pub fn save_config(path: &Path, config: &BitmendConfig) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
    }
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, content).context("Failed to write config file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = BitmendConfig::default();
        assert_eq!(config.corruption.levels, vec![0.05, 0.1, 0.2, 0.3, 0.5]);
        assert_eq!(config.corruption.weights.len(), 5);
        assert_eq!(config.corruption.clean_ratio, 0.1);
        assert_eq!(config.chunking.policy, SegmentPolicy::Simple);
        assert_eq!(config.flipper.timeout_secs, 30);
    }

    #[test]
    fn test_config_serialization() {
        let config = BitmendConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();

        // Should contain all sections
        assert!(toml_str.contains("[chunking]"));
        assert!(toml_str.contains("[corruption]"));
        assert!(toml_str.contains("[flipper]"));
        assert!(toml_str.contains("mode = \"external\""));
        assert!(!toml_str.contains("seed"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: BitmendConfig = toml::from_str(
            r#"
            [chunking]
            policy = "scan-header"

            [flipper]
            mode = "in-process"
            "#,
        )
        .unwrap();
        assert_eq!(config.chunking.policy, SegmentPolicy::ScanHeader);
        assert_eq!(config.flipper.mode, FlipperMode::InProcess);
        assert_eq!(config.corruption, CorruptionSettings::default());
    }

    #[test]
    fn test_to_core() {
        let settings = CorruptionSettings {
            levels: vec![0.1, 0.2],
            weights: vec![1.0, 1.0],
            clean_ratio: 0.5,
            granularity: Granularity::Image,
            seed: Some(7),
        };
        let core = settings.to_core().unwrap();
        assert_eq!(core.levels.len(), 2);
        assert_eq!(core.seed, Some(7));
        assert_eq!(core.granularity, Granularity::Image);

        let broken = CorruptionSettings {
            weights: vec![1.0],
            ..settings
        };
        assert!(broken.to_core().is_err());
    }

    #[test]
    fn test_chunk_size_from_env() {
        assert_eq!(chunk_size_from_env(None), DEFAULT_CHUNK_SIZE);
        assert_eq!(chunk_size_from_env(Some("1024")), 1024);
        assert_eq!(chunk_size_from_env(Some(" 512 ")), 512);
        assert_eq!(chunk_size_from_env(Some("4k")), DEFAULT_CHUNK_SIZE);
        assert_eq!(chunk_size_from_env(Some("0")), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_granularity_setting() {
        let config: BitmendConfig = toml::from_str(
            r#"
            [corruption]
            granularity = "image"
            "#,
        )
        .unwrap();
        assert_eq!(config.corruption.granularity, Granularity::Image);
        assert_eq!(BitmendConfig::default().corruption.granularity, Granularity::Chunk);
    }

    #[test]
    fn test_save_and_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = BitmendConfig::default();
        config.corruption.seed = Some(99);
        config.chunking.size = 1024;

        save_config(&path, &config).unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded, config);

        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}

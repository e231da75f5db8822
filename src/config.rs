//! Configuration file parser for ~/.config/trendfeed/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged so typos show up in the output.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::service::DEFAULT_BASE_URL;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid base_url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding one `{keyword}.xml` per feed.
    pub output_dir: PathBuf,

    /// Public URL the feeds are served under; used for channel and
    /// subscription links.
    pub base_url: String,

    /// Default window for `cleanup` when no `--days` is given.
    pub retention_days: u64,

    /// Maximum items per generated feed (0 = unlimited).
    pub max_items: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output/rss"),
            base_url: DEFAULT_BASE_URL.to_string(),
            retention_days: 30,
            max_items: 0,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 4] = ["output_dir", "base_url", "retention_days", "max_items"];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)`
    /// - `base_url` that is not an http(s) URL → `Err(ConfigError::InvalidBaseUrl)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            output_dir = %config.output_dir.display(),
            "Loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason,
        };
        let parsed = url::Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(invalid(format!("unsupported scheme '{}'", scheme))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

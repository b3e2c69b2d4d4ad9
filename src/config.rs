/// Configuration for keycap checks
///
/// Settings are read from an optional JSON file. Every field has a default so a
/// partial file (or none at all) is valid.

use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

/// Characters the recognition engine is allowed to produce
pub const DEFAULT_WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Error raised while loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in configuration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Settings for the tesseract recognition engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Executable name or path
    pub tesseract_path: String,
    /// Trained data language
    pub language: String,
    /// Page segmentation mode (6 = assume a single uniform block of text)
    pub page_seg_mode: u8,
    /// OCR engine mode (3 = default, legacy + LSTM when available)
    pub engine_mode: u8,
    pub char_whitelist: String,
    /// Additional `-c name=value` engine variables
    pub variables: BTreeMap<String, String>,
    /// Seconds before the engine process is killed, 0 disables the limit
    pub timeout_seconds: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        let variables = [
            ("preserve_interword_spaces", "1"),
            ("textord_heavy_nr", "1"),
            ("textord_force_make_prop_words", "1"),
            ("tessedit_do_invert", "0"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            tesseract_path: "tesseract".to_string(),
            language: "eng".to_string(),
            page_seg_mode: 6,
            engine_mode: 3,
            char_whitelist: DEFAULT_WHITELIST.to_string(),
            variables,
            timeout_seconds: 300,
        }
    }
}

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recognition: RecognitionConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        if !path.exists() {
            return Err(ConfigError::NotFound(display));
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: display.clone(),
            source,
        })?;

        info!("Loaded configuration from {}", display);
        Ok(config)
    }
}

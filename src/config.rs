//! Configuration file support for scan-autocrop
//!
//! Supports TOML configuration files with the following search order:
//! 1. `--config <path>` - explicitly specified path
//! 2. `./scan-autocrop.toml` - current directory
//! 3. `~/.config/scan-autocrop/config.toml` - user config
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [correction]
//! border_margin = 20
//! binarization = "standard"
//! detection = "box"
//! fill = "fixed_rgb"
//! fill_rgb = [255, 250, 240]
//! min_area_ratio = 0.5
//!
//! [batch]
//! threads = 4
//! thumbnails = true
//! report = true
//! save_reference = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::correction::{BinarizationMode, CorrectionOptions, DetectionMode, FillColorPolicy};
use crate::pipeline::BatchOptions;

/// Config file name looked up in the current directory
pub const LOCAL_CONFIG_FILE: &str = "scan-autocrop.toml";

/// Directory under the user config dir
pub const USER_CONFIG_DIR: &str = "scan-autocrop";

/// Fill mode name that takes its color from `fill_rgb`
const FIXED_RGB: &str = "fixed_rgb";

/// Configuration file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// File not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Value outside its allowed set
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Correction settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CorrectionConfig {
    /// Outward margin around the page in pixels
    #[serde(default)]
    pub border_margin: Option<u32>,

    /// `standard` or `inverted`
    #[serde(default)]
    pub binarization: Option<String>,

    /// `box` or `polygon`
    #[serde(default)]
    pub detection: Option<String>,

    /// `estimated`, `white`, `black` or `fixed_rgb`
    #[serde(default)]
    pub fill: Option<String>,

    /// Color for `fill = "fixed_rgb"`
    #[serde(default)]
    pub fill_rgb: Option<[u8; 3]>,

    /// Fall back to the original when the output is this small (0 disables)
    #[serde(default)]
    pub min_area_ratio: Option<f64>,
}

/// Batch settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchConfig {
    /// Number of worker threads
    #[serde(default)]
    pub threads: Option<usize>,

    /// Write side-by-side thumbnails
    #[serde(default)]
    pub thumbnails: Option<bool>,

    /// Write the HTML report
    #[serde(default)]
    pub report: Option<bool>,

    /// Save the un-rotated reference crop
    #[serde(default)]
    pub save_reference: Option<bool>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub correction: CorrectionConfig,

    #[serde(default)]
    pub batch: BatchConfig,
}

/// Effective settings after merging file and CLI
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub correction: CorrectionOptions,
    pub batch: BatchOptions,
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the default search path
    ///
    /// Returns defaults when no file is found.
    pub fn load() -> Result<Self, ConfigError> {
        for path in Self::search_paths() {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific file path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Snapshot of effective settings in file form
    pub fn from_settings(settings: &Settings) -> Self {
        let options = &settings.correction;
        let (fill, fill_rgb) = match options.fill {
            FillColorPolicy::EstimatedBorder => ("estimated", None),
            FillColorPolicy::White => ("white", None),
            FillColorPolicy::Black => ("black", None),
            FillColorPolicy::Fixed(rgb) => (FIXED_RGB, Some(rgb)),
        };

        Self {
            correction: CorrectionConfig {
                border_margin: Some(options.border_margin),
                binarization: Some(options.binarization.name().to_string()),
                detection: Some(options.detection.name().to_string()),
                fill: Some(fill.to_string()),
                fill_rgb,
                min_area_ratio: Some(options.min_area_ratio),
            },
            batch: BatchConfig {
                threads: settings.batch.threads,
                thumbnails: Some(settings.batch.thumbnails),
                report: Some(settings.batch.report),
                save_reference: Some(settings.batch.save_reference),
            },
        }
    }

    /// Convert to effective settings
    pub fn to_settings(&self) -> Result<Settings, ConfigError> {
        let mut settings = Settings::default();
        let correction = &self.correction;

        if let Some(margin) = correction.border_margin {
            settings.correction.border_margin = margin;
        }
        if let Some(mode) = &correction.binarization {
            settings.correction.binarization = mode.parse().map_err(ConfigError::Invalid)?;
        }
        if let Some(mode) = &correction.detection {
            settings.correction.detection = mode.parse().map_err(ConfigError::Invalid)?;
        }
        settings.correction.fill = self.fill_policy()?;
        if let Some(ratio) = correction.min_area_ratio {
            settings.correction.min_area_ratio = ratio;
        }

        let batch = &self.batch;
        if let Some(threads) = batch.threads {
            settings.batch.threads = Some(threads);
        }
        if let Some(thumbnails) = batch.thumbnails {
            settings.batch.thumbnails = thumbnails;
        }
        if let Some(report) = batch.report {
            settings.batch.report = report;
        }
        if let Some(save) = batch.save_reference {
            settings.batch.save_reference = save;
        }

        Ok(settings)
    }

    fn fill_policy(&self) -> Result<FillColorPolicy, ConfigError> {
        let fill = self.correction.fill.as_deref().map(str::trim);
        match (fill, self.correction.fill_rgb) {
            (Some(FIXED_RGB), Some(rgb)) => Ok(FillColorPolicy::Fixed(rgb)),
            (Some(FIXED_RGB), None) => Err(ConfigError::Invalid(
                "fill = \"fixed_rgb\" requires fill_rgb".into(),
            )),
            (_, Some(_)) => Err(ConfigError::Invalid(
                "fill_rgb is only allowed with fill = \"fixed_rgb\"".into(),
            )),
            (Some(name), None) => name.parse().map_err(ConfigError::Invalid),
            (None, None) => Ok(FillColorPolicy::default()),
        }
    }

    /// Merge with CLI arguments (CLI takes precedence)
    pub fn merge_with_cli(&self, cli: &CliOverrides) -> Result<Settings, ConfigError> {
        let mut settings = self.to_settings()?;

        if let Some(margin) = cli.border_margin {
            settings.correction.border_margin = margin;
        }
        if let Some(mode) = cli.binarization {
            settings.correction.binarization = mode;
        }
        if let Some(mode) = cli.detection {
            settings.correction.detection = mode;
        }
        if let Some(fill) = cli.fill {
            settings.correction.fill = fill;
        }
        if let Some(ratio) = cli.min_area_ratio {
            settings.correction.min_area_ratio = ratio;
        }
        if let Some(threads) = cli.threads {
            settings.batch.threads = Some(threads);
        }
        if let Some(thumbnails) = cli.thumbnails {
            settings.batch.thumbnails = thumbnails;
        }
        if let Some(report) = cli.report {
            settings.batch.report = report;
        }
        if let Some(save) = cli.save_reference {
            settings.batch.save_reference = save;
        }

        Ok(settings)
    }

    /// Get config file search paths
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(USER_CONFIG_DIR).join("config.toml"));
        }

        paths
    }
}

/// CLI override values for merging with config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub border_margin: Option<u32>,
    pub binarization: Option<BinarizationMode>,
    pub detection: Option<DetectionMode>,
    pub fill: Option<FillColorPolicy>,
    pub min_area_ratio: Option<f64>,
    pub threads: Option<usize>,
    pub thumbnails: Option<bool>,
    pub report: Option<bool>,
    pub save_reference: Option<bool>,
}

impl CliOverrides {
    /// Create new empty overrides
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_border_margin(mut self, pixels: u32) -> Self {
        self.border_margin = Some(pixels);
        self
    }

    pub fn with_detection(mut self, mode: DetectionMode) -> Self {
        self.detection = Some(mode);
        self
    }

    pub fn with_fill(mut self, fill: FillColorPolicy) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }
}

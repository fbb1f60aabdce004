//
// Peakcam - Frame acquisition for IDS peak USB cameras
// Copyright (c) 2021 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Configuration file.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! file = "/tmp/peakcam.log"
//!
//! [camera]
//! label = "MainCam"
//! binning = 2
//! pixel_type = "32bit RGBA"
//! exposure_ms = 25.0
//! ```
//!

use crate::camera::{AutoWhiteBalance, PixelType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const CONFIG_DIR: &str = "peakcam";
const CONFIG_FILE: &str = "peakcam.toml";

/// Largest accepted multi-ROI fill value (16-bit pixels).
pub const MAX_MULTI_ROI_FILL_VALUE: u32 = 65536;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
    Logger(String)
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "parse error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {}", msg),
            ConfigError::Logger(msg) => write!(f, "cannot initialize logging: {}", msg)
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> ConfigError { ConfigError::Io(e) }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> ConfigError { ConfigError::Parse(e) }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of "off", "error", "warn", "info", "debug", "trace".
    pub level: String,
    /// If set, log output is also written to this file.
    pub file: Option<PathBuf>
}

impl Default for LoggingConfig {
    fn default() -> LoggingConfig {
        LoggingConfig{ level: "info".to_string(), file: None }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<log::LevelFilter, ConfigError> {
        log::LevelFilter::from_str(&self.level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log level \"{}\"", self.level)))
    }
}

/// Settings applied when the camera is initialized.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera name stored in frame metadata.
    pub label: String,
    pub binning: u32,
    pub pixel_type: String,
    pub exposure_ms: f64,
    pub auto_white_balance: String,
    pub trigger_device: String,
    pub allow_multi_roi: bool,
    pub multi_roi_fill_value: u32,
    pub use_exposure_sequences: bool,
    pub readout_time_ms: f64,
    /// Used by continuous acquisition started without an explicit overflow policy.
    pub stop_on_overflow: bool
}

impl Default for CameraConfig {
    fn default() -> CameraConfig {
        CameraConfig{
            label: "IDSPeak".to_string(),
            binning: 1,
            pixel_type: PixelType::Mono8.to_string(),
            exposure_ms: 10.0,
            auto_white_balance: AutoWhiteBalance::Off.to_string(),
            trigger_device: String::new(),
            allow_multi_roi: false,
            multi_roi_fill_value: 0,
            use_exposure_sequences: false,
            readout_time_ms: 0.0,
            stop_on_overflow: false
        }
    }
}

impl CameraConfig {
    pub fn pixel_type(&self) -> Result<PixelType, ConfigError> {
        PixelType::from_str(&self.pixel_type)
            .map_err(|_| ConfigError::Invalid(format!("unknown pixel type \"{}\"", self.pixel_type)))
    }

    pub fn auto_white_balance(&self) -> Result<AutoWhiteBalance, ConfigError> {
        AutoWhiteBalance::from_str(&self.auto_white_balance)
            .map_err(|_| ConfigError::Invalid(format!("unknown auto white balance mode \"{}\"", self.auto_white_balance)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.binning == 0 {
            return Err(ConfigError::Invalid("binning must be at least 1".to_string()));
        }
        if !self.exposure_ms.is_finite() || self.exposure_ms <= 0.0 {
            return Err(ConfigError::Invalid(format!("exposure_ms must be positive, got {}", self.exposure_ms)));
        }
        if !self.readout_time_ms.is_finite() || self.readout_time_ms < 0.0 {
            return Err(ConfigError::Invalid(format!("readout_time_ms must not be negative, got {}", self.readout_time_ms)));
        }
        if self.multi_roi_fill_value > MAX_MULTI_ROI_FILL_VALUE {
            return Err(ConfigError::Invalid(format!("multi_roi_fill_value must not exceed {}", MAX_MULTI_ROI_FILL_VALUE)));
        }
        self.pixel_type()?;
        self.auto_white_balance()?;
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub camera: CameraConfig
}

impl Config {
    /// `<config dir>/peakcam/peakcam.toml`, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn parse(text: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Config::parse(&text)
    }

    /// Loads the file at `default_path()`; defaults are used if there is no such file.
    pub fn load_default() -> Result<Config, ConfigError> {
        match Config::default_path() {
            Some(path) if path.is_file() => Config::load(&path),
            _ => Ok(Config::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging.level_filter()?;
        self.camera.validate()
    }
}

//! Configuration management for strokeplot
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML file formats, chosen by file extension.
//!
//! Configuration is organized into sections:
//! - Connection settings (port, baud rate, framing)
//! - Streaming settings (delays, timeouts, retries, ready handshake)
//! - Plotter settings (feed rate, pen-down power)
//! - Font and layout defaults
//!
//! Every field has a default, so a file only needs the values it changes.

use crate::error::{ConfigError, SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strokeplot_core::{ReadyMatch, TextHeight};

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port, or "Auto" for the first plotter-like port
    pub port: String,
    /// Baud rate for serial connections
    pub baud_rate: u32,
    /// Data bits per character
    pub data_bits: u8,
    /// Stop bits
    pub stop_bits: u8,
    /// Parity
    pub parity: Parity,
    /// Hardware flow control
    pub flow_control: bool,
}

impl ConnectionSettings {
    /// Check if the port should be discovered at run time
    pub fn is_auto_port(&self) -> bool {
        self.port.eq_ignore_ascii_case("auto")
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: "Auto".to_string(),
            baud_rate: 115200,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            flow_control: false,
        }
    }
}

/// Streaming protocol settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Delay after the wake byte in milliseconds
    pub settle_delay_ms: u64,
    /// Delay between exchanges in milliseconds
    pub pacing_delay_ms: u64,
    /// Wait for the ready token in milliseconds
    pub ready_timeout_ms: u64,
    /// Wait for each reply in milliseconds
    pub reply_timeout_ms: u64,
    /// Re-sends allowed after a timeout
    pub max_retries: u32,
    /// Longest blocking read in milliseconds
    pub poll_interval_ms: u64,
    /// Line the controller prints when ready
    pub ready_token: String,
    /// How boot lines are matched against the token
    pub ready_match: ReadyMatch,
    /// Stop on error and alarm replies
    pub strict_replies: bool,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 100,
            pacing_delay_ms: 100,
            ready_timeout_ms: 10_000,
            reply_timeout_ms: 10_000,
            max_retries: 2,
            poll_interval_ms: 50,
            ready_token: "$".to_string(),
            ready_match: ReadyMatch::Exact,
            strict_replies: false,
        }
    }
}

/// Plotter output settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotterSettings {
    /// Feed rate set by the home move
    pub feed_rate: u32,
    /// S value that lowers the pen
    pub power_on: u32,
}

impl Default for PlotterSettings {
    fn default() -> Self {
        Self {
            feed_rate: 1000,
            power_on: 1000,
        }
    }
}

/// Font settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontSettings {
    /// Stroke font file
    pub path: PathBuf,
}

impl Default for FontSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("SingleStrokeFont.txt"),
        }
    }
}

/// Layout defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    /// Text height in millimetres; asked for when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_height: Option<i32>,
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Streaming protocol settings
    pub streaming: StreamingSettings,
    /// Plotter output settings
    pub plotter: PlotterSettings,
    /// Font settings
    pub font: FontSettings,
    /// Layout defaults
    pub layout: LayoutSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(other.unwrap_or("none").to_string()).into()),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location (`<config dir>/strokeplot/config.toml`)
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("strokeplot").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no configuration directory".to_string())
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        tracing::info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        let connection = &self.connection;
        if connection.port.trim().is_empty() {
            return Err(SettingsError::invalid("connection.port", "must not be empty"));
        }
        if connection.baud_rate == 0 {
            return Err(SettingsError::invalid("connection.baud_rate", "must be > 0"));
        }
        if !(5..=8).contains(&connection.data_bits) {
            return Err(out_of_range("connection.data_bits", connection.data_bits));
        }
        if !(1..=2).contains(&connection.stop_bits) {
            return Err(out_of_range("connection.stop_bits", connection.stop_bits));
        }

        let streaming = &self.streaming;
        if streaming.ready_timeout_ms == 0 {
            return Err(SettingsError::invalid("streaming.ready_timeout_ms", "must be > 0"));
        }
        if streaming.reply_timeout_ms == 0 {
            return Err(SettingsError::invalid("streaming.reply_timeout_ms", "must be > 0"));
        }
        if streaming.poll_interval_ms == 0 {
            return Err(SettingsError::invalid("streaming.poll_interval_ms", "must be > 0"));
        }
        if streaming.ready_token.trim().is_empty() {
            return Err(SettingsError::invalid("streaming.ready_token", "must not be empty"));
        }

        if self.plotter.feed_rate == 0 {
            return Err(SettingsError::invalid("plotter.feed_rate", "must be > 0"));
        }

        if self.font.path.as_os_str().is_empty() {
            return Err(SettingsError::invalid("font.path", "must not be empty"));
        }

        if let Some(height) = self.layout.text_height {
            if TextHeight::new(height).is_err() {
                return Err(out_of_range("layout.text_height", height));
            }
        }

        Ok(())
    }
}

fn out_of_range(key: &str, value: impl ToString) -> SettingsError {
    ConfigError::ValueOutOfRange {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}

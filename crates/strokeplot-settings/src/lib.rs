//! strokeplot Settings Crate
//!
//! Loads, validates and saves the plotter configuration.

pub mod config;
pub mod error;

pub use config::{
    Config, ConnectionSettings, FontSettings, LayoutSettings, Parity, PlotterSettings,
    StreamingSettings,
};
pub use error::{ConfigError, SettingsError, SettingsResult};

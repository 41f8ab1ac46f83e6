//! The plot job pipeline
//!
//! A job is prepared in a fixed order: the height is validated first, then
//! the text is read, then the font is loaded. Nothing is compiled and no
//! transport is touched until all three have succeeded.

use anyhow::Context;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use strokeplot_communication::{find_default_port, ConnectionParams, SerialParity, StreamerConfig};
use strokeplot_core::{LayoutError, PlotProgram, Result, TextHeight};
use strokeplot_designer::{GcodeEncoder, GlyphStore, MotionCompiler};
use strokeplot_settings::{Config, ConnectionSettings, Parity};

/// Read a text source as lines without terminators
pub fn read_text_lines(path: &Path) -> std::result::Result<Vec<String>, LayoutError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => LayoutError::InputSourceMissing {
            path: path.display().to_string(),
        },
        _ => LayoutError::InvalidText {
            path: path.display().to_string(),
            reason: e.to_string(),
        },
    })?;

    let text = String::from_utf8(bytes).map_err(|e| LayoutError::InvalidText {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    Ok(text.lines().map(str::to_string).collect())
}

/// Validated input for one plot
#[derive(Debug)]
pub struct PlotJob {
    height: TextHeight,
    lines: Vec<String>,
    glyphs: GlyphStore,
}

impl PlotJob {
    /// Validate the height, read the text and load the font, in that order
    pub fn prepare(height: i32, text_path: &Path, font_path: &Path) -> Result<Self> {
        let height = TextHeight::new(height)?;
        let lines = read_text_lines(text_path)?;
        let glyphs = GlyphStore::load(font_path)?;

        tracing::info!(
            "Prepared {} line(s) from {} at {}",
            lines.len(),
            text_path.display(),
            height
        );
        Ok(Self::new(height, lines, glyphs))
    }

    /// Assemble a job from parts that are already loaded
    pub fn new(height: TextHeight, lines: Vec<String>, glyphs: GlyphStore) -> Self {
        Self {
            height,
            lines,
            glyphs,
        }
    }

    /// Text height
    pub fn height(&self) -> TextHeight {
        self.height
    }

    /// Text lines in plot order
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Compile the text into a plot program
    pub fn compile(&self) -> PlotProgram {
        MotionCompiler::new(&self.glyphs, self.height.scale()).compile(&self.lines)
    }
}

/// Encoder configured from the plotter settings
pub fn encoder(config: &Config) -> GcodeEncoder {
    GcodeEncoder::new(config.plotter.feed_rate, config.plotter.power_on)
}

/// Streamer options from the configuration
pub fn streamer_config(config: &Config) -> StreamerConfig {
    let streaming = &config.streaming;
    StreamerConfig {
        settle_delay: Duration::from_millis(streaming.settle_delay_ms),
        pacing_delay: Duration::from_millis(streaming.pacing_delay_ms),
        ready_timeout: Duration::from_millis(streaming.ready_timeout_ms),
        reply_timeout: Duration::from_millis(streaming.reply_timeout_ms),
        max_retries: streaming.max_retries,
        poll_interval: Duration::from_millis(streaming.poll_interval_ms),
        ready_token: streaming.ready_token.clone(),
        ready_match: streaming.ready_match,
        strict_replies: streaming.strict_replies,
        encoder: encoder(config),
    }
}

/// Serial parameters from the connection settings
///
/// An "Auto" port is replaced by the first plotter-like port found.
pub fn connection_params(settings: &ConnectionSettings) -> Result<ConnectionParams> {
    let port = if settings.is_auto_port() {
        let port = find_default_port()?;
        tracing::info!("Using detected port {}", port);
        port
    } else {
        settings.port.clone()
    };

    Ok(ConnectionParams {
        port,
        baud_rate: settings.baud_rate,
        data_bits: settings.data_bits,
        stop_bits: settings.stop_bits,
        parity: match settings.parity {
            Parity::None => SerialParity::None,
            Parity::Even => SerialParity::Even,
            Parity::Odd => SerialParity::Odd,
        },
        flow_control: settings.flow_control,
    })
}

/// Output file format for `--output`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Newline-terminated G-code transcript
    Gcode,
    /// The plot program as a JSON array of commands
    Json,
}

impl ExportFormat {
    /// JSON for `.json` files, G-code otherwise
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Gcode,
        }
    }
}

/// Write a program to `path` instead of streaming it
pub fn export(
    program: &PlotProgram,
    encoder: &GcodeEncoder,
    path: &Path,
) -> anyhow::Result<ExportFormat> {
    let format = ExportFormat::for_path(path);
    let content = match format {
        ExportFormat::Gcode => encoder.render_program(program),
        ExportFormat::Json => {
            serde_json::to_string_pretty(program).context("Failed to serialize plot program")?
        }
    };

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(
        "Exported {} commands as {:?} to {}",
        program.len(),
        format,
        path.display()
    );
    Ok(format)
}

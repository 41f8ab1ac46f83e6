//! # strokeplot
//!
//! Plots lines of text on a GRBL pen plotter using a single-stroke font.
//!
//! ## Architecture
//!
//! strokeplot is organized as a workspace with multiple crates:
//!
//! 1. **strokeplot-core** - Plot program types, scale handling, error taxonomy
//! 2. **strokeplot-designer** - Glyph store, text layout, G-code generation
//! 3. **strokeplot-communication** - Transports, reply parsing, the streaming state machine
//! 4. **strokeplot-settings** - Configuration files
//! 5. **strokeplot** - The job pipeline and the command line binary
//!
//! Data flows one way: text lines are compiled against the glyph store into
//! an immutable plot program, which is then either exported or streamed one
//! line at a time to the controller.

pub mod job;

pub use strokeplot_communication::{
    find_default_port, list_ports, CancelToken, ConnectionParams, Reply, SerialParity,
    SerialStreamer, SerialTransport, SimulatedController, StreamListener, StreamReport,
    StreamerConfig, StreamerState, Transport,
};
pub use strokeplot_core::{
    ConnectionError, Error, FontError, LayoutError, PenState, PlotCommand, PlotProgram,
    ProtocolError, Result, Scale, TextHeight,
};
pub use strokeplot_designer::{GcodeEncoder, GlyphStore, MotionCompiler};
pub use strokeplot_settings::Config;

pub use job::{ExportFormat, PlotJob};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human readable, multi-line
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Initialize logging
///
/// Sets up structured logging with:
/// - Output on stderr, so exported G-code can go to stdout
/// - RUST_LOG environment variable support (default `info`)
/// - Pretty or JSON formatting
pub fn init_logging(format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_line_number(true)
                .pretty();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_line_number(true)
                .json();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}

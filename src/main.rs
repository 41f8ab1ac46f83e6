use anyhow::Context;
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use strokeplot::job::{self, PlotJob};
use strokeplot::{
    init_logging, list_ports, Config, LogFormat, PlotProgram, Reply, SerialStreamer,
    SerialTransport, SimulatedController, StreamListener, StreamReport, StreamerState,
    BUILD_DATE, VERSION,
};

/// Plot text on a pen plotter with a single-stroke font
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Text file to plot; each line is drawn below the previous one
    #[arg(default_value = "test.txt")]
    text: PathBuf,

    /// Text height in millimetres (4 to 10); asked for when not configured
    #[arg(long, value_name = "MM")]
    height: Option<i32>,

    /// Stroke font file
    #[arg(long, value_name = "PATH")]
    font: Option<PathBuf>,

    /// Configuration file (.toml or .json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Serial port, or "Auto"
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long, value_name = "RATE")]
    baud: Option<u32>,

    /// Write G-code (or JSON for .json) instead of streaming
    #[arg(short, long, value_name = "PATH", conflicts_with = "simulate")]
    output: Option<PathBuf>,

    /// Stream to a simulated controller
    #[arg(long)]
    simulate: bool,

    /// List plotter-like serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Save the effective configuration and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

/// Logs streaming progress in roughly ten steps
struct ProgressLogger {
    total: usize,
    next_report: usize,
}

impl ProgressLogger {
    fn new(commands: usize) -> Self {
        Self {
            total: 2 * commands + 3,
            next_report: 0,
        }
    }
}

impl StreamListener for ProgressLogger {
    fn on_state_change(&mut self, from: StreamerState, to: StreamerState) {
        tracing::info!("{} -> {}", from, to);
    }

    fn on_exchange(&mut self, index: usize, line: &str, reply: &Reply) {
        tracing::debug!("[{}] {} => {}", index, line, reply);
        let done = index + 1;
        if done >= self.next_report || done == self.total {
            tracing::info!("Sent {}/{} lines", done, self.total);
            self.next_report = done + (self.total / 10).max(1);
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => match Config::default_path() {
            Ok(path) if path.exists() => Config::load_from_file(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            _ => Config::default(),
        },
    };

    if let Some(port) = &args.port {
        config.connection.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.connection.baud_rate = baud;
    }
    if let Some(font) = &args.font {
        config.font.path = font.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn prompt_height() -> anyhow::Result<i32> {
    print!("Enter desired text height in mm (4 to 10): ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read text height")?;
    input
        .trim()
        .parse::<i32>()
        .with_context(|| format!("Text height '{}' is not a whole number", input.trim()))
}

async fn stream(
    config: &Config,
    program: PlotProgram,
    simulate: bool,
) -> anyhow::Result<StreamReport> {
    let mut streamer = SerialStreamer::new(job::streamer_config(config))
        .with_listener(ProgressLogger::new(program.len()));
    let cancel = streamer.cancel_token();
    let connection = config.connection.clone();
    let ready_token = config.streaming.ready_token.clone();

    let mut task = tokio::task::spawn_blocking(move || {
        if simulate {
            streamer.run(move || Ok(SimulatedController::new(ready_token)), program)
        } else {
            streamer.run(
                move || {
                    let params = job::connection_params(&connection)?;
                    SerialTransport::open(&params)
                },
                program,
            )
        }
    });

    let joined = tokio::select! {
        joined = &mut task => joined,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    tracing::warn!("Interrupted, stopping the plot");
                    cancel.cancel();
                }
                Err(e) => tracing::warn!("Cannot listen for Ctrl-C: {}", e),
            }
            task.await
        }
    };

    let report = joined.context("Streaming task failed")??;
    Ok(report)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.log_format)?;
    tracing::info!("strokeplot {} (built {})", VERSION, BUILD_DATE);

    if args.list_ports {
        for port in list_ports()? {
            println!("{}\t{}", port.port_name, port.description);
        }
        return Ok(());
    }

    let config = load_config(&args)?;

    if let Some(path) = &args.write_config {
        config
            .save_to_file(path)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        return Ok(());
    }

    let height = match args.height.or(config.layout.text_height) {
        Some(height) => height,
        None => prompt_height()?,
    };

    let plot_job = PlotJob::prepare(height, &args.text, &config.font.path)?;
    let program = plot_job.compile();

    if let Some(output) = &args.output {
        job::export(&program, &job::encoder(&config), output)?;
        return Ok(());
    }

    let report = stream(&config, program, args.simulate).await?;
    println!(
        "Plotted {} commands ({} lines sent) in {:.1?}",
        report.commands, report.exchanges, report.elapsed
    );
    Ok(())
}

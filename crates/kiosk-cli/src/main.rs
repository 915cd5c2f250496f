//! `kiosk`: drives the photo card dispenser from the command line.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod input;

use kiosk_core::KioskConfig;

#[derive(Parser, Debug)]
#[command(name = "kiosk", version = kiosk_core::VERSION)]
#[command(about = "Photo card kiosk: relay discovery, dispensing and hardware checks")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(short, long, default_value = "info", global = true,
          value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sweep the candidate subnets and list every relay controller that answers
    Discover,

    /// Bind a relay and dispense for each code read from stdin
    Run(TransportArgs),

    /// Pulse the relay once
    Trigger {
        #[command(flatten)]
        transport: TransportArgs,

        /// Pulse length; the configured relay duration when omitted
        #[arg(long, value_name = "MS")]
        duration_ms: Option<u64>,
    },
}

/// Which relay to drive.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
struct TransportArgs {
    /// Relay controller address (host or host:port)
    #[arg(long, value_name = "ADDR", conflicts_with = "usb")]
    network: Option<String>,

    /// Use the USB relay board
    #[arg(long)]
    usb: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format)?;

    let config = KioskConfig::load_or_default(cli.config.as_deref()).with_context(|| {
        match &cli.config {
            Some(path) => format!("Failed to load configuration from {}", path.display()),
            None => "Invalid default configuration".to_string(),
        }
    })?;

    info!(version = kiosk_core::VERSION, "Kiosk starting");

    match cli.command {
        Command::Discover => app::discover(&config).await,
        Command::Run(transport) => app::run(config, transport.into()).await,
        Command::Trigger {
            transport,
            duration_ms,
        } => app::trigger(config, transport.into(), duration_ms).await,
    }
}

fn init_logging(log_level: &str, log_format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("Failed to initialise JSON logging")?,
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("Failed to initialise pretty logging")?,
    }

    Ok(())
}

impl From<TransportArgs> for app::Transport {
    fn from(args: TransportArgs) -> Self {
        if args.usb {
            Self::Usb
        } else {
            Self::Network(args.network)
        }
    }
}

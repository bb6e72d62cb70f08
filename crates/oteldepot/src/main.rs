//! oteldepot server binary.

use clap::{Parser, Subcommand};
use oteldepot::{Server, ServerConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "oteldepot",
    version,
    about = "OpenTelemetry signal depot: OTLP receiver and fetch API server"
)]
struct Cli {
    /// Config file path.
    #[arg(long, env = "OTELDEPOT_CONFIG", default_value = "oteldepot.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "OTELDEPOT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable colored log output.
    #[arg(long, env = "OTELDEPOT_LOG_COLOR")]
    log_color: Option<bool>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the depot server (default).
    Serve,
    /// Show version.
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Version => {
            println!("oteldepot {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Serve => {
            init_logging(&cli.log_level, cli.log_color)?;
            tracing::info!("starting oteldepot");

            let config = ServerConfig::load(&cli.config)?;
            tracing::info!(config = %cli.config, "configuration loaded");

            let server = Server::new(config)?;
            server.run().await?;

            tracing::info!("shutdown complete");
            Ok(())
        }
    }
}

fn init_logging(level: &str, color: Option<bool>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(color.unwrap_or(true)),
        )
        .init();
    Ok(())
}

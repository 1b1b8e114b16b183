//! TrueX market-making data plane - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// TrueX FIX market-making data plane
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TRUEX_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    truex_telemetry::init_logging()?;

    info!("Starting truex-bot v{}", env!("CARGO_PKG_VERSION"));

    let config = truex_bot::AppConfig::load(args.config)?;
    info!(
        host = %config.host,
        port = config.port,
        symbols = ?config.symbols,
        "Configuration loaded"
    );

    let mut app = truex_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}

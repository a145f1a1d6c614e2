//! Trade queue daemon entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Trade request queue daemon
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TRADEQ_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tradeq_bot::logging::init_logging();

    info!("Starting tradeq v{}", env!("CARGO_PKG_VERSION"));

    // Config path: CLI arg > TRADEQ_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("TRADEQ_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = tradeq_bot::AppConfig::load_or_default(&config_path)?;

    let app = tradeq_bot::Application::new(config);
    app.run().await?;

    Ok(())
}

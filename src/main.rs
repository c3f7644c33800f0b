use anyhow::Result;
use clap::Parser;
use heliograph::Uploader;
use heliograph::cli::Cli;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mode = cli.mode();
    let config = cli.into_config()?;

    heliograph::logging::init_logging(&config.logging)?;
    debug!("heliograph version {}", env!("CARGO_PKG_VERSION"));

    // Pre-flight: contradictory or missing credentials abort before any
    // network activity
    config.validate(&mode)?;

    let mut uploader = Uploader::new(config)?;
    uploader.run(&mode).await?;
    Ok(())
}

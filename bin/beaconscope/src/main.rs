//! Entrypoint.

use clap::Parser;
use config::Opts;
use driver::Driver;
use dotenvy::dotenv;
use runtime::shutdown::{ShutdownSignal, run_until_shutdown};
use tracing::info;
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    if let Ok(custom_env_file) = std::env::var("ENV_FILE") {
        dotenvy::from_filename(custom_env_file)?;
    } else {
        // Try the default .env file, and ignore if it doesn't exist.
        dotenv().ok();
    }

    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!("Beaconscope indexer starting...");

    let driver = Driver::new(opts).await?;
    let shutdown = ShutdownSignal::new()?;
    run_until_shutdown(driver.start(), shutdown, || info!("Shutdown signal received, exiting"))
        .await
        .unwrap_or(Ok(()))
}

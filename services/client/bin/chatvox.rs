//! Main Entrypoint for the Chatvox Terminal Client
//!
//! This binary is responsible for:
//! 1. Parsing command-line overrides and loading configuration.
//! 2. Initializing logging (to stderr, so the transcript owns stdout).
//! 3. Constructing the session controller and running its event loop.

use anyhow::Context;
use chatvox_client::{
    audio,
    config::{Cli, Config},
    session::SessionController,
};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli).context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    if cli.list_devices {
        for name in audio::capture::list_input_devices().context("cannot list microphones")? {
            println!("input:  {name}");
        }
        for name in audio::playback::list_output_devices().context("cannot list speakers")? {
            println!("output: {name}");
        }
        return Ok(());
    }

    tracing::info!(server = %config.server_url, "starting session");
    let mut session = SessionController::new(config);
    session.run().await?;

    tracing::info!("session ended");
    Ok(())
}

//! klad - command line front end for the Klad connector
//!
//! Exercises the PostgreSQL and file-store clients against whatever the
//! environment is configured for.

mod commands;

use clap::Command;
use color_eyre::eyre::eyre;
use klad_connector::{ConnectorConfig, config, error, logging};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    error::install_error_handlers()?;

    // Pick up a .env file before anything reads the environment
    let dotenv_path = config::init().map_err(|e| eyre!("Failed to load .env file: {}", e))?;

    // Load configuration from file and/or environment variables
    let config =
        ConnectorConfig::load().map_err(|e| eyre!("Failed to load configuration: {}", e))?;
    config.validate().map_err(|e| eyre!("Invalid configuration: {}", e))?;

    // Initialize logging
    logging::init(&config.logging);

    if let Some(path) = dotenv_path {
        debug!("Loaded environment from {}", path.display());
    }

    // Define base CLI structure
    let base_app = Command::new("klad")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Official Unofficial, Inc.")
        .about("PostgreSQL and file-store connector");

    // Register all command modules
    let app = commands::register_commands(base_app);

    // Parse command line arguments
    let matches = app.get_matches();

    // Handle commands based on matches
    commands::handle_commands(matches, &config).await?;

    info!("Done");
    Ok(())
}

use anyhow::Result;
use clap::Parser;
use log::info;

use atlas_cli::cli::app::{Cli, Commands};
use atlas_cli::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env().init();

    let cli = Cli::parse();
    info!("Starting atlas-cli");

    // Initialize the global Config once
    let config = Config::load().await?;
    atlas_cli::init_global_config(config)?;

    match cli.command {
        Commands::Auth(auth_args) => {
            atlas_cli::cli::commands::auth_command(auth_args).await?;
        }
    }

    Ok(())
}

use clap::{Parser, Subcommand};

use super::commands::AuthCommands;

#[derive(Parser)]
#[command(name = "atlas-cli")]
#[command(about = "A CLI tool for interacting with the Atlas data platform")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Authentication management
    Auth(AuthCommands),
}

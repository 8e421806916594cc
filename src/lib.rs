pub mod auth;
pub mod cli;
pub mod config;
pub mod http;

use anyhow::Result;
use once_cell::sync::OnceCell;

// Global Config instance
static CONFIG: OnceCell<config::Config> = OnceCell::new();

/// Initialize the global Config (called once at startup)
pub fn init_global_config(config: config::Config) -> Result<()> {
    CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("Config already initialized"))
}

/// Get a reference to the global Config
pub fn global_config() -> &'static config::Config {
    CONFIG.get().expect("Config not initialized")
}

//! CLI command implementations.

pub mod config;
pub mod normalize;
pub mod replay;

use clap::{Args, Subcommand};

/// Arguments for the replay command.
#[derive(Args)]
pub struct ReplayArgs {
    /// Path to the session script (JSON).
    pub script: String,

    /// Print the final cache contents.
    #[arg(long)]
    pub show_cache: bool,
}

/// Arguments for the normalize command.
#[derive(Args)]
pub struct NormalizeArgs {
    /// URL to normalize.
    pub url: String,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration.
    Show,
    /// Write a default config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

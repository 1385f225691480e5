//! Command-line argument structures and enums

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sitesync")]
#[command(version)]
#[command(about = "Inspect and repair the site's content across remote, backend and local cache", long_about = None)]
pub struct Cli {
    /// Use this config file instead of the default location
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Capability string used for platform detection (overrides SITESYNC_PLATFORM)
    #[arg(short, long, global = true)]
    pub platform: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load the content and print it
    Show {
        /// Print only this section (e.g. "hero", "apartments")
        #[arg(short, long)]
        section: Option<String>,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Load the content from the remote store and report where it came from
    Pull {
        /// Read the remote record directly, bypassing intermediate caches
        #[arg(long)]
        direct: bool,
    },

    /// Write the current content to the remote store
    Push,

    /// Apply an editor command given as JSON
    ///
    /// Example: '{"type":"RemoveApartment","params":{"id":"3"}}'
    Apply {
        /// Command JSON
        command: String,
    },

    /// Save the current content through the site's backend
    ServerSave,

    /// Replace the current content with what the site's backend holds
    ServerLoad,

    /// Reset the content to the built-in defaults
    Reset {
        /// Also clear every cache layer and reload
        #[arg(long)]
        refresh: bool,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show or edit configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Print the config file location
    Path,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

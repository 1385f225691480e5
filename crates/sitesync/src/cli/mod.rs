/// Clap argument definitions
mod args;

/// Config command handlers
mod config;

/// `show`, `pull`, `push`, `apply` and `reset`
mod content;

/// `server-save` and `server-load`
mod server;

/// Shared CLI utilities
mod util;

use clap::Parser;
use std::path::PathBuf;

use sitesync_core::app::SiteSync;
use sitesync_core::config::SiteSyncConfig;

pub use args::Cli;
use args::Commands;

/// Environment variable overriding the platform capability string
pub const PLATFORM_ENV: &str = "SITESYNC_PLATFORM";

/// Main entry point for the CLI
pub fn run_cli() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let config = match util::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Error loading config: {}", e);
            std::process::exit(1);
        }
    };
    let config = util::apply_platform_override(config, cli.platform, std::env::var(PLATFORM_ENV).ok());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("✗ Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let success = runtime.block_on(run_command(cli.command, cli.config, &config));

    if !success {
        std::process::exit(1);
    }
}

async fn run_command(command: Commands, config_path: Option<PathBuf>, config: &SiteSyncConfig) -> bool {
    match command {
        Commands::Config { command } => config::handle_config_command(command, config_path, config),
        Commands::Show { section, json } => {
            with_sync(config, async |sync| content::handle_show(sync, section, json).await).await
        }
        Commands::Pull { direct } => {
            with_sync(config, async |sync| content::handle_pull(sync, direct).await).await
        }
        Commands::Push => with_sync(config, async |sync| content::handle_push(sync).await).await,
        Commands::Apply { command } => {
            with_sync(config, async |sync| content::handle_apply(sync, &command).await).await
        }
        Commands::ServerSave => {
            with_sync(config, async |sync| server::handle_server_save(sync).await).await
        }
        Commands::ServerLoad => {
            with_sync(config, async |sync| server::handle_server_load(sync).await).await
        }
        Commands::Reset { refresh, yes } => {
            with_sync(config, async |sync| content::handle_reset(sync, refresh, yes).await).await
        }
    }
}

/// Open the sync layer, run `handler`, then wait for queued remote writes.
async fn with_sync(config: &SiteSyncConfig, handler: impl AsyncFnOnce(&SiteSync) -> bool) -> bool {
    let sync = match util::open(config) {
        Ok(sync) => sync,
        Err(e) => {
            eprintln!("✗ {}", e);
            return false;
        }
    };

    let success = handler(&sync).await;

    // Queued remote writes finish before the process exits
    sync.flush().await;
    success
}

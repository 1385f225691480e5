//! Shared CLI utilities

use std::path::Path;
use std::sync::Arc;

use sitesync_core::app::{SiteSync, SiteSyncBuilder};
use sitesync_core::config::SiteSyncConfig;
use sitesync_core::error::Result;
use sitesync_core::events::SyncEvent;

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<SiteSyncConfig> {
    match path {
        Some(path) => SiteSyncConfig::load_from(path),
        None => SiteSyncConfig::load(),
    }
}

/// Pick the capability string: the flag, then the environment, then the config.
pub fn apply_platform_override(
    mut config: SiteSyncConfig,
    flag: Option<String>,
    env: Option<String>,
) -> SiteSyncConfig {
    if let Some(capabilities) = flag.or(env).filter(|c| !c.trim().is_empty()) {
        config.platform.capabilities = Some(capabilities);
    }
    config
}

/// Build a [`SiteSync`] and log its events.
///
/// Must be called inside the runtime.
pub fn open(config: &SiteSyncConfig) -> Result<SiteSync> {
    let sync = SiteSyncBuilder::from_config(config)?.build();
    sync.events().subscribe(Arc::new(log_event));
    log::debug!("Platform: {}", sync.platform());
    Ok(sync)
}

fn log_event(event: &SyncEvent) {
    if event.is_failure() {
        log::warn!("{}: {:?}", event.event_type(), event);
    } else {
        log::info!("{}: {:?}", event.event_type(), event);
    }
}

/// Ask a yes/no question on stdin. Anything but "y" or "yes" is a no.
pub fn confirm(prompt: &str) -> bool {
    use std::io::{self, Write};

    print!("{} [y/N] ", prompt);
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

//! Config command handlers

use std::path::PathBuf;

use sitesync_core::config::SiteSyncConfig;

use crate::cli::args::ConfigCommands;

pub fn handle_config_command(
    command: Option<ConfigCommands>,
    path_override: Option<PathBuf>,
    config: &SiteSyncConfig,
) -> bool {
    let path = path_override.or_else(SiteSyncConfig::config_path);

    match command {
        None | Some(ConfigCommands::Show) => show_config(config, path.as_ref()),
        Some(ConfigCommands::Path) => match path {
            Some(path) => {
                println!("{}", path.display());
                true
            }
            None => {
                eprintln!("✗ Could not determine config directory");
                false
            }
        },
        Some(ConfigCommands::Init { force }) => init_config(path, force),
    }
}

/// Show the effective configuration
fn show_config(config: &SiteSyncConfig, path: Option<&PathBuf>) -> bool {
    println!("Sitesync Configuration");
    println!("======================");
    if let Some(path) = path {
        let state = if path.exists() { "" } else { " (not created)" };
        println!("Config file: {}{}", path.display(), state);
    }
    println!(
        "Remote store: {}",
        if config.remote.is_configured() {
            "configured"
        } else {
            "offline"
        }
    );
    println!();

    let mut shown = config.clone();
    if shown.remote.api_key.is_some() {
        shown.remote.api_key = Some("********".to_string());
    }
    match toml::to_string_pretty(&shown) {
        Ok(text) => {
            print!("{}", text);
            true
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            false
        }
    }
}

/// Write a default config file
fn init_config(path: Option<PathBuf>, force: bool) -> bool {
    let Some(path) = path else {
        eprintln!("✗ Could not determine config directory");
        return false;
    };

    if path.exists() && !force {
        eprintln!(
            "✗ {} already exists (use --force to overwrite)",
            path.display()
        );
        return false;
    }

    match SiteSyncConfig::default().save_to(&path) {
        Ok(()) => {
            println!("✓ Wrote {}", path.display());
            true
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        assert!(init_config(Some(path.clone()), false));
        assert!(path.exists());
        assert!(!init_config(Some(path.clone()), false));
        assert!(init_config(Some(path.clone()), true));

        let loaded = SiteSyncConfig::load_from(&path).unwrap();
        assert_eq!(loaded, SiteSyncConfig::default());
    }
}

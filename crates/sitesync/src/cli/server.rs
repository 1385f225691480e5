//! Alternate backend command handlers

use sitesync_core::app::SiteSync;
use sitesync_core::server_path::SaveOutcome;

/// Handle the server-save command
pub async fn handle_server_save(sync: &SiteSync) -> bool {
    sync.hydrate().await;

    match sync.push_to_server().await {
        SaveOutcome::Saved { timestamp } => {
            println!("✓ Saved to backend at {}", timestamp);
            true
        }
        SaveOutcome::SavedLocally { timestamp } => {
            eprintln!("⚠ Backend unavailable, kept a local copy ({})", timestamp);
            false
        }
        SaveOutcome::Skipped => {
            eprintln!("⚠ Another save was in flight, nothing sent");
            false
        }
    }
}

/// Handle the server-load command
pub async fn handle_server_load(sync: &SiteSync) -> bool {
    sync.hydrate().await;

    match sync.pull_from_server().await {
        Ok(Some(report)) => {
            println!("✓ Content replaced from backend");
            if let Some(warning) = report.warning {
                eprintln!("⚠ Not saved locally: {}", warning.message);
            }
            true
        }
        Ok(None) => {
            eprintln!("✗ Backend holds no content");
            false
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            false
        }
    }
}

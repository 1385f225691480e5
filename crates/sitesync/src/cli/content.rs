//! Content command handlers

use sitesync_core::app::SiteSync;
use sitesync_core::command::Command;
use sitesync_core::model::{SECTIONS, SiteContent};
use sitesync_core::platform::PlatformClass;
use sitesync_core::remote::RemoteWriteStatus;
use sitesync_core::store::{DispatchReport, HydrateReport, HydrateSource};

use crate::cli::util::confirm;

/// Handle the show command
pub async fn handle_show(sync: &SiteSync, section: Option<String>, json: bool) -> bool {
    sync.hydrate().await;
    let content = sync.store().content();

    if let Some(section) = section {
        if !SECTIONS.contains(&section.as_str()) && !content.extra.contains_key(&section) {
            eprintln!("✗ Unknown section '{}'. Sections: {}", section, SECTIONS.join(", "));
            return false;
        }
        let value = content.to_value();
        return print_json(&value[section.as_str()]);
    }

    if json {
        return print_json(&content.to_value());
    }

    print_summary(&content);
    true
}

/// Handle the pull command
pub async fn handle_pull(sync: &SiteSync, direct: bool) -> bool {
    if direct {
        return match sync.mobile().load_direct_from_remote().await {
            Some(data) => print_json(&data),
            None => {
                eprintln!("✗ Remote store returned nothing");
                false
            }
        };
    }

    let report = sync.hydrate().await;
    print_hydrate_report(&report);
    println!("Platform: {}", sync.platform());
    true
}

/// Handle the push command
pub async fn handle_push(sync: &SiteSync) -> bool {
    sync.hydrate().await;
    let content = sync.store().content().to_value();

    match sync.platform() {
        PlatformClass::Standard => match sync.remote().save_data(&content).await {
            RemoteWriteStatus::Synced => {
                println!("✓ Remote store updated");
                true
            }
            RemoteWriteStatus::BackedUpLocally { reason } => {
                eprintln!("✗ Remote write failed, kept a local backup: {}", reason);
                false
            }
        },
        PlatformClass::MobileAggressive => {
            if sync.mobile().save_direct_to_remote(&content).await {
                println!("✓ Remote store updated (direct)");
                true
            } else {
                eprintln!("✗ Direct remote write failed");
                false
            }
        }
    }
}

/// Handle the apply command
pub async fn handle_apply(sync: &SiteSync, raw: &str) -> bool {
    let command: Command = match serde_json::from_str(raw) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("✗ Invalid command JSON: {}", e);
            return false;
        }
    };

    sync.hydrate().await;
    let name = command.name();
    match sync.store().dispatch(command).await {
        Ok(report) => {
            print_dispatch_report(name, &report);
            true
        }
        Err(e) => {
            eprintln!("✗ {} rejected: {}", name, e);
            false
        }
    }
}

/// Handle the reset command
pub async fn handle_reset(sync: &SiteSync, refresh: bool, yes: bool) -> bool {
    if !yes && !confirm("Reset all site content to the defaults?") {
        println!("Cancelled.");
        return true;
    }

    sync.hydrate().await;
    let report = match sync.reset().await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("✗ Reset failed: {}", e);
            return false;
        }
    };
    print_dispatch_report("ResetContent", &report);

    if !refresh {
        return true;
    }

    let refresh = sync.force_refresh().await;
    println!(
        "Cleared {} cache keys (kept {})",
        refresh.cache.removed, refresh.cache.preserved
    );
    if let Some(url) = &refresh.reload_url {
        println!("Reload requested: {}", url);
    }
    for failure in &refresh.failures {
        eprintln!("⚠ {}", failure);
    }
    refresh.failures.is_empty()
}

fn print_json(value: &serde_json::Value) -> bool {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            true
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            false
        }
    }
}

fn print_summary(content: &SiteContent) {
    println!("{}", content.hero.title);
    println!("{}", "=".repeat(content.hero.title.chars().count().max(3)));
    if !content.hero.subtitle.is_empty() {
        println!("{}", content.hero.subtitle);
    }
    println!();

    println!("Apartments ({}):", content.apartments.len());
    for apartment in &content.apartments {
        println!(
            "  [{}] {} - {:.2}/night, up to {} guests",
            apartment.id, apartment.name, apartment.price_per_night, apartment.max_guests
        );
    }

    let active = content.promotions.iter().filter(|p| p.active).count();
    println!("Promotions: {} ({} active)", content.promotions.len(), active);
    println!("Reviews: {}", content.reviews.len());
    println!("Contact: {} / {}", content.contact.email, content.contact.phone);

    if !content.extra.is_empty() {
        let names: Vec<&str> = content.extra.keys().map(String::as_str).collect();
        println!("Other sections: {}", names.join(", "));
    }
}

fn print_hydrate_report(report: &HydrateReport) {
    match report.source {
        HydrateSource::Stored => println!("✓ Loaded stored content"),
        HydrateSource::Default => println!("No stored content, using defaults"),
    }
    if let Some(version) = report.migrated_from {
        println!("  Migrated from schema version {}", version);
    }
    if !report.replaced_sections.is_empty() {
        println!(
            "  Reset unreadable sections: {}",
            report.replaced_sections.join(", ")
        );
    }
}

fn print_dispatch_report(name: &str, report: &DispatchReport) {
    match &report.warning {
        None => println!("✓ {} applied", name),
        Some(warning) => {
            println!("✓ {} applied", name);
            eprintln!("⚠ Not saved locally: {}", warning.message);
        }
    }
}

//! Schema migration for persisted site content.
//!
//! Older app versions persisted documents that lack sections, fields or
//! apartments introduced since. Migration upgrades such a document to the
//! current shape without discarding anything the editor wrote:
//!
//! * object sections merge shallowly, stored keys winning over defaults;
//! * arrays of objects keyed by `id` merge element-wise: each default
//!   element absorbs the stored element with the same id, default order is
//!   kept, and stored elements with no default counterpart are appended;
//! * any other stored value replaces the default wholesale;
//! * sections only present in the default are filled in, sections only
//!   present in storage are kept.
//!
//! Merging is idempotent: migrating an already migrated document with the
//! same defaults returns it unchanged.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

use crate::model::{
    About, Apartment, CURRENT_VERSION, Contact, Hero, Promotion, Review, SECTIONS, Seo,
    SiteContent, SocialLinks,
};

/// Result of migrating a stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    /// The upgraded document.
    pub content: SiteContent,
    /// Sections whose stored shape could not be read and were reset to defaults.
    pub replaced_sections: Vec<String>,
}

/// Whether a stored document must go through migration.
pub fn needs_migration(stored_version: u32, content: &JsonValue) -> bool {
    stored_version < CURRENT_VERSION
        || serde_json::from_value::<SiteContent>(content.clone()).is_err()
}

/// Merge a stored document over a default document.
pub fn migrate_value(stored: &JsonValue, default: &JsonValue) -> JsonValue {
    let (Some(stored), Some(default)) = (stored.as_object(), default.as_object()) else {
        // Nothing usable in storage, or defaults are not sectioned
        return if stored.is_object() {
            stored.clone()
        } else {
            default.clone()
        };
    };

    let mut merged = Map::new();
    for (section, default_value) in default {
        let value = match stored.get(section) {
            Some(stored_value) => merge_section(default_value, stored_value),
            None => default_value.clone(),
        };
        merged.insert(section.clone(), value);
    }
    for (section, stored_value) in stored {
        if !merged.contains_key(section) {
            merged.insert(section.clone(), stored_value.clone());
        }
    }

    JsonValue::Object(merged)
}

fn merge_section(default: &JsonValue, stored: &JsonValue) -> JsonValue {
    match (default, stored) {
        (JsonValue::Object(d), JsonValue::Object(s)) => shallow_merge(d, s),
        (JsonValue::Array(d), JsonValue::Array(s)) if is_id_keyed(d) || is_id_keyed(s) => {
            merge_by_id(d, s)
        }
        _ => stored.clone(),
    }
}

fn shallow_merge(default: &Map<String, JsonValue>, stored: &Map<String, JsonValue>) -> JsonValue {
    let mut merged = default.clone();
    for (key, value) in stored {
        merged.insert(key.clone(), value.clone());
    }
    JsonValue::Object(merged)
}

fn element_id(value: &JsonValue) -> Option<String> {
    match value.get("id")? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_id_keyed(items: &[JsonValue]) -> bool {
    !items.is_empty() && items.iter().all(|item| element_id(item).is_some())
}

fn merge_by_id(default: &[JsonValue], stored: &[JsonValue]) -> JsonValue {
    let mut used = HashSet::new();
    let mut merged = Vec::with_capacity(default.len().max(stored.len()));

    for default_item in default {
        let id = element_id(default_item);
        let matched = stored.iter().enumerate().find(|(i, item)| {
            !used.contains(i) && id.is_some() && element_id(item) == id
        });

        match (matched, default_item) {
            (Some((i, JsonValue::Object(s))), JsonValue::Object(d)) => {
                used.insert(i);
                merged.push(shallow_merge(d, s));
            }
            (Some((i, stored_item)), _) => {
                used.insert(i);
                merged.push(stored_item.clone());
            }
            (None, _) => merged.push(default_item.clone()),
        }
    }

    // Units the editor added that the defaults know nothing about
    for (i, stored_item) in stored.iter().enumerate() {
        if !used.contains(&i) {
            merged.push(stored_item.clone());
        }
    }

    JsonValue::Array(merged)
}

fn fits<T: DeserializeOwned>(value: &JsonValue) -> bool {
    serde_json::from_value::<T>(value.clone()).is_ok()
}

fn section_fits(section: &str, value: &JsonValue) -> bool {
    match section {
        "hero" => fits::<Hero>(value),
        "about" => fits::<About>(value),
        "contact" => fits::<Contact>(value),
        "apartments" => fits::<Vec<Apartment>>(value),
        "promotions" => fits::<Vec<Promotion>>(value),
        "reviews" => fits::<Vec<Review>>(value),
        "seo" => fits::<Seo>(value),
        "social" => fits::<SocialLinks>(value),
        _ => true,
    }
}

/// Migrate a stored content document to the current [`SiteContent`] shape.
///
/// Never fails: sections that cannot be read are reset to the compiled
/// default and reported in [`MigrationOutcome::replaced_sections`].
pub fn migrate_content(stored: &JsonValue) -> MigrationOutcome {
    let default = SiteContent::default().to_value();
    let mut merged = migrate_value(stored, &default);

    let mut replaced_sections = Vec::new();
    for section in SECTIONS {
        let usable = merged.get(*section).is_some_and(|v| section_fits(section, v));
        if !usable {
            log::warn!(
                "[migration] Stored '{}' section has an unreadable shape, using defaults",
                section
            );
            merged[*section] = default[*section].clone();
            replaced_sections.push(section.to_string());
        }
    }

    match serde_json::from_value(merged) {
        Ok(content) => MigrationOutcome {
            content,
            replaced_sections,
        },
        Err(e) => {
            log::error!("[migration] Migrated document still unreadable: {}", e);
            MigrationOutcome {
                content: SiteContent::default(),
                replaced_sections: SECTIONS.iter().map(|s| s.to_string()).collect(),
            }
        }
    }
}

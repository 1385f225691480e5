//! Site content document and persisted envelope.
//!
//! [`SiteContent`] is the single document the editor mutates. The sync
//! layer treats it as an opaque JSON blob; only the store and the
//! migration pipeline look inside. JSON field names are camelCase to
//! match what the web frontend reads.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Schema version written by this build.
///
/// Bump whenever [`SiteContent::default`] gains sections, fields or
/// apartments, so stored documents get migrated on the next hydrate.
pub const CURRENT_VERSION: u32 = 14;

/// Version stamped on envelopes built from remote rows that recorded no
/// schema version. Such content always goes through migration.
pub const REMOTE_ORIGIN_VERSION: u32 = 0;

/// Top-level section names, in document order.
pub const SECTIONS: &[&str] = &[
    "hero",
    "about",
    "contact",
    "apartments",
    "promotions",
    "reviews",
    "seo",
    "social",
];

/// The whole site's editable content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteContent {
    /// Landing banner.
    pub hero: Hero,
    /// About-us block.
    pub about: About,
    /// Contact details.
    pub contact: Contact,
    /// Rentable units, keyed by `id`.
    pub apartments: Vec<Apartment>,
    /// Active and scheduled promotions, keyed by `id`.
    pub promotions: Vec<Promotion>,
    /// Guest reviews, keyed by `id`.
    pub reviews: Vec<Review>,
    /// Search engine metadata.
    pub seo: Seo,
    /// Social profile links.
    pub social: SocialLinks,
    /// Sections written by newer app versions, kept verbatim.
    #[serde(flatten)]
    pub extra: IndexMap<String, JsonValue>,
}

/// Landing banner.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Hero {
    pub title: String,
    pub subtitle: String,
    pub background_image: String,
    pub cta_text: String,
}

/// About-us block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct About {
    pub title: String,
    pub description: String,
    pub image: String,
    pub highlights: Vec<String>,
}

/// Contact details.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Contact {
    pub phone: String,
    pub email: String,
    pub address: String,
    pub whatsapp: String,
    pub map_url: String,
}

/// A rentable unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Apartment {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price_per_night: f64,
    pub max_guests: u32,
    pub min_nights: u32,
    pub images: Vec<String>,
    pub amenities: Vec<String>,
    /// External availability feed, consumed by the calendar widget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ical_url: Option<String>,
}

/// A promotion banner.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Promotion {
    pub id: String,
    pub title: String,
    pub description: String,
    pub discount_percent: u8,
    pub active: bool,
}

/// A guest review.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub author: String,
    pub rating: u8,
    pub text: String,
    pub date: String,
}

/// Search engine metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Seo {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub og_image: String,
}

/// Social profile links.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SocialLinks {
    pub facebook: String,
    pub instagram: String,
    pub tripadvisor: String,
    pub airbnb: String,
    pub booking: String,
}

/// Editor login state, persisted next to the content.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSession {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Everything the store holds in memory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SiteState {
    pub content: SiteContent,
    #[serde(default)]
    pub user: UserSession,
}

/// What lives in the local cache under the content key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEnvelope {
    pub state: SiteState,
    pub version: u32,
}

impl PersistedEnvelope {
    /// Wrap state at the current schema version.
    pub fn current(state: SiteState) -> Self {
        Self {
            state,
            version: CURRENT_VERSION,
        }
    }
}

impl SiteContent {
    /// Look up an apartment by id.
    pub fn apartment(&self, id: &str) -> Option<&Apartment> {
        self.apartments.iter().find(|a| a.id == id)
    }

    /// Serialize to a JSON value.
    pub fn to_value(&self) -> JsonValue {
        // Plain structs of strings, numbers and maps always serialize
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

fn apartment(
    id: &str,
    name: &str,
    description: &str,
    price_per_night: f64,
    max_guests: u32,
    min_nights: u32,
) -> Apartment {
    Apartment {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        price_per_night,
        max_guests,
        min_nights,
        images: vec![format!("/images/apartments/{}/cover.jpg", id)],
        amenities: vec![
            "Wi-Fi".to_string(),
            "Air conditioning".to_string(),
            "Kitchen".to_string(),
        ],
        ical_url: None,
    }
}

impl Default for SiteContent {
    fn default() -> Self {
        Self {
            hero: Hero {
                title: "Seaside Apartments".to_string(),
                subtitle: "Bright apartments two minutes from the beach".to_string(),
                background_image: "/images/hero.jpg".to_string(),
                cta_text: "Check availability".to_string(),
            },
            about: About {
                title: "About us".to_string(),
                description: "A family-run building with three renovated apartments."
                    .to_string(),
                image: "/images/about.jpg".to_string(),
                highlights: vec![
                    "Sea view terraces".to_string(),
                    "Free parking".to_string(),
                    "Self check-in".to_string(),
                ],
            },
            contact: Contact {
                phone: "+34 600 000 000".to_string(),
                email: "hello@example.com".to_string(),
                address: "Paseo Maritimo 1".to_string(),
                whatsapp: "+34600000000".to_string(),
                map_url: String::new(),
            },
            apartments: vec![
                apartment("1", "Studio", "Cosy studio for two.", 75.0, 2, 2),
                apartment("2", "Default", "One bedroom with terrace.", 95.0, 4, 3),
                apartment("3", "Penthouse", "Two bedrooms, rooftop views.", 140.0, 6, 4),
            ],
            promotions: vec![Promotion {
                id: "early-booking".to_string(),
                title: "Early booking".to_string(),
                description: "Book 60 days ahead and save.".to_string(),
                discount_percent: 10,
                active: false,
            }],
            reviews: Vec::new(),
            seo: Seo {
                title: "Seaside Apartments | Holiday rentals".to_string(),
                description: "Holiday apartments by the beach.".to_string(),
                keywords: vec!["apartments".to_string(), "beach".to_string()],
                og_image: "/images/og.jpg".to_string(),
            },
            social: SocialLinks::default(),
            extra: IndexMap::new(),
        }
    }
}

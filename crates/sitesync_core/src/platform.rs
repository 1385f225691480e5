//! Platform classification.
//!
//! Some mobile browsers serve bytes from intermediate caches even when the
//! application cache is correct. Clients on those platforms are routed to
//! the mobile-aggressive persistence path; everyone else uses the standard
//! path. Classification is a pure function of the client's capability
//! string and is recomputed on every storage call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Markers that select the mobile-aggressive path when no list is configured.
pub const DEFAULT_MOBILE_MARKERS: &[&str] = &["iphone", "ipad", "ipod", "android", "mobile"];

/// Which storage branch applies to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum PlatformClass {
    /// Desktop and other well-behaved clients.
    Standard,
    /// Platforms known to serve stale content from intermediate caches.
    MobileAggressive,
}

impl PlatformClass {
    /// Short name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformClass::Standard => "standard",
            PlatformClass::MobileAggressive => "mobile",
        }
    }
}

impl std::fmt::Display for PlatformClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a capability string using [`DEFAULT_MOBILE_MARKERS`].
pub fn classify(capabilities: &str) -> PlatformClass {
    classify_with(capabilities, DEFAULT_MOBILE_MARKERS)
}

/// Classify a capability string against an explicit marker list.
///
/// Matching is case-insensitive substring matching.
pub fn classify_with<S: AsRef<str>>(capabilities: &str, markers: &[S]) -> PlatformClass {
    let haystack = capabilities.to_lowercase();
    let is_mobile = markers
        .iter()
        .map(|m| m.as_ref().trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .any(|m| haystack.contains(&m));

    if is_mobile {
        PlatformClass::MobileAggressive
    } else {
        PlatformClass::Standard
    }
}

/// Classification function injected into the storage strategy.
pub type Classifier = Arc<dyn Fn(&str) -> PlatformClass + Send + Sync>;

/// Build a classifier bound to a marker list.
pub fn classifier_for(markers: Vec<String>) -> Classifier {
    Arc::new(move |capabilities| classify_with(capabilities, &markers))
}

/// Read-only source of the client's platform capability string.
pub trait PlatformSignal: Send + Sync {
    /// Current capability string (e.g. a user agent).
    fn capabilities(&self) -> String;
}

/// A fixed capability string.
#[derive(Debug, Clone, Default)]
pub struct StaticSignal(pub String);

impl StaticSignal {
    /// Create a signal that always reports `capabilities`.
    pub fn new(capabilities: impl Into<String>) -> Self {
        Self(capabilities.into())
    }
}

impl PlatformSignal for StaticSignal {
    fn capabilities(&self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desktop_is_standard() {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0";
        assert_eq!(classify(ua), PlatformClass::Standard);
    }

    #[test]
    fn test_mobile_markers_select_aggressive_path() {
        let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148";
        let android = "Mozilla/5.0 (Linux; Android 14; Pixel 8)";
        assert_eq!(classify(iphone), PlatformClass::MobileAggressive);
        assert_eq!(classify(android), PlatformClass::MobileAggressive);
    }

    #[test]
    fn test_custom_markers() {
        let markers = vec!["kiosk".to_string(), "  ".to_string()];
        assert_eq!(
            classify_with("Lobby KIOSK build 7", &markers),
            PlatformClass::MobileAggressive
        );
        assert_eq!(classify_with("iPhone", &markers), PlatformClass::Standard);
    }

    #[test]
    fn test_empty_capabilities_are_standard() {
        assert_eq!(classify(""), PlatformClass::Standard);
    }

    #[test]
    fn test_classifier_closure() {
        let classifier = classifier_for(vec!["tablet".to_string()]);
        assert_eq!(classifier("Generic Tablet"), PlatformClass::MobileAggressive);
        assert_eq!(classifier("Desktop"), PlatformClass::Standard);
    }
}

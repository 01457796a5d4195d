//! # Request Classification
//!
//! Sorts every interceptable GET into the class that picks its serving
//! strategy.
//!
//! ## Classification Order (first match wins)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Request Classification                             │
//! │                                                                         │
//! │   1. StaticAsset   path extension ∈ static_extensions                  │
//! │   2. LiveApi       path under api_prefix AND contains a live pattern   │
//! │   3. CacheableApi  path under api_prefix                               │
//! │   4. Navigation    request accepts text/html                           │
//! │   5. Other         everything else                                     │
//! │                                                                         │
//! │   Non-GET methods and non-http(s) schemes never reach this point;      │
//! │   the router passes them through untouched.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The order is load-bearing: a `.js` file under the API prefix is still a
//! static asset, and an HTML navigation to `/index.html` classifies as a
//! navigation because `html` is deliberately absent from the extension list.

use crate::config::RouterConfig;
use crate::request::FetchRequest;

// =============================================================================
// Request Class
// =============================================================================

/// The five serving strategies a request can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Immutable asset: cache-first with background revalidation, against
    /// the static partition.
    StaticAsset,
    /// Live API data (auth, sync, notifications, crowdsource submissions):
    /// network-first with stale-cache fallback.
    LiveApi,
    /// Other API data: cache-first with background revalidation, against
    /// the dynamic partition.
    CacheableApi,
    /// HTML document request: network-first with app-shell fallback.
    Navigation,
    /// Everything else: network-first with a generic offline response.
    Other,
}

impl RequestClass {
    /// Stable name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::StaticAsset => "static_asset",
            RequestClass::LiveApi => "live_api",
            RequestClass::CacheableApi => "cacheable_api",
            RequestClass::Navigation => "navigation",
            RequestClass::Other => "other",
        }
    }
}

impl std::fmt::Display for RequestClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Classifier
// =============================================================================

/// Classifies a request. First match in the documented order wins.
pub fn classify(request: &FetchRequest, config: &RouterConfig) -> RequestClass {
    let path = match request.path() {
        Some(path) => path,
        None => return RequestClass::Other,
    };

    if let Some(ext) = extension(&path) {
        if config
            .static_extensions
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
        {
            return RequestClass::StaticAsset;
        }
    }

    if let Some(api_path) = path.strip_prefix(config.api_prefix.as_str()) {
        if config
            .live_patterns
            .iter()
            .any(|pattern| api_path.contains(pattern.as_str()))
        {
            return RequestClass::LiveApi;
        }
        return RequestClass::CacheableApi;
    }

    if request.is_navigation() {
        return RequestClass::Navigation;
    }

    RequestClass::Other
}

/// Extension of the final path segment, if any.
fn extension(path: &str) -> Option<&str> {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.rsplit_once('.').map(|(_, ext)| ext)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RouterConfig {
        RouterConfig::for_origin("v1", "https://aisle.example.com")
    }

    fn class_of(url: &str) -> RequestClass {
        classify(&FetchRequest::get(url), &config())
    }

    #[test]
    fn test_static_assets_by_extension() {
        assert_eq!(class_of("https://aisle.example.com/assets/app.js"), RequestClass::StaticAsset);
        assert_eq!(class_of("https://aisle.example.com/style.CSS"), RequestClass::StaticAsset);
        assert_eq!(class_of("https://aisle.example.com/logo.svg"), RequestClass::StaticAsset);
        assert_eq!(
            class_of("https://aisle.example.com/manifest.webmanifest"),
            RequestClass::StaticAsset
        );
    }

    #[test]
    fn test_live_api_patterns() {
        assert_eq!(class_of("https://aisle.example.com/api/auth/session"), RequestClass::LiveApi);
        assert_eq!(class_of("https://aisle.example.com/api/sync/state"), RequestClass::LiveApi);
        assert_eq!(
            class_of("https://aisle.example.com/api/notifications"),
            RequestClass::LiveApi
        );
        assert_eq!(
            class_of("https://aisle.example.com/api/crowdsource/pending"),
            RequestClass::LiveApi
        );
    }

    #[test]
    fn test_cacheable_api() {
        assert_eq!(class_of("https://aisle.example.com/api/products"), RequestClass::CacheableApi);
        assert_eq!(
            class_of("https://aisle.example.com/api/stores/3/layout"),
            RequestClass::CacheableApi
        );
    }

    #[test]
    fn test_navigation_needs_html_accept() {
        let nav = FetchRequest::get("https://aisle.example.com/stores/3")
            .with_header("Accept", "text/html,application/xhtml+xml");
        assert_eq!(classify(&nav, &config()), RequestClass::Navigation);

        // Same URL without the Accept header is not a navigation.
        assert_eq!(class_of("https://aisle.example.com/stores/3"), RequestClass::Other);
    }

    #[test]
    fn test_index_html_is_a_navigation_not_a_static_asset() {
        let nav = FetchRequest::get("https://aisle.example.com/index.html")
            .with_header("Accept", "text/html");
        assert_eq!(classify(&nav, &config()), RequestClass::Navigation);
    }

    #[test]
    fn test_order_static_beats_api() {
        // A script under the API prefix still classifies as a static asset.
        assert_eq!(
            class_of("https://aisle.example.com/api/widgets/embed.js"),
            RequestClass::StaticAsset
        );
    }

    #[test]
    fn test_query_does_not_confuse_classification() {
        assert_eq!(
            class_of("https://aisle.example.com/api/products?sort=aisle"),
            RequestClass::CacheableApi
        );
    }
}

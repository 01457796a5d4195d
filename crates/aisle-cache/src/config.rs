//! # Router Configuration
//!
//! Everything the classifier and router need to know about the deployment:
//! which build generation is active, where the cache lives, and how requests
//! are recognized.
//!
//! ## Example (embedded in the app's TOML config)
//! ```toml
//! [cache]
//! build_tag = "2024.08.3"
//! cache_root = "/var/lib/aisle/cache"
//! api_prefix = "/api/"
//! live_patterns = ["auth", "sync", "notifications", "crowdsource"]
//! shell_document = "https://app.example.com/index.html"
//! offline_document = "https://app.example.com/offline.html"
//! ```
//!
//! The build tag is always supplied by the embedder. It names the cache
//! generation, and activation deletes every partition carrying a different
//! one.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

// =============================================================================
// Router Configuration
// =============================================================================

/// Classification and lifecycle settings for the cache router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Tag naming the active cache generation (release/build identifier).
    #[serde(default = "default_build_tag")]
    pub build_tag: String,

    /// Directory holding the cache partitions.
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,

    /// Path prefix that marks a request as API traffic.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Path fragments (under the API prefix) that mark live data, which is
    /// never served cache-first.
    #[serde(default = "default_live_patterns")]
    pub live_patterns: Vec<String>,

    /// File extensions treated as static assets.
    #[serde(default = "default_static_extensions")]
    pub static_extensions: Vec<String>,

    /// Absolute URLs precached into the static partition at install.
    #[serde(default)]
    pub shell_assets: Vec<String>,

    /// Absolute URL of the app shell document, the first fallback for
    /// offline navigations.
    #[serde(default)]
    pub shell_document: String,

    /// Absolute URL of the offline document, the second fallback.
    #[serde(default)]
    pub offline_document: String,

    /// Network timeout for router fetches (seconds).
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_build_tag() -> String {
    "dev".to_string()
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("aisle-cache")
}

fn default_api_prefix() -> String {
    "/api/".to_string()
}

fn default_live_patterns() -> Vec<String> {
    ["auth", "sync", "notifications", "crowdsource"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_static_extensions() -> Vec<String> {
    [
        "js", "css", "png", "jpg", "jpeg", "svg", "gif", "webp", "ico", "woff", "woff2", "ttf",
        "webmanifest",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_fetch_timeout() -> u64 {
    10
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig::for_origin(&default_build_tag(), "http://localhost:3000")
    }
}

impl RouterConfig {
    /// Builds a config for an app served from `origin`, wiring the shell
    /// document, offline document and a minimal shell asset list to
    /// conventional paths under it.
    pub fn for_origin(build_tag: &str, origin: &str) -> Self {
        let base = origin.trim_end_matches('/');
        RouterConfig {
            build_tag: build_tag.to_string(),
            cache_root: default_cache_root(),
            api_prefix: default_api_prefix(),
            live_patterns: default_live_patterns(),
            static_extensions: default_static_extensions(),
            shell_assets: vec![
                format!("{}/index.html", base),
                format!("{}/manifest.webmanifest", base),
            ],
            shell_document: format!("{}/index.html", base),
            offline_document: format!("{}/offline.html", base),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> CacheResult<()> {
        if self.build_tag.is_empty() {
            return Err(CacheError::InvalidConfig("build_tag must not be empty".into()));
        }
        if !self.api_prefix.starts_with('/') {
            return Err(CacheError::InvalidConfig(format!(
                "api_prefix must start with '/', got: {}",
                self.api_prefix
            )));
        }
        for url in self
            .shell_assets
            .iter()
            .chain([&self.shell_document, &self.offline_document])
        {
            if !url.is_empty() {
                crate::entry::normalize_url(url)?;
            }
        }
        Ok(())
    }

    /// The network timeout as a `Duration`.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

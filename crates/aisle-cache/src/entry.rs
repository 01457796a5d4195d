//! # Cache Entries and Partitions
//!
//! The storage vocabulary: normalized URL keys, captured responses, and the
//! three partition kinds that make up one cache generation.
//!
//! ## Partition Layout
//! ```text
//! <cache root>/
//! ├── static-v42/            ← app shell and immutable assets
//! ├── dynamic-v42/           ← cacheable API responses
//! ├── offline-fallback-v42/  ← the offline document
//! ├── static-v41/            ← previous generation, pruned on activate
//! └── ...
//! ```
//!
//! A generation is identified by the build tag in the directory name. The
//! active store only ever opens partitions of its own tag; `activate()`
//! deletes every directory carrying a different one, so responses from two
//! app versions never mix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{CacheError, CacheResult};
use crate::request::{FetchResponse, ResponseSource};

// =============================================================================
// Partition Kind
// =============================================================================

/// The three cache partitions of one build generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    /// App shell and static assets, precached at install.
    Static,
    /// API responses captured opportunistically.
    Dynamic,
    /// The offline fallback document.
    OfflineFallback,
}

impl PartitionKind {
    /// All partition kinds.
    pub const ALL: [PartitionKind; 3] = [
        PartitionKind::Static,
        PartitionKind::Dynamic,
        PartitionKind::OfflineFallback,
    ];

    /// Stable name used in directory names and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionKind::Static => "static",
            PartitionKind::Dynamic => "dynamic",
            PartitionKind::OfflineFallback => "offline-fallback",
        }
    }

    /// Directory name for this kind under a given build tag.
    pub fn dir_name(&self, build_tag: &str) -> String {
        format!("{}-{}", self.as_str(), build_tag)
    }

    /// Splits a directory name back into kind and build tag. Returns `None`
    /// for directories this crate did not create.
    pub fn parse_dir_name(dir: &str) -> Option<(PartitionKind, String)> {
        for kind in PartitionKind::ALL {
            if let Some(rest) = dir.strip_prefix(kind.as_str()) {
                if let Some(tag) = rest.strip_prefix('-') {
                    if !tag.is_empty() {
                        return Some((kind, tag.to_string()));
                    }
                }
            }
        }
        None
    }
}

impl std::fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// URL Normalization
// =============================================================================

/// Normalizes a URL into its cache-key form.
///
/// Parsing through the `url` crate lowercases the host and strips default
/// ports; on top of that the fragment is dropped, since it never reaches the
/// server. Query strings are kept; they select different resources.
pub fn normalize_url(raw: &str) -> CacheResult<String> {
    let mut url = Url::parse(raw)
        .map_err(|e| CacheError::UncacheableUrl(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(CacheError::UncacheableUrl(format!(
                "{}: scheme '{}' is not cacheable",
                raw, other
            )))
        }
    }
    url.set_fragment(None);
    Ok(url.into())
}

/// File stem for an entry, derived from its normalized URL.
///
/// Hashing sidesteps every filesystem restriction on URL characters and
/// keeps names a fixed length.
pub fn entry_file_stem(normalized_url: &str) -> String {
    let digest = Sha256::digest(normalized_url.as_bytes());
    hex::encode(digest)
}

// =============================================================================
// Cache Entry
// =============================================================================

/// One captured response.
///
/// On disk an entry is two files sharing a stem: `<stem>.json` holds this
/// struct minus the body, `<stem>.bin` holds the body bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Normalized URL key.
    pub url: String,

    /// Captured status code (always 2xx; the router never stores others).
    pub status: u16,

    /// Captured response headers.
    pub headers: Vec<(String, String)>,

    /// Body bytes; persisted separately, so skipped in the metadata JSON.
    #[serde(skip)]
    pub body: Vec<u8>,

    /// When the response was captured.
    pub captured_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Captures a network response under a normalized key.
    pub fn capture(normalized_url: &str, response: &FetchResponse) -> Self {
        CacheEntry {
            url: normalized_url.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            captured_at: Utc::now(),
        }
    }

    /// Replays this entry as a response with the given provenance.
    pub fn to_response(&self, source: ResponseSource) -> FetchResponse {
        FetchResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            source,
            stale: false,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_dir_names() {
        assert_eq!(PartitionKind::Static.dir_name("v42"), "static-v42");
        assert_eq!(
            PartitionKind::OfflineFallback.dir_name("2024.08.1"),
            "offline-fallback-2024.08.1"
        );
    }

    #[test]
    fn test_parse_dir_name_round_trip() {
        for kind in PartitionKind::ALL {
            let dir = kind.dir_name("v7");
            let (parsed_kind, tag) = PartitionKind::parse_dir_name(&dir).unwrap();
            assert_eq!(parsed_kind, kind);
            assert_eq!(tag, "v7");
        }
    }

    #[test]
    fn test_parse_dir_name_rejects_foreign_dirs() {
        assert!(PartitionKind::parse_dir_name("tmp").is_none());
        assert!(PartitionKind::parse_dir_name("static").is_none());
        assert!(PartitionKind::parse_dir_name("static-").is_none());
        assert!(PartitionKind::parse_dir_name("uploads-v1").is_none());
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("HTTP://Example.COM:80/a/b#frag").unwrap(),
            "http://example.com/a/b"
        );
        // Query strings distinguish resources and survive normalization.
        assert_eq!(
            normalize_url("https://example.com/api/products?store=3").unwrap(),
            "https://example.com/api/products?store=3"
        );
        assert!(normalize_url("data:text/plain,hello").is_err());
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn test_entry_file_stem_is_stable_hex() {
        let a = entry_file_stem("https://example.com/app.js");
        let b = entry_file_stem("https://example.com/app.js");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_capture_and_replay() {
        let response = FetchResponse::network(
            200,
            vec![("content-type".to_string(), "text/css".to_string())],
            b"body{}".to_vec(),
        );
        let entry = CacheEntry::capture("https://example.com/app.css", &response);
        assert_eq!(entry.status, 200);

        let replayed = entry.to_response(ResponseSource::Cache);
        assert_eq!(replayed.body, b"body{}");
        assert_eq!(replayed.source, ResponseSource::Cache);
        assert!(!replayed.stale);
    }
}
